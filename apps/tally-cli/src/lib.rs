//! # tally-cli
//!
//! Library half of the administrator CLI; the binary lives in `main.rs`.

pub mod config;
