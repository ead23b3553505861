//! # PicSort Common Library
//!
//! Shared code for the PicSort backend crates including:
//! - Error taxonomy (`Error` enum and `Result` alias)
//! - TOML configuration model and loading
//! - SQLite pool initialization and schema creation

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
