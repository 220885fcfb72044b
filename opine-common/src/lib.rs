//! # Opine Common Library
//!
//! Shared code for Opine backend services including:
//! - Common error types
//! - Configuration loading and root folder resolution
//! - Database initialization and row models
//! - Domain types shared between the polling app and the generation pipeline

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
