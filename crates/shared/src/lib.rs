//! Shared types, errors, and configuration for Cofound.
//!
//! This crate provides common types used across all other crates:
//! - Currency codes and minor-unit precision
//! - Application-wide error types
//! - JWT claims and token handling
//! - Configuration management

pub mod auth;
pub mod config;
pub mod error;
pub mod jwt;
pub mod types;

pub use auth::Claims;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use types::{CurrencyCode, MINOR_UNIT_SCALE};
