//! # Vigil Config
//!
//! Configuration snapshots for the vigil daemon runtime.
//!
//! A [`ConfigSnapshot`] is an immutable value with three sections:
//! `application` (must carry a wake interval), `daemon` (process settings)
//! and `logging`. The runtime obtains snapshots through a [`ConfigSource`]
//! and replaces them wholesale on reload.

mod error;
mod loader;
mod schema;
mod source;
mod validator;

pub use error::ConfigError;
pub use loader::{ConfigFormat, ConfigLoader};
pub use schema::*;
pub use source::{ConfigSource, FileConfigSource, StaticConfigSource};
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
