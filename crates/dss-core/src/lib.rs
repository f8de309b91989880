#![forbid(unsafe_code)]

//! Core types shared by the eID DSS crates: the error taxonomy, algorithm
//! identifiers, namespace constants and engine configuration.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod ns;

pub use config::DssConfig;
pub use error::{Error, Result};
