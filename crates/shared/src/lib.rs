//! Supportdesk Shared Types
//!
//! Identifiers, roles and the error taxonomy shared by the relay crates.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
