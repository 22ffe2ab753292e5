//! Transaction module split into types, transfer construction and validation

pub mod transfer;
pub mod types;
pub mod validation;

pub use transfer::*;
pub use types::*;
