//! Domain models

pub mod sandbox;
pub mod types;
