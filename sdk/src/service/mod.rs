//! Client services

pub mod process;
pub mod pty;
pub mod sandbox;
pub mod stream;
