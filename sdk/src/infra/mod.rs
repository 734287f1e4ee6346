//! Infrastructure layer

pub mod http;
