pub mod colour;
pub mod env;
pub mod services;
pub mod tracing;
