pub mod auth;
pub mod authflow;
pub mod callback;
pub mod check;
pub mod client;
pub mod config;
pub mod credentials;
pub mod ctx;
pub mod error;
pub mod oauth;
pub mod output;
pub mod server;
pub mod storage;
pub mod tools;
pub mod utils;

// Re-export commonly used error types
pub use error::{Error, Result};
pub use output::LogLevel;
