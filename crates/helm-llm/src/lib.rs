pub mod classify;
pub mod client;
pub mod http;

pub use classify::{ClassifierRules, ErrorClass};
pub use client::{ModelClient, ModelError};
pub use http::HttpModelClient;
