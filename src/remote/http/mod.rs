mod client;
mod config;
mod error;
mod models;

pub use client::HttpMatchApi;
pub use config::ApiConfig;
pub use error::{HttpApiError, HttpResult};
