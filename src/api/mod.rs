//! Blogger API access: authenticated client, errors, and the REST adapter.

mod client;
mod error;

pub mod blogger;

pub use blogger::{BloggerApi, PostSource};
pub use client::{ApiClient, ApiClientBuilder};
pub use error::ApiError;
