//! blogmirror: CLI exporter for Blogger blogs, producing a browsable static HTML mirror.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod export;
pub mod model;
pub mod render;
pub mod state;

// Re-exports for CLI and consumers.
pub use api::{ApiClient, ApiClientBuilder, ApiError, BloggerApi, PostSource};
pub use auth::{load_credentials, AuthError, Credentials};
pub use export::{run_export, ExportError, ExportMode, ExportOptions, ExportSummary};
pub use render::{HtmlRenderer, ImagePolicy, NavLinks, PostRenderer, RenderError};
pub use state::{DirStateStore, ExportEntry, ExportStatus, MemoryStateStore, StateStore};
