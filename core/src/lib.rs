pub mod config;
pub mod error;
pub mod input;
pub mod link;
pub mod model;
pub mod output;
pub mod registry;
pub mod session;
pub mod tokenize;

// Re-exports for convenience
pub use config::SessionConfig;
pub use error::{BrowseError, Result};
pub use session::Session;
