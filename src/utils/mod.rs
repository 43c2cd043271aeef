pub mod error_handling;
pub mod errors;
pub mod http;

// Re-export commonly used types
pub use errors::{CatalogError, PlaybackError};