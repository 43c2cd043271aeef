// Data models for catalog entities

pub mod track;

// Re-export commonly used types
pub use track::Track;
