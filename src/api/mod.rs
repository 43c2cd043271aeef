pub mod catalog;

pub use catalog::{HttpTrackCatalog, MemoryCatalog, TrackCatalog};
