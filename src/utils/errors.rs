use thiserror::Error;

/// Errors surfaced by the playback engine and manifest handling.
///
/// Every variant is resolved locally at the operation boundary: a failed
/// `play()` leaves the engine stopped (or in its prior state), never
/// half-initialized.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    /// Malformed or absent media locator. Non-fatal: logged, operation aborted.
    #[error("invalid media locator: {0:?}")]
    InvalidLocator(String),

    /// Manifest fetch failed (transport failure or non-decodable body).
    #[error("manifest fetch failed: {0}")]
    Fetch(String),

    /// Staging the rewritten manifest failed (disk/sandbox denial).
    #[error("manifest staging failed: {0}")]
    Write(String),

    /// `resume()` called with nothing persisted.
    #[error("no resumable session")]
    NoResumableSession,

    /// `set_playlist()` called with an out-of-range start index.
    #[error("playlist index {index} out of range (playlist has {len} tracks)")]
    PlaylistIndex { index: usize, len: usize },

    /// The underlying player could not be constructed for this locator.
    #[error("player backend error: {0}")]
    Backend(String),
}

/// Errors from the remote track catalog.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    /// Network failure or non-success status from the catalog service.
    #[error("catalog fetch failed: {0}")]
    Fetch(String),

    /// A catalog document was missing required fields or had the wrong shape.
    #[error("catalog parse error: {0}")]
    Parse(String),

    /// No track with the requested id exists in the scope.
    #[error("track not found: {0}")]
    NotFound(String),
}
