//! Track catalog access.
//!
//! A catalog answers two questions: the full listing for a team scope, and
//! the neighbor of a given track within that scope. Neighbor lookups wrap
//! around at both ends, so a playlist never runs out.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::Track;
use crate::utils::errors::CatalogError;
use crate::utils::http;

#[async_trait]
pub trait TrackCatalog: Send + Sync {
    async fn list_tracks(&self, scope: &str) -> Result<Vec<Track>, CatalogError>;
    async fn successor(&self, track_id: &str, scope: &str) -> Result<Track, CatalogError>;
    async fn predecessor(&self, track_id: &str, scope: &str) -> Result<Track, CatalogError>;
}

/// Wraparound neighbor within an ordered listing. `step` is +1 or -1.
fn neighbor(tracks: &[Track], track_id: &str, step: isize) -> Result<Track, CatalogError> {
    if tracks.is_empty() {
        return Err(CatalogError::NotFound(track_id.to_string()));
    }
    let index = tracks
        .iter()
        .position(|t| t.id == track_id)
        .ok_or_else(|| CatalogError::NotFound(track_id.to_string()))?;
    let len = tracks.len() as isize;
    let next = (index as isize + step).rem_euclid(len) as usize;
    Ok(tracks[next].clone())
}

/// Catalog backed by the team track service.
pub struct HttpTrackCatalog {
    base_url: String,
}

impl HttpTrackCatalog {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_listing(&self, scope: &str) -> Result<Vec<Track>, CatalogError> {
        let url = format!("{}/teams/{}/tracks", self.base_url, scope);
        log::debug!("[Catalog] GET {}", url);

        let response = http::client()
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Fetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| CatalogError::Fetch(e.to_string()))?;

        let records = body
            .as_array()
            .ok_or_else(|| CatalogError::Parse("listing is not a JSON array".to_string()))?;
        let mut tracks = Vec::with_capacity(records.len());
        for record in records {
            tracks.push(Track::from_json(record)?);
        }
        log::info!("[Catalog] {} tracks for team {}", tracks.len(), scope);
        Ok(tracks)
    }
}

#[async_trait]
impl TrackCatalog for HttpTrackCatalog {
    async fn list_tracks(&self, scope: &str) -> Result<Vec<Track>, CatalogError> {
        self.fetch_listing(scope).await
    }

    async fn successor(&self, track_id: &str, scope: &str) -> Result<Track, CatalogError> {
        let tracks = self.fetch_listing(scope).await?;
        neighbor(&tracks, track_id, 1)
    }

    async fn predecessor(&self, track_id: &str, scope: &str) -> Result<Track, CatalogError> {
        let tracks = self.fetch_listing(scope).await?;
        neighbor(&tracks, track_id, -1)
    }
}

/// In-memory catalog for tests and offline use.
#[derive(Default)]
pub struct MemoryCatalog {
    scopes: HashMap<String, Vec<Track>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(scope: &str, tracks: Vec<Track>) -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(scope.to_string(), tracks);
        Self { scopes }
    }

    pub fn insert(&mut self, scope: &str, tracks: Vec<Track>) {
        self.scopes.insert(scope.to_string(), tracks);
    }

    fn listing(&self, scope: &str) -> Result<&[Track], CatalogError> {
        self.scopes
            .get(scope)
            .map(Vec::as_slice)
            .ok_or_else(|| CatalogError::NotFound(format!("team {}", scope)))
    }
}

#[async_trait]
impl TrackCatalog for MemoryCatalog {
    async fn list_tracks(&self, scope: &str) -> Result<Vec<Track>, CatalogError> {
        Ok(self.listing(scope)?.to_vec())
    }

    async fn successor(&self, track_id: &str, scope: &str) -> Result<Track, CatalogError> {
        neighbor(self.listing(scope)?, track_id, 1)
    }

    async fn predecessor(&self, track_id: &str, scope: &str) -> Result<Track, CatalogError> {
        neighbor(self.listing(scope)?, track_id, -1)
    }
}
