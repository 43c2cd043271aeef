use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::errors::CatalogError;

/// A single playable media item with its lyrics metadata.
///
/// Tracks are immutable values produced by the catalog; the engine never
/// mutates one, it only derives new values when substituting locators.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Direct media URL or a manifest reference (`.m3u8`).
    pub media_url: String,
    /// Opaque lyrics payload, rendered elsewhere.
    pub lyrics: String,
    pub artwork_url: Option<String>,
    /// Seconds into the media where the lyrics begin. Always >= 0.
    pub lyrics_offset: f64,
    /// Line timestamps in seconds. Non-decreasing by convention, not enforced.
    pub timestamps: Vec<f64>,
}

impl Track {
    /// Builds a `Track` from a dynamic catalog document.
    ///
    /// Required fields: `id`, `title`, `media_url`. A document missing any of
    /// them (or carrying the wrong type) is a parse error, not a skip.
    pub fn from_json(value: &Value) -> Result<Track, CatalogError> {
        let id = required_str(value, "id")?;
        let title = required_str(value, "title")?;
        let media_url = required_str(value, "media_url")?;

        let lyrics = value
            .get("lyrics")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let artwork_url = value
            .get("artwork_url")
            .and_then(Value::as_str)
            .map(str::to_string);

        let lyrics_offset = value
            .get("lyrics_offset")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if lyrics_offset < 0.0 {
            return Err(CatalogError::Parse(format!(
                "track {}: negative lyrics_offset {}",
                id, lyrics_offset
            )));
        }

        let timestamps = match value.get("timestamps") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        CatalogError::Parse(format!("track {}: non-numeric timestamp", id))
                    })
                })
                .collect::<Result<Vec<f64>, CatalogError>>()?,
            Some(other) => {
                return Err(CatalogError::Parse(format!(
                    "track {}: timestamps is not an array (got {})",
                    id, other
                )))
            }
        };

        Ok(Track {
            id,
            title,
            media_url,
            lyrics,
            artwork_url,
            lyrics_offset,
            timestamps,
        })
    }
}

fn required_str(value: &Value, field: &str) -> Result<String, CatalogError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CatalogError::Parse(format!("missing or empty required field '{}'", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_document() {
        let doc = json!({
            "id": "t1",
            "title": "First Song",
            "media_url": "https://cdn.example.com/t1/manifest.m3u8",
            "lyrics": "la la la",
            "artwork_url": "https://cdn.example.com/t1/cover.png",
            "lyrics_offset": 2.5,
            "timestamps": [0.0, 3.1, 7.2]
        });
        let track = Track::from_json(&doc).unwrap();
        assert_eq!(track.id, "t1");
        assert_eq!(track.title, "First Song");
        assert_eq!(track.timestamps, vec![0.0, 3.1, 7.2]);
        assert_eq!(track.lyrics_offset, 2.5);
    }

    #[test]
    fn optional_fields_default() {
        let doc = json!({
            "id": "t2",
            "title": "Bare",
            "media_url": "https://cdn.example.com/t2.mp3"
        });
        let track = Track::from_json(&doc).unwrap();
        assert!(track.lyrics.is_empty());
        assert!(track.artwork_url.is_none());
        assert_eq!(track.lyrics_offset, 0.0);
        assert!(track.timestamps.is_empty());
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let doc = json!({ "id": "t3", "title": "No URL" });
        let err = Track::from_json(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::Parse(msg) if msg.contains("media_url")));
    }

    #[test]
    fn negative_lyrics_offset_rejected() {
        let doc = json!({
            "id": "t4",
            "title": "Bad Offset",
            "media_url": "https://cdn.example.com/t4.mp3",
            "lyrics_offset": -1.0
        });
        assert!(Track::from_json(&doc).is_err());
    }

    #[test]
    fn survives_serde_round_trip() {
        let track = Track {
            id: "t5".into(),
            title: "Round Trip".into(),
            media_url: "https://cdn.example.com/t5.mp3".into(),
            lyrics: "verse".into(),
            artwork_url: None,
            lyrics_offset: 0.0,
            timestamps: vec![1.0],
        };
        let json = serde_json::to_string(&track).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(back, track);
    }
}
