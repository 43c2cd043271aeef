//! Manifest acquisition and rewriting.
//!
//! A fetched playlist manifest enumerates segment references relative to the
//! manifest's own location. The underlying player consumes a staged copy in
//! which every segment line has been rebased to an absolute URL.

use std::fs;
use std::path::PathBuf;

use crate::constants::SEGMENT_SUFFIX;
use crate::utils::errors::PlaybackError;
use crate::utils::http;

/// A rewritten manifest staged on local disk.
///
/// The engine owns cleanup: the staged file is deleted when the binding it
/// belongs to is torn down (next play or stop).
#[derive(Debug, Clone, PartialEq)]
pub struct StagedManifest {
    pub path: PathBuf,
}

pub struct ManifestRewriter {
    stage_dir: PathBuf,
}

impl Default for ManifestRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestRewriter {
    /// Rewriter staging into the OS temp directory.
    pub fn new() -> Self {
        Self {
            stage_dir: std::env::temp_dir(),
        }
    }

    pub fn with_stage_dir(stage_dir: PathBuf) -> Self {
        Self { stage_dir }
    }

    /// Fetches the manifest at `source_url`, rebases its segment references,
    /// and stages the result under a unique name.
    ///
    /// Two calls on the same manifest produce two independent staged files
    /// with equivalent content (the name is unique per call, so concurrent
    /// plays never collide).
    pub async fn rewrite(&self, source_url: &str) -> Result<StagedManifest, PlaybackError> {
        log::debug!("[Manifest] Fetching manifest: {}", source_url);
        let response = http::client()
            .get(source_url)
            .send()
            .await
            .map_err(|e| PlaybackError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlaybackError::Fetch(format!(
                "manifest request returned status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Fetch(e.to_string()))?;
        let content = String::from_utf8(body.to_vec())
            .map_err(|_| PlaybackError::Fetch("manifest body is not valid UTF-8".to_string()))?;

        let rewritten = rewrite_manifest_text(&content, source_url);
        self.stage(&rewritten)
    }

    /// Writes rewritten manifest content to a fresh uniquely-named file.
    pub fn stage(&self, content: &str) -> Result<StagedManifest, PlaybackError> {
        fs::create_dir_all(&self.stage_dir)
            .map_err(|e| PlaybackError::Write(e.to_string()))?;

        let name = format!("manifest-{:016x}.m3u8", rand::random::<u64>());
        let path = self.stage_dir.join(name);
        fs::write(&path, content).map_err(|e| PlaybackError::Write(e.to_string()))?;

        log::debug!("[Manifest] Staged rewritten manifest at {:?}", path);
        Ok(StagedManifest { path })
    }
}

/// Rebases every relative segment line of `content` onto the base of
/// `source_url`.
///
/// A line is rewritten when it is not a directive (`#`-prefixed), ends with
/// the segment suffix, and does not already carry a scheme. Directives,
/// blank lines, absolute references, and anything else pass through
/// verbatim. Output is `\n`-joined with the line count preserved.
pub fn rewrite_manifest_text(content: &str, source_url: &str) -> String {
    let base = base_of(source_url);
    content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if !trimmed.is_empty()
                && !trimmed.starts_with('#')
                && trimmed.ends_with(SEGMENT_SUFFIX)
                && !trimmed.contains("://")
            {
                format!("{}{}", base, trimmed)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The manifest location with its own file name stripped, trailing `/` kept.
fn base_of(source_url: &str) -> &str {
    match source_url.rfind('/') {
        Some(idx) => &source_url[..=idx],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebases_segment_lines_only() {
        let input = "#EXTM3U\nseg0.ts\n#EXT-X-ENDLIST";
        let output = rewrite_manifest_text(input, "https://host/path/manifest.m3u8");
        assert_eq!(output, "#EXTM3U\nhttps://host/path/seg0.ts\n#EXT-X-ENDLIST");
    }

    #[test]
    fn preserves_line_count_and_order() {
        let input = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\n#EXTINF:9.6,\na.ts\n#EXTINF:9.6,\nb.ts\n#EXT-X-ENDLIST\n";
        let output = rewrite_manifest_text(input, "https://host/x/y/list.m3u8");
        let in_lines: Vec<&str> = input.split('\n').collect();
        let out_lines: Vec<&str> = output.split('\n').collect();
        assert_eq!(in_lines.len(), out_lines.len());
        assert_eq!(out_lines[4], "https://host/x/y/a.ts");
        assert_eq!(out_lines[6], "https://host/x/y/b.ts");
        // directives and blanks untouched
        assert_eq!(out_lines[0], "#EXTM3U");
        assert_eq!(out_lines[2], "");
        assert_eq!(out_lines[7], "#EXT-X-ENDLIST");
    }

    #[test]
    fn absolute_segment_lines_are_left_untouched() {
        let input = "#EXTM3U\nhttps://cdn.other/seg0.ts\nseg1.ts";
        let output = rewrite_manifest_text(input, "https://host/path/m.m3u8");
        assert_eq!(
            output,
            "#EXTM3U\nhttps://cdn.other/seg0.ts\nhttps://host/path/seg1.ts"
        );
    }

    #[test]
    fn non_segment_payload_lines_pass_through() {
        let input = "#EXTM3U\nother.mp4\nseg.ts";
        let output = rewrite_manifest_text(input, "https://h/p/m.m3u8");
        assert_eq!(output, "#EXTM3U\nother.mp4\nhttps://h/p/seg.ts");
    }

    #[test]
    fn base_of_strips_file_name() {
        assert_eq!(base_of("https://host/path/manifest.m3u8"), "https://host/path/");
        assert_eq!(base_of("https://host/m.m3u8"), "https://host/");
        assert_eq!(base_of("nobase"), "");
    }

    #[test]
    fn staging_twice_produces_distinct_equivalent_files() {
        let dir = tempfile::tempdir().unwrap();
        let rewriter = ManifestRewriter::with_stage_dir(dir.path().to_path_buf());
        let content = "#EXTM3U\nhttps://h/p/seg0.ts\n#EXT-X-ENDLIST";

        let first = rewriter.stage(content).unwrap();
        let second = rewriter.stage(content).unwrap();
        assert_ne!(first.path, second.path);
        assert_eq!(fs::read_to_string(&first.path).unwrap(), content);
        assert_eq!(fs::read_to_string(&second.path).unwrap(), content);
    }

    #[test]
    fn staging_into_unwritable_dir_is_write_error() {
        let rewriter =
            ManifestRewriter::with_stage_dir(PathBuf::from("/proc/lyricwave-no-such-dir"));
        let err = rewriter.stage("#EXTM3U").unwrap_err();
        assert!(matches!(err, PlaybackError::Write(_)));
    }
}
