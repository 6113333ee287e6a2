//! Catalog fetch and asset downloads
//!
//! Fetches the whole catalog in one request and rejects the whole
//! response if any entry fails shape validation; a partial catalog is
//! worse than none. Assets download into the user cache dir under a
//! name keyed by the entry's modified stamp, so an edit that changes
//! the stamp invalidates the cached file automatically.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use serde::Deserialize;
use url::Url;

use crate::catalog::{canonical, SoundEntry};

/// Cap on response bodies (catalog and single assets alike).
const MAX_BODY_BYTES: u64 = 100_000_000; // 100MB limit

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Link-level failure, including non-2xx statuses.
    #[error("couldn't reach the soundboard server: {0}")]
    Transport(String),
    /// The body arrived but isn't parseable as JSON.
    #[error("couldn't decode the server's response: {0}")]
    Decode(String),
    /// Parseable JSON that violates the catalog contract.
    #[error("catalog response has the wrong shape: {0}")]
    Shape(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    sounds: Vec<SoundEntry>,
}

/// Parse a catalog body. Decode and shape failures are distinct
/// surfaces, and one malformed entry rejects the whole batch.
pub fn parse_catalog(body: &str) -> Result<Vec<SoundEntry>, ClientError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        if body.trim().is_empty() {
            ClientError::Decode("empty response body".to_string())
        } else {
            ClientError::Decode(e.to_string())
        }
    })?;
    let catalog: CatalogResponse =
        serde_json::from_value(value).map_err(|e| ClientError::Shape(e.to_string()))?;
    Ok(catalog.sounds)
}

/// Pull a human-readable detail out of an error response: a JSON
/// `message` field when the server provides one, the raw body otherwise.
fn status_detail(code: u16, response: ureq::Response) -> String {
    let body = response.into_string().unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or(body);
    if message.is_empty() {
        format!("server returned status {code}")
    } else {
        format!("server returned status {code}: {message}")
    }
}

/// HTTP client bound to one soundboard server.
pub struct CatalogClient {
    server: Url,
    cache_dir: PathBuf,
}

impl CatalogClient {
    pub fn new(server: Url) -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termboard");
        Self { server, cache_dir }
    }

    /// Use a specific asset cache directory (tests).
    pub fn with_cache_dir(server: Url, cache_dir: PathBuf) -> Self {
        Self { server, cache_dir }
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    /// Fetch the full catalog once. Empty is a valid zero-entry state.
    pub fn fetch_catalog(&self) -> Result<Vec<SoundEntry>, ClientError> {
        let mut endpoint = self.server.clone();
        endpoint.set_path("/api/sounds");

        let response = ureq::get(endpoint.as_str()).call().map_err(|e| match e {
            ureq::Error::Status(code, resp) => ClientError::Transport(status_detail(code, resp)),
            e => ClientError::Transport(e.to_string()),
        })?;

        let mut body = String::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_string(&mut body)
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        parse_catalog(&body)
    }

    /// Resolve one entry by name via a fresh catalog fetch. Used when a
    /// push event announces an entry we don't hold.
    pub fn fetch_entry(&self, name: &str) -> Result<Option<SoundEntry>, ClientError> {
        let key = canonical(name);
        Ok(self
            .fetch_catalog()?
            .into_iter()
            .find(|e| e.key() == key))
    }

    /// Asset location: assetBase + "/" + assetRef, with the modified
    /// stamp as a cache-busting query parameter.
    pub fn asset_url(&self, entry: &SoundEntry) -> Url {
        let mut url = self.server.clone();
        url.set_path(&format!("/sounds/{}", entry.asset_ref));
        url.set_query(Some(&format!("v={}", entry.last_modified)));
        url
    }

    /// Local cache path for an entry's asset at its current stamp.
    pub fn asset_cache_path(&self, entry: &SoundEntry) -> PathBuf {
        let slug: String = entry
            .key()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let ext = std::path::Path::new(&entry.asset_ref)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        self.cache_dir
            .join(format!("{slug}-{}.{ext}", entry.last_modified))
    }

    /// Download the entry's asset unless the current stamp is already
    /// cached. Returns the local file path.
    pub fn ensure_asset(&self, entry: &SoundEntry) -> Result<PathBuf, ClientError> {
        let path = self.asset_cache_path(entry);
        if path.exists() {
            return Ok(path);
        }

        let url = self.asset_url(entry);
        let response = ureq::get(url.as_str()).call().map_err(|e| match e {
            ureq::Error::Status(code, resp) => ClientError::Transport(status_detail(code, resp)),
            e => ClientError::Transport(e.to_string()),
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        fs::create_dir_all(&self.cache_dir)?;
        // Write-then-rename so a failed download never leaves a partial
        // file under the final name.
        let partial = path.with_extension("part");
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_at(dir: &std::path::Path) -> CatalogClient {
        CatalogClient::with_cache_dir(
            Url::parse("http://board.local:8000").unwrap(),
            dir.to_path_buf(),
        )
    }

    fn entry(name: &str, modified: i64) -> SoundEntry {
        SoundEntry {
            name: name.to_string(),
            asset_ref: format!("{name}/clip.mp3"),
            last_modified: modified,
            play_count: 0,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_parse_catalog_accepts_valid_batch() {
        let body = r#"{"sounds": [
            {"name": "horn", "assetRef": "horn.mp3", "lastModified": 10, "playCount": 3, "tags": ["loud"]},
            {"name": "drum", "assetRef": "drum.mp3", "lastModified": 20, "playCount": 0, "tags": []}
        ]}"#;
        let sounds = parse_catalog(body).unwrap();
        assert_eq!(sounds.len(), 2);
        assert_eq!(sounds[0].name, "horn");
        assert_eq!(sounds[0].tags, vec!["loud"]);
    }

    #[test]
    fn test_parse_catalog_empty_is_valid() {
        let sounds = parse_catalog(r#"{"sounds": []}"#).unwrap();
        assert!(sounds.is_empty());
    }

    #[test]
    fn test_one_malformed_entry_rejects_whole_batch() {
        let body = r#"{"sounds": [
            {"name": "horn", "assetRef": "horn.mp3", "lastModified": 10, "playCount": 3, "tags": []},
            {"name": "bad", "assetRef": "bad.mp3", "lastModified": "not a number", "playCount": 0, "tags": []}
        ]}"#;
        assert!(matches!(parse_catalog(body), Err(ClientError::Shape(_))));
    }

    #[test]
    fn test_non_json_body_is_decode_not_shape() {
        assert!(matches!(
            parse_catalog("<html>oops</html>"),
            Err(ClientError::Decode(_))
        ));
        assert!(matches!(parse_catalog(""), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_asset_url_carries_cache_buster() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_at(dir.path());
        let url = client.asset_url(&entry("horn", 42));
        assert_eq!(
            url.as_str(),
            "http://board.local:8000/sounds/horn/clip.mp3?v=42"
        );
    }

    #[test]
    fn test_edit_changes_cache_path() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_at(dir.path());
        let before = client.asset_cache_path(&entry("horn", 1));
        let after = client.asset_cache_path(&entry("horn", 2));
        assert_ne!(before, after);
    }

    #[test]
    fn test_ensure_asset_serves_from_cache_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_at(dir.path());
        let horn = entry("horn", 7);

        let path = client.asset_cache_path(&horn);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"cached bytes").unwrap();

        // board.local doesn't resolve; this can only succeed via cache
        let served = client.ensure_asset(&horn).unwrap();
        assert_eq!(served, path);
    }
}
