//! File download helper with sha256 post-checks.
//!
//! Downloads stream to disk; when an expected hash is supplied and the
//! payload does not match, the partial file is deleted before the error is
//! returned, so a failed stage never leaves a corrupt artifact behind.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use drydock_core::config::DownloadsConfig;

use crate::error::{DeployError, DeployResult};

fn dl_err(e: impl std::fmt::Display) -> DeployError {
    DeployError::Download(e.to_string())
}

/// Shared HTTP client for catalogs and artifact downloads.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(config: &DownloadsConfig) -> DeployResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(dl_err)?;
        Ok(Self { client })
    }

    /// Fetch and deserialize a JSON document.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> DeployResult<T> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(dl_err)?
            .error_for_status()
            .map_err(dl_err)?;
        resp.json::<T>().await.map_err(dl_err)
    }

    /// Stream a URL to `dest`, creating parent directories. On any failure
    /// the partial file is removed.
    pub async fn fetch_to_file(&self, url: &str, dest: &Path) -> DeployResult<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(dl_err)?
            .error_for_status()
            .map_err(dl_err)?;

        let mut file = tokio::fs::File::create(dest).await?;
        let streamed: DeployResult<()> = async {
            while let Some(chunk) = resp.chunk().await.map_err(dl_err)? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if streamed.is_err() {
            drop(file);
            let _ = std::fs::remove_file(dest);
        } else {
            debug!(url, dest = %dest.display(), "downloaded");
        }
        streamed
    }

    /// Download with an optional content-hash post-check. A mismatch
    /// deletes the file and fails.
    pub async fn fetch_verified(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> DeployResult<()> {
        self.fetch_to_file(url, dest).await?;
        if let Some(expected) = expected_sha256 {
            verify_sha256(dest, expected)?;
        }
        Ok(())
    }
}

/// Hex sha256 of a file's contents.
pub fn sha256_file(path: &Path) -> DeployResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Check a file against an expected hex sha256; delete it on mismatch so a
/// corrupt download cannot be mistaken for a good artifact later.
pub fn verify_sha256(path: &Path, expected: &str) -> DeployResult<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        let _ = std::fs::remove_file(path);
        return Err(DeployError::HashMismatch {
            path: path.display().to_string(),
            expected: expected.to_ascii_lowercase(),
            actual,
        });
    }
    Ok(())
}

/// Last path segment of a URL, query and fragment stripped. `None` when
/// the URL has no path beyond the host.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.split(['?', '#']).next()?;
    let after_scheme = match trimmed.find("://") {
        Some(i) => &trimmed[i + 3..],
        None => trimmed,
    };
    let (_host, path) = after_scheme.split_once('/')?;
    let name = path.trim_end_matches('/').rsplit('/').next()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_accepts_match_any_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        verify_sha256(
            &path,
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
        )
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_verify_mismatch_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, "not what you ordered").unwrap();
        let err = verify_sha256(&path, &"0".repeat(64)).unwrap_err();
        match err {
            DeployError::HashMismatch { expected, .. } => assert_eq!(expected, "0".repeat(64)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/dl/server.jar?yes=1").as_deref(),
            Some("server.jar")
        );
        assert_eq!(
            file_name_from_url("https://example.com/dl/forge.jar#frag").as_deref(),
            Some("forge.jar")
        );
        assert_eq!(file_name_from_url("https://example.com/"), None);
    }
}
