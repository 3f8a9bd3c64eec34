//! Object storage client
//!
//! The engine's only contract with storage: store bytes and get back a
//! durable public URL; best-effort delete on link removal. Bucket and ACL
//! mechanics live on the storage side.

use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use uuid::Uuid;

use crate::config::Config;

/// Storage client over the provider's REST interface
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    api_key: String,
    max_upload_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File size must be less than {max_bytes} bytes")]
    TooLarge { max_bytes: usize },
    #[error("Upload failed: {0}")]
    Upload(String),
}

impl ObjectStorage {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            endpoint: config.storage_endpoint.trim_end_matches('/').to_string(),
            bucket: config.storage_bucket.clone(),
            api_key: config.storage_api_key.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Store file bytes under a fresh unguessable object key and return the
    /// public URL. Transient upload failures are retried with backoff.
    pub async fn store(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        if bytes.len() > self.max_upload_bytes {
            return Err(StorageError::TooLarge {
                max_bytes: self.max_upload_bytes,
            });
        }

        let object_key = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name));
        let url = self.object_url(&object_key);

        let strategy = ExponentialBackoff::from_millis(200).map(jitter).take(3);

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let upload_url = url.clone();

        Retry::spawn(strategy, move || {
            let client = client.clone();
            let api_key = api_key.clone();
            let upload_url = upload_url.clone();
            let bytes = bytes.clone();
            async move {
                let response = client
                    .put(&upload_url)
                    .bearer_auth(&api_key)
                    .body(bytes)
                    .send()
                    .await
                    .map_err(|e| StorageError::Upload(e.to_string()))?;

                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(StorageError::Upload(format!(
                        "storage returned {}",
                        response.status()
                    )))
                }
            }
        })
        .await?;

        tracing::info!(object_key = %object_key, "File stored");
        Ok(url)
    }

    /// Best-effort delete of a previously stored object. Failures are
    /// logged, never surfaced: link deletion must not hinge on storage.
    pub async fn delete(&self, target_url: &str) {
        if !target_url.starts_with(&self.endpoint) {
            tracing::debug!(url = %target_url, "Skipping delete of non-storage URL");
            return;
        }

        let result = self
            .client
            .delete(target_url)
            .bearer_auth(&self.api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(url = %target_url, "Stored file deleted");
            }
            Ok(response) => {
                tracing::warn!(url = %target_url, status = %response.status(), "Stored file delete failed");
            }
            Err(e) => {
                tracing::warn!(url = %target_url, error = %e, "Stored file delete failed");
            }
        }
    }

    fn object_url(&self, object_key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, object_key)
    }
}

/// Keep object keys to a safe character set; the random prefix already
/// guarantees uniqueness.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(128).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("my file (1).pdf"), "my_file__1_.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_file_name(&long).len(), 128);
    }
}
