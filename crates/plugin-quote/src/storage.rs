use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use s3::{Bucket, Region, creds::Credentials};
use tracing::info;

use crate::config::S3Config;

/// Temporary public storage for quote media.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// URL the render service fetches `key` from.
    fn public_url(&self, key: &str) -> String;

    /// Cheap round-trip proving credentials and bucket are usable.
    async fn verify(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct S3Store {
    bucket: Bucket,
    public_url: String,
}

impl S3Store {
    /// `Ok(None)` when the section is incomplete.
    ///
    /// # Errors
    ///
    /// Fails if the bucket handle cannot be constructed from the given values.
    pub fn from_config(cfg: &S3Config) -> Result<Option<Self>> {
        if !cfg.is_complete() {
            return Ok(None);
        }

        let bucket = Bucket::new(
            &cfg.bucket_name,
            Region::Custom {
                region: cfg.region.clone(),
                endpoint: cfg.endpoint_url.clone(),
            },
            Credentials {
                access_key: Some(cfg.access_key.clone()),
                secret_key: Some(cfg.secret_key.clone()),
                security_token: None,
                session_token: None,
                expiration: None,
            },
        )
        .with_context(|| format!("creating S3 bucket handle for {}", cfg.bucket_name))?
        .with_path_style();

        let public_url = if cfg.public_url.is_empty() {
            format!(
                "{}/{}",
                cfg.endpoint_url.trim_end_matches('/'),
                cfg.bucket_name
            )
        } else {
            cfg.public_url.trim_end_matches('/').to_owned()
        };

        Ok(Some(Self { bucket, public_url }))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| anyhow::anyhow!(describe_s3_error(&e.to_string())))?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            let body = String::from_utf8_lossy(response.as_slice());
            bail!("PUT {key} returned {status}: {}", describe_s3_error(&body));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .with_context(|| format!("deleting {key}"))?;
        let status = response.status_code();
        // 404 means someone else already cleaned up.
        if !(200..300).contains(&status) && status != 404 {
            bail!("DELETE {key} returned {status}");
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_url)
    }

    async fn verify(&self) -> Result<()> {
        let (_, status) = self
            .bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await
            .map_err(|e| anyhow::anyhow!(describe_s3_error(&e.to_string())))?;
        if !(200..300).contains(&status) {
            bail!("listing bucket {} returned {status}", self.bucket.name());
        }
        info!(bucket = %self.bucket.name(), "Object storage reachable");
        Ok(())
    }
}

/// Turn well-known S3 error codes into an actionable sentence.
#[must_use]
pub fn describe_s3_error(detail: &str) -> String {
    const HINTS: [(&str, &str); 5] = [
        ("SignatureDoesNotMatch", "signature mismatch, check access_key and secret_key"),
        ("InvalidAccessKeyId", "invalid access key id"),
        ("NoSuchBucket", "bucket does not exist, check bucket_name"),
        ("AccessDenied", "access denied, check the key's bucket permissions"),
        ("RequestTimeTooSkewed", "system clock is too far off"),
    ];
    HINTS
        .iter()
        .find(|(code, _)| detail.contains(code))
        .map_or_else(|| detail.trim().to_owned(), |(code, hint)| format!("{code}: {hint}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> S3Config {
        S3Config {
            bucket_name: "quotes".to_owned(),
            access_key: "ak".to_owned(),
            secret_key: "sk".to_owned(),
            endpoint_url: "https://s3.example.com/".to_owned(),
            ..S3Config::default()
        }
    }

    #[test]
    fn incomplete_config_builds_nothing() {
        assert!(S3Store::from_config(&S3Config::default()).unwrap().is_none());
    }

    #[test]
    fn public_url_defaults_to_path_style_endpoint() {
        let store = S3Store::from_config(&complete()).unwrap().unwrap();
        assert_eq!(
            store.public_url("media_1.png"),
            "https://s3.example.com/quotes/media_1.png"
        );
    }

    #[test]
    fn explicit_public_url_wins() {
        let cfg = S3Config {
            public_url: "https://cdn.example.com/".to_owned(),
            ..complete()
        };
        let store = S3Store::from_config(&cfg).unwrap().unwrap();
        assert_eq!(store.public_url("k.jpg"), "https://cdn.example.com/k.jpg");
    }

    #[test]
    fn known_error_codes_get_hints() {
        let detail = "<Error><Code>NoSuchBucket</Code></Error>";
        assert!(describe_s3_error(detail).starts_with("NoSuchBucket: bucket does not exist"));
        assert_eq!(describe_s3_error(" timeout \n"), "timeout");
    }
}
