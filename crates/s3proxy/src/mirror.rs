//! Mirror Writer.
//!
//! Re-issues a mutating request against the secondary ("mirror") endpoint
//! under mirror credentials, with an optional bucket-name prefix. Stateless
//! per spec §4.5 — it does not consult or update the inventory; the
//! dispatcher sequences `mark_backed_up` after a successful write.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::addressing::Style;
use crate::config::S3_REGION;
use crate::httpclient::HttpClientPool;
use crate::outbound::{build_mirror_path, build_outbound_request};

/// Errors from a mirror write. Never surfaced to the client — the
/// dispatcher only logs them (spec §7).
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("mirror request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("mirror endpoint returned non-2xx status {0}: {1}")]
    NonSuccess(u16, String),
}

/// Response bodies excerpted into [`MirrorError::NonSuccess`] are truncated
/// to this many bytes so a misbehaving mirror can't bloat log lines.
const ERROR_BODY_EXCERPT_LEN: usize = 512;

pub struct MirrorWriter {
    endpoint: String,
    access_key: String,
    secret_key: String,
    bucket_prefix: String,
    pool: Arc<HttpClientPool>,
}

impl MirrorWriter {
    pub fn new(
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket_prefix: String,
        pool: Arc<HttpClientPool>,
    ) -> Self {
        Self {
            endpoint,
            access_key,
            secret_key,
            bucket_prefix,
            pool,
        }
    }

    /// Replay a mutating request against the mirror. `unix_secs` is the
    /// signing timestamp — callers pass the current time.
    #[allow(clippy::too_many_arguments)]
    pub async fn write(
        &self,
        style: Style,
        bucket: &str,
        key: &str,
        method: &str,
        query: Option<&str>,
        forwarded: &BTreeMap<String, String>,
        body: &[u8],
        unix_secs: u64,
    ) -> Result<(), MirrorError> {
        let mirror_bucket = format!("{}{}", self.bucket_prefix, bucket);
        let mirror_path = build_mirror_path(style, &mirror_bucket, key);
        let creds = s3proxy_sigv4::Credentials {
            access_key_id: self.access_key.clone(),
            secret_access_key: self.secret_key.clone(),
        };

        let outbound = build_outbound_request(
            style,
            &self.endpoint,
            &mirror_bucket,
            &mirror_path,
            method,
            query,
            forwarded,
            body,
            &creds,
            S3_REGION,
            unix_secs,
        );

        let reqwest_method = outbound
            .method
            .parse::<reqwest::Method>()
            .map_err(|_| MirrorError::InvalidMethod(outbound.method.clone()))?;

        let mut req = self.pool.client().request(reqwest_method, &outbound.url);
        for (name, value) in &outbound.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req = req.body(outbound.body.clone());

        let response = req.send().await.map_err(MirrorError::Transport)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let excerpt = match response.text().await {
                Ok(body) => body.chars().take(ERROR_BODY_EXCERPT_LEN).collect(),
                Err(e) => format!("<failed to read response body: {e}>"),
            };
            return Err(MirrorError::NonSuccess(status, excerpt));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::httpclient::HttpClientConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_mirror_write_success_with_bucket_prefix() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/m-data/a/b.txt"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let pool = HttpClientPool::new(HttpClientConfig::default()).unwrap();
        let writer = MirrorWriter::new(
            mock_server.uri(),
            "mirror-key".to_string(),
            "mirror-secret".to_string(),
            "m-".to_string(),
            pool,
        );

        let result = writer
            .write(
                Style::Path,
                "data",
                "a/b.txt",
                "PUT",
                None,
                &BTreeMap::new(),
                b"hi",
                1_369_353_600,
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_mirror_write_surfaces_non_success_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("disk full"))
            .mount(&mock_server)
            .await;

        let pool = HttpClientPool::new(HttpClientConfig::default()).unwrap();
        let writer = MirrorWriter::new(
            mock_server.uri(),
            "mirror-key".to_string(),
            "mirror-secret".to_string(),
            String::new(),
            pool,
        );

        let result = writer
            .write(
                Style::Path,
                "data",
                "a/b.txt",
                "DELETE",
                None,
                &BTreeMap::new(),
                b"",
                1_369_353_600,
            )
            .await;
        match result {
            Err(MirrorError::NonSuccess(500, body)) => assert_eq!(body, "disk full"),
            other => panic!("expected NonSuccess(500, _), got {other:?}"),
        }
    }
}
