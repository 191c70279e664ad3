//! Request Dispatcher.
//!
//! Accepts an inbound request already split from its connection, parses
//! addressing, signs and forwards it to the primary, streams the primary's
//! response back, and — on a 2xx mutating response for a recognized S3
//! object request — spawns the asynchronous Inventory + Mirror
//! continuation described in spec §4.6/§5. The connection-accept loop lives
//! in `main.rs` (grounded on `run_serve` in `barbacane`'s `main.rs`); this
//! module is the pure per-request logic, exercised directly by the
//! `wiremock` integration tests under `tests/`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

use s3proxy_inventory::InventoryStore;
use s3proxy_telemetry::{log_dispatch_error, log_inventory_failure, log_mirror_failure, log_request_completed};

use crate::addressing::{parse_addressing, Style};
use crate::config::{Config, S3_REGION};
use crate::httpclient::HttpClientPool;
use crate::mirror::MirrorWriter;
use crate::outbound::{build_outbound_request, forwarded_headers};

/// Hop-by-hop headers dropped from the response before it's relayed to the
/// client (RFC 9110 §7.6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// State shared by every connection and request.
pub struct AppState {
    pub config: Config,
    pub pool: Arc<HttpClientPool>,
    pub inventory: Arc<InventoryStore>,
    pub mirror: Arc<MirrorWriter>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn is_mutating(method: &str) -> bool {
    matches!(method, "PUT" | "POST" | "DELETE")
}

/// Handle one inbound request to completion.
///
/// Never returns `Err` — transport/primary failures become a `502` response
/// to the client (spec §7: "Primary unreachable ... Dispatcher returns 502
/// Bad Gateway").
pub async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let method = parts.method.as_str().to_string();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(|q| q.to_string());
    let host = parts
        .headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let forwarded = forwarded_headers(&parts.headers);

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            log_dispatch_error!(error = %e, "failed to read request body");
            return Ok(bad_gateway());
        }
    };

    let addressing = parse_addressing(&host, &path, state.config.proxy_domain.as_deref());

    let creds = s3proxy_sigv4::Credentials {
        access_key_id: state.config.main_access_key.clone(),
        secret_access_key: state.config.main_secret_key.clone(),
    };

    // Per spec §4.6 step 3, the primary-forward path is the inbound path
    // verbatim in both styles — not a reconstruction from (bucket, key),
    // which would silently normalize things like a bucket-root request's
    // trailing slash.
    let outbound = build_outbound_request(
        addressing.style,
        &state.config.main_endpoint,
        &addressing.bucket,
        &path,
        &method,
        query.as_deref(),
        &forwarded,
        &body_bytes,
        &creds,
        S3_REGION,
        unix_now(),
    );

    let reqwest_method = match outbound.method.parse::<reqwest::Method>() {
        Ok(m) => m,
        Err(_) => return Ok(bad_gateway()),
    };
    let mut req_builder = state.pool.client().request(reqwest_method, &outbound.url);
    for (name, value) in &outbound.headers {
        req_builder = req_builder.header(name.as_str(), value.as_str());
    }
    req_builder = req_builder.body(outbound.body.clone());

    let primary_response = match req_builder.send().await {
        Ok(r) => r,
        Err(e) => {
            log_dispatch_error!(
                error = %e,
                bucket = %addressing.bucket,
                key = %addressing.key,
                "primary unreachable"
            );
            return Ok(bad_gateway());
        }
    };

    let status = primary_response.status();
    let response_headers = primary_response.headers().clone();
    let response_content_type = response_headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let response_body = match primary_response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            log_dispatch_error!(error = %e, "failed to read primary response body");
            return Ok(bad_gateway());
        }
    };

    if status.as_u16() >= 400 {
        log_dispatch_error!(
            status = status.as_u16(),
            bucket = %addressing.bucket,
            key = %addressing.key,
            "primary returned error status"
        );
    } else {
        log_request_completed!(
            status = status.as_u16(),
            method = %method,
            bucket = %addressing.bucket,
            key = %addressing.key
        );
    }

    if status.is_success() && addressing.is_object_request() && is_mutating(&method) {
        // The object's size is the uploaded request body, not the primary's
        // ack response body (a successful S3 PUT/POST ack is typically
        // empty, often with an explicit `Content-Length: 0`).
        let size = body_bytes.len() as i64;
        let continuation_state = state.clone();
        let style = addressing.style;
        let bucket = addressing.bucket.clone();
        let key = addressing.key.clone();

        tokio::spawn(run_async_continuation(
            continuation_state,
            style,
            bucket,
            key,
            method.clone(),
            query.clone(),
            forwarded.clone(),
            body_bytes.clone(),
            size,
            response_content_type,
        ));
    }

    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in response_headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str().to_lowercase().as_str()) {
            continue;
        }
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }
    Ok(builder
        .body(Full::new(response_body))
        .unwrap_or_else(|_| bad_gateway()))
}

/// Inventory upsert, mirror round-trip, inventory `is_backed_up` update —
/// spawned as a detached task per spec §4.6/§5. Never joined; failures are
/// logged and never surfaced (spec §7).
#[allow(clippy::too_many_arguments)]
async fn run_async_continuation(
    state: Arc<AppState>,
    style: Style,
    bucket: String,
    key: String,
    method: String,
    query: Option<String>,
    forwarded: BTreeMap<String, String>,
    body: Bytes,
    size: i64,
    content_type: String,
) {
    if method == "DELETE" {
        if let Err(e) = state
            .inventory
            .record_delete(&bucket, &key, chrono::Utc::now())
            .await
        {
            log_inventory_failure!(error = %e, bucket = %bucket, key = %key, "record_delete failed");
        }
    } else if let Err(e) = state
        .inventory
        .record_put(&bucket, &key, size, &content_type, chrono::Utc::now())
        .await
    {
        log_inventory_failure!(error = %e, bucket = %bucket, key = %key, "record_put failed");
    }

    let mirror_result = state
        .mirror
        .write(
            style,
            &bucket,
            &key,
            &method,
            query.as_deref(),
            &forwarded,
            &body,
            unix_now(),
        )
        .await;

    match mirror_result {
        Ok(()) => {
            if method != "DELETE" {
                if let Err(e) = state.inventory.mark_backed_up(&bucket, &key).await {
                    log_inventory_failure!(error = %e, bucket = %bucket, key = %key, "mark_backed_up failed");
                }
            }
        }
        Err(e) => {
            log_mirror_failure!(error = %e, bucket = %bucket, key = %key, "mirror write failed");
        }
    }
}

fn bad_gateway() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .body(Full::new(Bytes::from_static(b"bad gateway")))
        .expect("static bad-gateway response is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_mutating() {
        assert!(is_mutating("PUT"));
        assert!(is_mutating("POST"));
        assert!(is_mutating("DELETE"));
        assert!(!is_mutating("GET"));
        assert!(!is_mutating("HEAD"));
    }
}
