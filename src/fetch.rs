//! Final content retrieval, pinned to the verified address.
//!
//! Issuing the fetch against the hostname alone would trigger a second,
//! independent DNS resolution and reopen the rebinding window the connector
//! just closed. The client therefore pins the hostname to the verified peer
//! address; the original hostname is still what TLS verifies against.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect;

use crate::connect::VerifiedPeer;
use crate::gate::Target;
use crate::types::{ErrorCode, GuardConfig, GuardError, Payload};

/// GET the target URL through a client locked to the verified peer.
///
/// Redirects are not followed; a redirect response fails like any other
/// non-2xx status, and the caller may re-enter the guard with the new URL if
/// it chooses to.
///
/// # Errors
///
/// [`ErrorCode::FetchError`] for client construction, transport, status,
/// and size-cap failures.
pub async fn retrieve(
    target: &Target,
    peer: VerifiedPeer,
    config: &GuardConfig,
) -> Result<Payload, GuardError> {
    let pinned = SocketAddr::new(peer.addr.ip(), target.port());

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent())
        .redirect(redirect::Policy::none())
        .timeout(Duration::from_secs(u64::from(config.fetch_timeout_seconds())))
        .resolve(target.host(), pinned)
        .build()
        .map_err(|e| {
            GuardError::new(ErrorCode::FetchError, format!("client build failed: {e}"), false)
        })?;

    let response = client
        .get(target.url().clone())
        .send()
        .await
        .map_err(|e| fetch_error(target, &e.to_string(), !e.is_builder()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fetch_error(
            target,
            &format!("unexpected status {status}"),
            status.is_server_error(),
        )
        .with_detail("status", status.as_str()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cap = config.max_download_bytes();
    if let Some(declared) = response.content_length()
        && declared > cap
    {
        return Err(fetch_error(
            target,
            &format!("declared length {declared} exceeds limit {cap}"),
            false,
        )
        .with_detail("content_length", declared.to_string()));
    }

    // Content-Length is advisory; enforce the cap on the wire as well.
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| fetch_error(target, &format!("body read failed: {e}"), true))?;
        if body.len() as u64 + chunk.len() as u64 > cap {
            return Err(fetch_error(
                target,
                &format!("payload exceeds limit {cap}"),
                false,
            ));
        }
        body.extend_from_slice(&chunk);
    }

    tracing::debug!(url = target.original(), bytes = body.len(), "retrieved");

    Ok(Payload {
        body,
        content_type,
        status: status.as_u16(),
    })
}

fn fetch_error(target: &Target, message: &str, retryable: bool) -> GuardError {
    GuardError::new(ErrorCode::FetchError, message, retryable)
        .with_detail("url", target.original())
}
