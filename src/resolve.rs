//! Address resolution and first-pass screening.
//!
//! Resolution is a trait seam so tests can count lookups and script answer
//! sets; production uses the system resolver through tokio. The screening
//! policy is reject-if-any-private: an attacker-influenced multi-answer
//! response can place the private record anywhere in the list, so inspecting
//! only the first choice is not enough.

use std::io;
use std::net::IpAddr;

use tokio::net::lookup_host;

use crate::classify;
use crate::gate::Target;
use crate::types::{ErrorCode, GuardConfig, GuardError};

/// Forward DNS lookup seam.
pub trait Resolve: Send + Sync {
    /// Resolve a hostname to its ordered address records.
    ///
    /// Order must be preserved; the first record is the connection target.
    fn lookup(&self, host: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>> + Send;
}

impl<R: Resolve> Resolve for &R {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        (**self).lookup(host).await
    }
}

/// System resolver via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl Resolve for DnsResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        // Port 0 satisfies ToSocketAddrs; only the addresses are kept.
        let addrs = lookup_host((host, 0u16)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// Resolve the target hostname and screen every record.
///
/// IP-literal hosts short-circuit to a single record without touching the
/// resolver. Returns the first record of a fully public answer set.
///
/// # Errors
///
/// [`ErrorCode::ResolutionError`] when the lookup fails or yields nothing,
/// [`ErrorCode::PrivateAddressFirstPass`] when any record classifies private.
pub async fn resolve_and_screen<R: Resolve>(
    resolver: &R,
    target: &Target,
    config: &GuardConfig,
) -> Result<IpAddr, GuardError> {
    let records = if let Ok(literal) = target.host().parse::<IpAddr>() {
        vec![literal]
    } else {
        resolver.lookup(target.host()).await.map_err(|e| {
            GuardError::new(
                ErrorCode::ResolutionError,
                format!("DNS lookup for '{}' failed: {e}", target.host()),
                true,
            )
            .with_detail("host", target.host())
        })?
    };

    if records.is_empty() {
        return Err(GuardError::new(
            ErrorCode::ResolutionError,
            format!("DNS lookup for '{}' returned no addresses", target.host()),
            true,
        )
        .with_detail("host", target.host()));
    }

    tracing::debug!(host = target.host(), records = records.len(), "resolved");

    for record in &records {
        if let Some(reason) = screen(*record, config) {
            tracing::warn!(host = target.host(), ip = %record, reason, "blocked at first pass");
            return Err(GuardError::new(
                ErrorCode::PrivateAddressFirstPass,
                format!("resolved address {record} is {reason}"),
                false,
            )
            .with_detail("host", target.host())
            .with_detail("ip", record.to_string()));
        }
    }

    Ok(records[0])
}

/// Classification verdict for one record, honoring the loopback test
/// exemption when insecure overrides are on.
pub(crate) fn screen(ip: IpAddr, config: &GuardConfig) -> Option<&'static str> {
    let reason = classify::private_reason(ip)?;
    if config.allow_insecure_overrides && classify::is_loopback(ip) {
        return None;
    }
    Some(reason)
}
