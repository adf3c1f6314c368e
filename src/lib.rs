//! Guarded URL fetching for server-side requests.
//!
//! Given a user-supplied URL the server will fetch on the user's behalf
//! (an avatar image, a link preview), this crate guarantees the underlying
//! connection never reaches a private, loopback, or link-local address —
//! including when the DNS answer changes between validation and connection
//! (DNS rebinding).
//!
//! # Pipeline
//!
//! Each call composes three phases strictly in order; no phase is skipped or
//! reordered, and no state is shared between calls:
//!
//! 1. **URL Gate** - parse, reject disallowed schemes before any network I/O
//! 2. **Resolve & classify** - forward DNS lookup; reject if *any* record is
//!    private; select the first record
//! 3. **Verified connect** - bounded raw connect to the selected address,
//!    then re-classify the peer address the transport actually reached
//! 4. Final retrieval against the original URL, pinned to the verified
//!    address so no second resolution can reopen the rebinding window
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `types` | configuration, payload, structured errors |
//! | `gate` | URL parsing and scheme policy |
//! | `classify` | pure private/public address verdicts |
//! | `resolve` | DNS lookup seam and first-pass screening |
//! | `connect` | bounded handshake and post-handshake verification |
//! | `fetch` | pinned HTTP retrieval |
//!
//! # Usage
//!
//! ```ignore
//! use fetchguard::{fetch_guarded, GuardConfig};
//!
//! let payload = fetch_guarded("https://example.com/avatar.png", &GuardConfig::default()).await?;
//! println!("{} bytes, {:?}", payload.body.len(), payload.content_type);
//! ```
//!
//! # Error handling
//!
//! All failures are [`GuardError`] values with a stable [`ErrorCode`], a
//! human-readable message, and a `retryable` hint. The guard never retries on
//! its own: a fresh call performs a fresh resolution and handshake, which is
//! what closes a detected rebinding window.

mod classify;
mod connect;
mod fetch;
mod gate;
mod resolve;
mod types;

use std::net::SocketAddr;

pub use classify::private_reason;
pub use connect::{HANDSHAKE_TIMEOUT, TcpTransport, Transport, VerifiedPeer};
pub use resolve::{DnsResolver, Resolve};
pub use types::{ErrorCode, ErrorDetails, GuardConfig, GuardError, Payload};

/// The guard with its two injectable seams.
///
/// Production callers use [`Guard::new`] (system resolver, TCP transport) or
/// the [`fetch_guarded`] shorthand. Tests inject counting resolvers and
/// redirected transports through [`Guard::with_parts`].
#[derive(Debug, Clone)]
pub struct Guard<R = DnsResolver, T = TcpTransport> {
    resolver: R,
    transport: T,
    config: GuardConfig,
}

impl Guard {
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        Self::with_parts(config, DnsResolver, TcpTransport)
    }
}

impl<R: Resolve, T: Transport> Guard<R, T> {
    #[must_use]
    pub fn with_parts(config: GuardConfig, resolver: R, transport: T) -> Self {
        Self {
            resolver,
            transport,
            config,
        }
    }

    /// Run the full guarded fetch for one URL.
    ///
    /// # Errors
    ///
    /// One [`GuardError`] per failure kind; see [`ErrorCode`]. Every failure
    /// is terminal for this call.
    pub async fn fetch(&self, url: &str) -> Result<Payload, GuardError> {
        let target = gate::Target::parse(url, &self.config)?;

        let selected = resolve::resolve_and_screen(&self.resolver, &target, &self.config).await?;

        let dial = SocketAddr::new(selected, target.port());
        let peer = connect::verify_peer(&self.transport, dial, &self.config).await?;

        fetch::retrieve(&target, peer, &self.config).await
    }
}

/// Fetch a URL with the default resolver and transport.
///
/// The single operation exposed to collaborators: a URL string in, a byte
/// payload with content metadata or a classified error out.
///
/// # Errors
///
/// See [`ErrorCode`] for the failure taxonomy.
pub async fn fetch_guarded(url: &str, config: &GuardConfig) -> Result<Payload, GuardError> {
    Guard::new(config.clone()).fetch(url).await
}
