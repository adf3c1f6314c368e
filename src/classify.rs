//! Address classification.
//!
//! A pure verdict function over resolved and observed peer addresses. The
//! guard calls it twice per request, once on the DNS answer set and once on
//! the post-handshake peer address, and never carries a verdict from one
//! point to the other: a cached verdict is exactly the rebinding hole this
//! crate exists to close.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Classify an address, returning the reason it is private/reserved, or
/// `None` when it is publicly routable.
#[must_use]
pub fn private_reason(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => v4_private_reason(v4),
        IpAddr::V6(v6) => v6_private_reason(v6),
    }
}

fn v4_private_reason(ip: Ipv4Addr) -> Option<&'static str> {
    if ip.is_unspecified() {
        return Some("unspecified address (0.0.0.0)");
    }
    if ip.is_loopback() {
        return Some("loopback address (127.0.0.0/8)");
    }
    if ip.is_link_local() {
        // Covers the cloud-metadata endpoint 169.254.169.254.
        return Some("link-local address (169.254.0.0/16)");
    }
    if ip.is_private() {
        return Some("private address (RFC 1918)");
    }
    if ip.is_broadcast() {
        return Some("broadcast address (255.255.255.255)");
    }
    if ip == Ipv4Addr::new(100, 100, 100, 200) {
        return Some("cloud metadata endpoint (100.100.100.200)");
    }
    None
}

fn v6_private_reason(ip: Ipv6Addr) -> Option<&'static str> {
    if ip.is_unspecified() {
        return Some("unspecified address (::)");
    }
    if ip.is_loopback() {
        return Some("loopback address (::1)");
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return v4_private_reason(v4);
    }
    // IPv4-compatible form (::x.x.x.x), deprecated but still routable. ::1
    // was already handled above, so any remaining low-segment value embeds a
    // real IPv4 address in the last 32 bits.
    let segments = ip.segments();
    if segments[0..6] == [0, 0, 0, 0, 0, 0] && (segments[6] != 0 || segments[7] > 1) {
        let v4 = Ipv4Addr::new(
            (segments[6] >> 8) as u8,
            segments[6] as u8,
            (segments[7] >> 8) as u8,
            segments[7] as u8,
        );
        return v4_private_reason(v4);
    }
    if (segments[0] & 0xffc0) == 0xfe80 {
        return Some("link-local address (fe80::/10)");
    }
    if (segments[0] & 0xfe00) == 0xfc00 {
        return Some("unique-local address (fc00::/7)");
    }
    None
}

/// True when the address is loopback, in either family.
///
/// Used only by the `allow_insecure_overrides` test escape hatch; the
/// classification above stays untouched by configuration.
#[must_use]
pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn public_addresses_pass() {
        assert!(private_reason(ip("93.184.216.34")).is_none());
        assert!(private_reason(ip("8.8.8.8")).is_none());
        assert!(private_reason(ip("2606:2800:220:1:248:1893:25c8:1946")).is_none());
    }

    #[test]
    fn loopback_is_private() {
        assert!(private_reason(ip("127.0.0.1")).is_some());
        assert!(private_reason(ip("127.255.255.254")).is_some());
        assert!(private_reason(ip("::1")).is_some());
    }

    #[test]
    fn rfc1918_is_private() {
        assert!(private_reason(ip("10.0.0.1")).is_some());
        assert!(private_reason(ip("10.255.255.255")).is_some());
        assert!(private_reason(ip("172.16.0.1")).is_some());
        assert!(private_reason(ip("172.31.255.255")).is_some());
        assert!(private_reason(ip("192.168.0.1")).is_some());
        assert!(private_reason(ip("192.168.255.255")).is_some());
    }

    #[test]
    fn rfc1918_boundaries_pass() {
        assert!(private_reason(ip("11.0.0.0")).is_none());
        assert!(private_reason(ip("172.32.0.0")).is_none());
        assert!(private_reason(ip("192.169.0.0")).is_none());
    }

    #[test]
    fn link_local_and_metadata_are_private() {
        assert!(private_reason(ip("169.254.0.1")).is_some());
        assert!(private_reason(ip("169.254.169.254")).is_some());
        assert!(private_reason(ip("100.100.100.200")).is_some());
        assert!(private_reason(ip("fe80::1")).is_some());
    }

    #[test]
    fn unspecified_is_private() {
        assert!(private_reason(ip("0.0.0.0")).is_some());
        assert!(private_reason(ip("::")).is_some());
    }

    #[test]
    fn v4_mapped_v6_inherits_v4_verdict() {
        assert!(private_reason(ip("::ffff:127.0.0.1")).is_some());
        assert!(private_reason(ip("::ffff:192.168.1.1")).is_some());
        assert!(private_reason(ip("::ffff:8.8.8.8")).is_none());
    }

    #[test]
    fn v4_compatible_v6_inherits_v4_verdict() {
        assert!(private_reason(ip("::169.254.169.254")).is_some());
        assert!(private_reason(ip("::10.0.0.1")).is_some());
    }

    #[test]
    fn unique_local_is_private() {
        assert!(private_reason(ip("fc00::1")).is_some());
        assert!(private_reason(ip("fd12:3456::1")).is_some());
    }

    #[test]
    fn loopback_helper_covers_both_families() {
        assert!(is_loopback(ip("127.0.0.1")));
        assert!(is_loopback(ip("::1")));
        assert!(is_loopback(ip("::ffff:127.0.0.1")));
        assert!(!is_loopback(ip("8.8.8.8")));
    }
}
