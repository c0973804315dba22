//! Source address extraction and normalisation.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use axum::http::HeaderMap;

use crate::ratelimit::constants::IPV6_PREFIX_BITS;

/// Pick the client address for a request.
///
/// Forwarding headers are consulted only when `trust_proxy` is set, first
/// entry of `X-Forwarded-For` before `X-Real-IP`. Without a usable header
/// the peer address is used.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        let forwarded = headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse().ok());
        let real = || {
            headers
                .get("X-Real-IP")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
        };
        if let Some(ip) = forwarded.or_else(real) {
            return ip;
        }
    }
    peer.ip()
}

/// Key used for limiter bookkeeping.
///
/// IPv4 addresses are kept as-is. IPv6 addresses are reduced to their /64
/// network so one allocation cannot rotate through addresses.
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => {
                let mask = u128::MAX << (128 - IPV6_PREFIX_BITS);
                let network = Ipv6Addr::from(u128::from(v6) & mask);
                format!("{network}/{IPV6_PREFIX_BITS}")
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 40000)
    }

    #[test]
    fn test_normalize_ipv4() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(normalize_ip(ip), "192.168.1.100");
    }

    #[test]
    fn test_normalize_ipv6_groups_by_prefix() {
        let a = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0x85a3, 0x1234, 0, 0, 0, 1));
        let b = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0x85a3, 0x1234, 0xffff, 1, 2, 3));
        assert_eq!(normalize_ip(a), "2001:db8:85a3:1234::/64");
        assert_eq!(normalize_ip(a), normalize_ip(b));

        let other = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0x85a3, 0x1235, 0, 0, 0, 1));
        assert_ne!(normalize_ip(a), normalize_ip(other));
    }

    #[test]
    fn test_normalize_mapped_ipv4() {
        let ip: IpAddr = "::ffff:203.0.113.7".parse().unwrap();
        assert_eq!(normalize_ip(ip), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_ignores_headers_without_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.50".parse().unwrap());
        assert_eq!(client_ip(&headers, peer(), false), peer().ip());
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.50, 70.41.3.18".parse().unwrap());
        headers.insert("X-Real-IP", "198.51.100.25".parse().unwrap());
        assert_eq!(
            client_ip(&headers, peer(), true),
            IpAddr::V4(Ipv4Addr::new(203, 0, 113, 50))
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "garbage".parse().unwrap());
        headers.insert("X-Real-IP", "198.51.100.25".parse().unwrap());
        assert_eq!(
            client_ip(&headers, peer(), true),
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 25))
        );

        assert_eq!(client_ip(&HeaderMap::new(), peer(), true), peer().ip());
    }
}
