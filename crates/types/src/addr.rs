// Path: crates/types/src/addr.rs

//! Multiaddr helpers.
//!
//! Contact addresses on the wire and on disk are textual multiaddrs. Legacy
//! `host:port` input is accepted and normalized to `/ip4/<host>/tcp/<port>`
//! (or `/dns4/...` for names).

use crate::error::TransportError;
use multiaddr::{Multiaddr, Protocol};
use std::net::{IpAddr, SocketAddr};

/// Normalizes user-supplied address input to a canonical multiaddr string.
pub fn normalize(input: &str) -> Result<String, TransportError> {
    let trimmed = input.trim();
    if trimmed.starts_with('/') {
        let ma: Multiaddr = trimmed
            .parse()
            .map_err(|e| TransportError::BadAddress(format!("{trimmed}: {e}")))?;
        return Ok(ma.to_string());
    }
    // Legacy host:port form.
    let (host, port) = trimmed
        .rsplit_once(':')
        .ok_or_else(|| TransportError::BadAddress(trimmed.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| TransportError::BadAddress(trimmed.to_string()))?;
    let ma = match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Multiaddr::empty()
            .with(Protocol::Ip4(ip))
            .with(Protocol::Tcp(port)),
        Ok(IpAddr::V6(ip)) => Multiaddr::empty()
            .with(Protocol::Ip6(ip))
            .with(Protocol::Tcp(port)),
        Err(_) => {
            if host.is_empty() {
                return Err(TransportError::BadAddress(trimmed.to_string()));
            }
            Multiaddr::empty()
                .with(Protocol::Dns4(host.into()))
                .with(Protocol::Tcp(port))
        }
    };
    Ok(ma.to_string())
}

/// Extracts a dialable `host:port` pair from a multiaddr.
///
/// Only `/ip4`, `/ip6` and `/dns4`/`/dns` with `/tcp` are supported by the
/// in-tree transport; anything else is rejected.
pub fn dial_target(addr: &str) -> Result<(String, u16), TransportError> {
    let ma: Multiaddr = addr
        .parse()
        .map_err(|e| TransportError::BadAddress(format!("{addr}: {e}")))?;
    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;
    for proto in ma.iter() {
        match proto {
            Protocol::Ip4(ip) => host = Some(ip.to_string()),
            Protocol::Ip6(ip) => host = Some(ip.to_string()),
            Protocol::Dns4(name) | Protocol::Dns(name) => host = Some(name.to_string()),
            Protocol::Tcp(p) => port = Some(p),
            _ => {}
        }
    }
    match (host, port) {
        (Some(h), Some(p)) => Ok((h, p)),
        _ => Err(TransportError::BadAddress(addr.to_string())),
    }
}

/// Builds the multiaddr for a local listen socket.
pub fn from_socket_addr(addr: &SocketAddr) -> String {
    let ma = match addr.ip() {
        IpAddr::V4(ip) => Multiaddr::empty()
            .with(Protocol::Ip4(ip))
            .with(Protocol::Tcp(addr.port())),
        IpAddr::V6(ip) => Multiaddr::empty()
            .with(Protocol::Ip6(ip))
            .with(Protocol::Tcp(addr.port())),
    };
    ma.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_canonical_multiaddrs() {
        assert_eq!(
            normalize("/ip4/127.0.0.1/tcp/19000").unwrap(),
            "/ip4/127.0.0.1/tcp/19000"
        );
    }

    #[test]
    fn normalizes_legacy_host_port() {
        assert_eq!(
            normalize("127.0.0.1:19000").unwrap(),
            "/ip4/127.0.0.1/tcp/19000"
        );
        assert_eq!(
            normalize("relay.example.org:4001").unwrap(),
            "/dns4/relay.example.org/tcp/4001"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize("not an address").is_err());
        assert!(normalize("host:notaport").is_err());
        assert!(normalize("/ip4/127.0.0.1/tcp/nope").is_err());
    }

    #[test]
    fn dial_target_extracts_host_and_port() {
        assert_eq!(
            dial_target("/ip4/10.1.2.3/tcp/9000").unwrap(),
            ("10.1.2.3".to_string(), 9000)
        );
        assert_eq!(
            dial_target("/dns4/example.org/tcp/80").unwrap(),
            ("example.org".to_string(), 80)
        );
        assert!(dial_target("/unix/tmp/sock").is_err());
    }

    #[test]
    fn socket_addr_round_trip() {
        let sa: SocketAddr = "127.0.0.1:19000".parse().unwrap();
        let ma = from_socket_addr(&sa);
        assert_eq!(dial_target(&ma).unwrap(), ("127.0.0.1".to_string(), 19000));
    }
}
