//! Resolves the addresses an announce is speaking for.
//!
//! Resolution order:
//!
//! 1. The TCP connection's remote address is the default external IP.
//! 2. An `x-forwarded-for` or `clientipaddr` header with a parsable literal
//!    replaces it (already filtered by the extractor).
//! 3. The `ipv4=`/`ipv6=` query params may supply the *other* address
//!    family, only when that family is not already known.
//!
//! The external IP is what the reply echoes back to the client; the per
//! family addresses are what NAT checks probe and handouts advertise.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::panic::Location;

use thiserror::Error;

/// The sources from which the peer IP can be obtained.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ClientIpSources {
    /// A single IP literal from the `x-forwarded-for` or `clientipaddr`
    /// header.
    pub header_ip: Option<IpAddr>,
    /// The IP from the connection info.
    pub connection_ip: Option<IpAddr>,
}

/// The resolved addresses of one announce.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ResolvedAddresses {
    /// The IP the tracker observed; echoed in the `external ip` reply key.
    pub external_ip: IpAddr,
    pub v4: Option<Ipv4Addr>,
    pub v6: Option<Ipv6Addr>,
}

/// The error that can occur when resolving the peer IP.
#[derive(Error, Debug)]
pub enum PeerIpResolutionError {
    /// The connection info was not provided to the axum framework via a
    /// route extension and no forwarding header was usable.
    #[error("cannot get the client IP from the connection info in {location}")]
    MissingClientIp { location: &'static Location<'static> },
}

/// Resolves the external IP and the per family claimed addresses.
///
/// # Errors
///
/// Will return an error if no source yields an IP at all.
pub fn invoke(
    sources: &ClientIpSources,
    param_v4: Option<Ipv4Addr>,
    param_v6: Option<Ipv6Addr>,
) -> Result<ResolvedAddresses, PeerIpResolutionError> {
    let mut v4 = None;
    let mut v6 = None;

    let external_ip = match sources.header_ip.or(sources.connection_ip) {
        Some(ip) => ip,
        None => {
            return Err(PeerIpResolutionError::MissingClientIp {
                location: Location::caller(),
            })
        }
    };

    match external_ip {
        IpAddr::V4(addr) => v4 = Some(addr),
        IpAddr::V6(addr) => v6 = Some(addr),
    }

    // the query params may only supply the family we do not know yet
    if v4.is_none() {
        v4 = param_v4;
    }
    if v6.is_none() {
        v6 = param_v6;
    }

    Ok(ResolvedAddresses { external_ip, v4, v6 })
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::{invoke, ClientIpSources};

    fn sources(header: Option<&str>, connection: Option<&str>) -> ClientIpSources {
        ClientIpSources {
            header_ip: header.map(|ip| ip.parse().unwrap()),
            connection_ip: connection.map(|ip| ip.parse().unwrap()),
        }
    }

    #[test]
    fn the_connection_ip_is_the_default_external_ip() {
        let resolved = invoke(&sources(None, Some("2.137.87.41")), None, None).unwrap();

        assert_eq!(resolved.external_ip, "2.137.87.41".parse::<IpAddr>().unwrap());
        assert_eq!(resolved.v4, Some("2.137.87.41".parse().unwrap()));
        assert_eq!(resolved.v6, None);
    }

    #[test]
    fn a_header_literal_overrides_the_connection_ip() {
        let resolved = invoke(&sources(Some("203.0.113.195"), Some("2.137.87.41")), None, None).unwrap();

        assert_eq!(resolved.external_ip, "203.0.113.195".parse::<IpAddr>().unwrap());
        assert_eq!(resolved.v4, Some("203.0.113.195".parse().unwrap()));
    }

    #[test]
    fn the_params_supply_only_the_missing_family() {
        let resolved = invoke(
            &sources(None, Some("2.137.87.41")),
            Some("198.51.100.1".parse().unwrap()),
            Some("2001:db8::1".parse().unwrap()),
        )
        .unwrap();

        // v4 is already known from the connection, so the param is ignored
        assert_eq!(resolved.v4, Some("2.137.87.41".parse().unwrap()));
        assert_eq!(resolved.v6, Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn a_v6_connection_takes_the_v4_from_the_params() {
        let resolved = invoke(
            &sources(None, Some("2001:db8::7")),
            Some("198.51.100.1".parse().unwrap()),
            None,
        )
        .unwrap();

        assert_eq!(resolved.external_ip, "2001:db8::7".parse::<IpAddr>().unwrap());
        assert_eq!(resolved.v6, Some("2001:db8::7".parse().unwrap()));
        assert_eq!(resolved.v4, Some("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn it_fails_without_any_source() {
        assert!(invoke(&sources(None, None), None, None).is_err());
    }
}
