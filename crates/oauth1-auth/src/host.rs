//! IPv4 host restriction matching.
//!
//! A consumer can be pinned to a single address (`10.0.0.5`) or a CIDR
//! network (`10.0.0.0/24`). Remote addresses may arrive in IPv4-mapped IPv6
//! form (`::ffff:10.0.0.5`); plain IPv6 networks are not supported.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

/// Prefix used by dual-stack sockets for IPv4-mapped addresses.
const IPV4_MAPPED_PREFIX: &str = "::ffff:";

/// Check whether `address` falls within `network`.
///
/// A network without `/` must equal the address exactly. A network with an
/// empty (or zero) prefix length matches every valid address. An address or
/// network that is not a dotted quad never matches.
///
/// # Examples
///
/// ```
/// use oauth1_auth::host::network_match;
///
/// assert!(network_match("10.0.0.0/24", "10.0.0.5"));
/// assert!(!network_match("10.0.0.0/24", "10.0.1.5"));
/// assert!(network_match("10.0.0.5", "::ffff:10.0.0.5"));
/// ```
#[must_use]
pub fn network_match(network: &str, address: &str) -> bool {
    let address = address.strip_prefix(IPV4_MAPPED_PREFIX).unwrap_or(address);
    let Ok(ip) = address.parse::<Ipv4Addr>() else {
        return false;
    };

    let Some((network_addr, prefix)) = network.split_once('/') else {
        return network.parse::<Ipv4Addr>() == Ok(ip);
    };

    if prefix.is_empty() {
        return true;
    }

    let (Ok(network_ip), Ok(prefix)) = (network_addr.parse::<Ipv4Addr>(), prefix.parse::<u8>())
    else {
        return false;
    };

    Ipv4Network::new(network_ip, prefix).is_ok_and(|net| net.contains(ip))
}
