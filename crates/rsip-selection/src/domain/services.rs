//! Pure address-selection logic over kernel observations.

use std::net::Ipv6Addr;

use super::errors::PoolError;
use super::types::{InterfaceAddress, InterfaceIndex, NetworkPrefix};

/// Publicly routable IPv6 scope.
///
/// Excludes unspecified, loopback, multicast and link-local (`fe80::/10`)
/// addresses. IPv4-mapped addresses are IPv4 in canonical form and are
/// excluded as well.
pub fn is_global_unicast(address: &Ipv6Addr) -> bool {
    if address.to_ipv4_mapped().is_some() {
        return false;
    }
    let link_local = (address.segments()[0] & 0xffc0) == 0xfe80;
    !(address.is_unspecified() || address.is_loopback() || address.is_multicast() || link_local)
}

/// Addresses a socket may be bound to, in kernel order.
pub fn eligible_candidates(addresses: &[InterfaceAddress]) -> Vec<Ipv6Addr> {
    addresses
        .iter()
        .filter(|a| is_global_unicast(&a.address) && !a.flags.is_unusable())
        .map(|a| a.address)
        .collect()
}

/// Derive the single /64 network prefix of an interface.
///
/// Every global unicast address must be a /64. Addresses sharing a prefix
/// (including managed addresses derived from it) count once.
pub fn network_prefix(
    interface: InterfaceIndex,
    addresses: &[InterfaceAddress],
) -> Result<NetworkPrefix, PoolError> {
    let mut prefixes: Vec<NetworkPrefix> = Vec::new();

    for entry in addresses.iter().filter(|a| is_global_unicast(&a.address)) {
        if entry.prefix_len != NetworkPrefix::LEN {
            return Err(PoolError::PrefixShape {
                interface,
                address: entry.address,
                prefix_len: entry.prefix_len,
            });
        }
        let prefix = NetworkPrefix::of(entry.address);
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }

    match prefixes.as_slice() {
        [] => Err(PoolError::NoPrefix(interface)),
        [prefix] => Ok(*prefix),
        many => Err(PoolError::MultiplePrefixes {
            interface,
            count: many.len(),
        }),
    }
}

/// Map a raw random draw onto `0..len`. `len` must be non-zero.
pub fn pick_index(draw: u64, len: usize) -> usize {
    (draw % len as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressFlags, HostSuffix};

    fn addr(s: &str, prefix_len: u8) -> InterfaceAddress {
        InterfaceAddress::new(s.parse().unwrap(), prefix_len)
    }

    const IFACE: InterfaceIndex = InterfaceIndex::new(2);

    #[test]
    fn test_global_unicast_scope() {
        assert!(is_global_unicast(&"2001:db8::1".parse().unwrap()));
        assert!(is_global_unicast(&"fd00::1".parse().unwrap()));
        assert!(!is_global_unicast(&"fe80::1".parse().unwrap()));
        assert!(!is_global_unicast(&"febf::1".parse().unwrap()));
        assert!(!is_global_unicast(&"ff02::1".parse().unwrap()));
        assert!(!is_global_unicast(&Ipv6Addr::LOCALHOST));
        assert!(!is_global_unicast(&Ipv6Addr::UNSPECIFIED));
        assert!(!is_global_unicast(&"::ffff:192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_candidates_skip_link_local_and_tentative() {
        let tentative = addr("2001:db8::3", 64)
            .with_flags(AddressFlags::default().with(AddressFlags::TENTATIVE));
        let deprecated = addr("2001:db8::4", 64)
            .with_flags(AddressFlags::default().with(AddressFlags::DEPRECATED));
        let addrs = vec![
            addr("fe80::1", 64),
            addr("2001:db8::2", 64),
            tentative,
            deprecated,
            addr("::ffff:10.0.0.1", 96),
        ];

        let candidates = eligible_candidates(&addrs);
        assert_eq!(
            candidates,
            vec![
                "2001:db8::2".parse::<Ipv6Addr>().unwrap(),
                "2001:db8::4".parse::<Ipv6Addr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_prefix_from_single_slash64() {
        let addrs = vec![addr("fe80::1", 64), addr("2001:db8:1:2::abcd", 64)];
        let prefix = network_prefix(IFACE, &addrs).unwrap();
        assert_eq!(
            prefix.with_suffix(HostSuffix::ZERO),
            "2001:db8:1:2::".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn test_managed_addresses_share_the_prefix() {
        let addrs = vec![
            addr("2001:db8:1:2::abcd", 64),
            addr("2001:db8:1:2:1111:2222:3333:4444", 64),
        ];
        assert!(network_prefix(IFACE, &addrs).is_ok());
    }

    #[test]
    fn test_prefix_rejects_other_mask_lengths() {
        let addrs = vec![addr("2001:db8::1", 56)];
        match network_prefix(IFACE, &addrs) {
            Err(PoolError::PrefixShape { prefix_len, .. }) => assert_eq!(prefix_len, 56),
            other => panic!("expected PrefixShape, got {other:?}"),
        }
    }

    #[test]
    fn test_prefix_requires_exactly_one_network() {
        let none = vec![addr("fe80::1", 64)];
        assert!(matches!(
            network_prefix(IFACE, &none),
            Err(PoolError::NoPrefix(_))
        ));

        let multihomed = vec![addr("2001:db8:1::1", 64), addr("2001:db8:2::1", 64)];
        assert!(matches!(
            network_prefix(IFACE, &multihomed),
            Err(PoolError::MultiplePrefixes { count: 2, .. })
        ));
    }

    #[test]
    fn test_pick_index_wraps() {
        assert_eq!(pick_index(0, 3), 0);
        assert_eq!(pick_index(7, 3), 1);
        assert_eq!(pick_index(u64::MAX, 1), 0);
    }
}
