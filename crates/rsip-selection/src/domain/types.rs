//! Core domain types: interfaces, observed addresses, prefixes, epochs.

use std::fmt;
use std::net::Ipv6Addr;
use std::time::Duration;

/// Kernel index of a network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceIndex(u32);

impl InterfaceIndex {
    /// Wrap a raw kernel interface index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw kernel index.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InterfaceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if#{}", self.0)
    }
}

/// Kernel address flags (`IFA_F_*`) as reported for an interface address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct AddressFlags(u32);

impl AddressFlags {
    pub const TEMPORARY: u32 = 0x01;
    pub const NODAD: u32 = 0x02;
    pub const OPTIMISTIC: u32 = 0x04;
    pub const DADFAILED: u32 = 0x08;
    pub const HOMEADDRESS: u32 = 0x10;
    pub const DEPRECATED: u32 = 0x20;
    pub const TENTATIVE: u32 = 0x40;
    pub const PERMANENT: u32 = 0x80;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    /// The address cannot be bound yet (DAD in progress) or never will be.
    pub const fn is_unusable(self) -> bool {
        self.contains(Self::TENTATIVE) || self.contains(Self::DADFAILED)
    }
}

/// One IPv6 address configured on an interface, as observed from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub address: Ipv6Addr,
    pub prefix_len: u8,
    pub flags: AddressFlags,
}

impl InterfaceAddress {
    pub fn new(address: Ipv6Addr, prefix_len: u8) -> Self {
        Self {
            address,
            prefix_len,
            flags: AddressFlags::default(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: AddressFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// Upper 64 bits of an IPv6 address: the link's network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkPrefix([u8; 8]);

impl NetworkPrefix {
    /// Length of every prefix this crate manages.
    pub const LEN: u8 = 64;

    /// Take the network half of `address`.
    pub fn of(address: Ipv6Addr) -> Self {
        let octets = address.octets();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&octets[..8]);
        Self(prefix)
    }

    /// Compose `prefix ‖ suffix`.
    pub fn with_suffix(self, suffix: HostSuffix) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets[..8].copy_from_slice(&self.0);
        octets[8..].copy_from_slice(&suffix.0);
        Ipv6Addr::from(octets)
    }
}

impl fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.with_suffix(HostSuffix::ZERO), Self::LEN)
    }
}

/// Lower 64 bits of a managed address, shared by the whole pool in one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostSuffix([u8; 8]);

impl HostSuffix {
    pub const ZERO: Self = Self([0u8; 8]);

    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

/// A rotation epoch: monotonically numbered, carrying the current suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch {
    pub number: u64,
    pub suffix: HostSuffix,
}

impl Epoch {
    /// The first epoch of a pool.
    pub fn initial(suffix: HostSuffix) -> Self {
        Self { number: 0, suffix }
    }

    /// The epoch following this one.
    pub fn next(self, suffix: HostSuffix) -> Self {
        Self {
            number: self.number + 1,
            suffix,
        }
    }
}

/// Kernel lifetimes attached to an installed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
    /// Time until the kernel removes the address.
    pub valid: Duration,
    /// Time until the address is deprecated for new flows.
    pub preferred: Duration,
}

/// Everything needed to install, refresh or delete one managed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpec {
    pub interface: InterfaceIndex,
    pub address: Ipv6Addr,
    pub prefix_len: u8,
    pub lifetimes: Lifetimes,
    /// Install without duplicate address detection.
    pub no_dad: bool,
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} on {} valid_lft {}s preferred_lft {}s",
            self.address,
            self.prefix_len,
            self.interface,
            self.lifetimes.valid.as_secs(),
            self.lifetimes.preferred.as_secs()
        )
    }
}

/// One route returned by a kernel route lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Output interface, absent for routes the kernel cannot send on.
    pub interface: Option<InterfaceIndex>,
}

impl RouteEntry {
    pub fn via(interface: InterfaceIndex) -> Self {
        Self {
            interface: Some(interface),
        }
    }
}

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub epoch: Option<Epoch>,
    pub tracked: usize,
    pub installs: u64,
    pub removals: u64,
    pub refreshes: u64,
    pub poisoned: bool,
    pub closed: bool,
}
