//! IPv4 networks and hardware addresses.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::AllocError;

/// An IPv4 network in CIDR notation (`10.82.0.0/16`).
///
/// The stored address is always the network address: host bits given on
/// input are masked off.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Net {
    network: u32,
    prefix_len: u8,
}

impl Ipv4Net {
    /// Create a network from any address inside it and a prefix length.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, AllocError> {
        if prefix_len > 32 {
            return Err(AllocError::InvalidNetwork(format!(
                "{}/{}: prefix length out of range",
                addr, prefix_len
            )));
        }
        Ok(Self::from_octets(addr.octets(), prefix_len))
    }

    /// Const constructor; prefix lengths above 32 are clamped to 32.
    pub const fn from_octets(octets: [u8; 4], prefix_len: u8) -> Self {
        let prefix_len = if prefix_len > 32 { 32 } else { prefix_len };
        Self {
            network: u32::from_be_bytes(octets) & Self::mask_for(prefix_len),
            prefix_len,
        }
    }

    const fn mask_for(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len as u32)
        }
    }

    /// The network address.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    /// The prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The last address of the network.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network | !Self::mask_for(self.prefix_len))
    }

    /// Total number of addresses, including network and broadcast.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    /// Number of usable host addresses.
    ///
    /// /31 and /32 networks have no reserved network/broadcast address.
    pub fn host_count(&self) -> u64 {
        if self.prefix_len >= 31 {
            self.size()
        } else {
            self.size() - 2
        }
    }

    /// The address `offset` positions after the network address, if it is
    /// still a usable host address.
    pub fn host_at_offset(&self, offset: u64) -> Option<Ipv4Addr> {
        let (first, last) = self.host_bounds();
        let candidate = u64::from(self.network).checked_add(offset)?;
        if candidate < u64::from(first) || candidate > u64::from(last) {
            return None;
        }
        Some(Ipv4Addr::from(candidate as u32))
    }

    /// The last usable host address.
    pub fn last_host(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.host_bounds().1)
    }

    /// Iterate usable host addresses in ascending order.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let (first, last) = self.host_bounds();
        (first..=last).map(Ipv4Addr::from)
    }

    fn host_bounds(&self) -> (u32, u32) {
        let broadcast = u32::from(self.broadcast());
        if self.prefix_len >= 31 {
            (self.network, broadcast)
        } else {
            (self.network + 1, broadcast - 1)
        }
    }

    /// Whether `addr` belongs to this network.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask_for(self.prefix_len) == self.network
    }
}

impl FromStr for Ipv4Net {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AllocError::InvalidNetwork(s.to_string());
        let (addr, len) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.trim().parse().map_err(|_| invalid())?;
        let len: u8 = len.trim().parse().map_err(|_| invalid())?;
        Self::new(addr, len)
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len)
    }
}

impl fmt::Debug for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Net({})", self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Net {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A 48-bit hardware (MAC) address.
///
/// Displayed as six lowercase, zero-padded hex groups separated by colons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Create a MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}
