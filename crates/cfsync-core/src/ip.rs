//! Address families and IP prefixes
//!
//! [`IpFamily`] ties an address family to its DNS record type and to the
//! most specific prefix length that an IP list item may carry.
//! [`IpPrefix`] is a CIDR range with a containment test.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// IP address family (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Both families, IPv4 first
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    /// The DNS record type holding addresses of this family
    pub fn record_type(self) -> &'static str {
        match self {
            IpFamily::V4 => "A",
            IpFamily::V6 => "AAAA",
        }
    }

    /// Prefix length used when a single detected address is stored in an IP list
    pub fn max_prefix_len(self) -> u8 {
        match self {
            IpFamily::V4 => 32,
            IpFamily::V6 => 64,
        }
    }

    /// Number of bits in an address of this family
    pub fn bits(self) -> u8 {
        match self {
            IpFamily::V4 => 32,
            IpFamily::V6 => 128,
        }
    }

    /// Family of an address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(self, ip: &IpAddr) -> bool {
        IpFamily::of(ip) == self
    }

    /// Check that a detected address can be published for this family
    ///
    /// Rejects addresses of the other family, unspecified, loopback and
    /// multicast addresses, and IPv4-mapped IPv6 addresses.
    pub fn check_detected(self, ip: IpAddr) -> Result<IpAddr> {
        if !self.matches(&ip) {
            return Err(Error::ip_detection(format!(
                "{} is not an {} address",
                ip, self
            )));
        }
        if ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() {
            return Err(Error::ip_detection(format!(
                "{} is not usable as a public address",
                ip
            )));
        }
        if let IpAddr::V6(v6) = ip
            && v6.to_ipv4_mapped().is_some()
        {
            return Err(Error::ip_detection(format!(
                "{} is an IPv4-mapped address",
                ip
            )));
        }
        Ok(ip)
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "IPv4"),
            IpFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// A CIDR prefix, always stored with its host bits cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    addr: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Build a prefix, masking off host bits
    pub fn new(addr: IpAddr, len: u8) -> Result<Self> {
        let family = IpFamily::of(&addr);
        if len > family.bits() {
            return Err(Error::invalid_input(format!(
                "prefix length /{} is too long for {}",
                len, family
            )));
        }

        Ok(Self {
            addr: mask(addr, len),
            len,
        })
    }

    /// The most specific prefix an IP list may hold for `ip`
    /// (`/32` for IPv4, `/64` for IPv6)
    pub fn from_detected(ip: IpAddr) -> Self {
        let len = IpFamily::of(&ip).max_prefix_len();
        Self {
            addr: mask(ip, len),
            len,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    pub fn family(&self) -> IpFamily {
        IpFamily::of(&self.addr)
    }

    /// Whether `ip` falls inside this prefix; addresses of the other family
    /// are never contained
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.family().matches(ip) && mask(*ip, self.len) == self.addr
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for IpPrefix {
    type Err = Error;

    /// Parses `a.b.c.d/N`, `x::y/N`, or a bare address (taken as a host prefix)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::invalid_input(format!("invalid IP prefix: {:?}", s));

        match s.split_once('/') {
            Some((addr, len)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
                let len: u8 = len.parse().map_err(|_| invalid())?;
                Self::new(addr, len)
            }
            None => {
                let addr: IpAddr = s.parse().map_err(|_| invalid())?;
                let len = IpFamily::of(&addr).bits();
                Self::new(addr, len)
            }
        }
    }
}

fn mask(ip: IpAddr, len: u8) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let mask = if len == 0 { 0 } else { !0u32 << (32 - u32::from(len)) };
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let mask = if len == 0 { 0 } else { !0u128 << (128 - u32::from(len)) };
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    }
}
