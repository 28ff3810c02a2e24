// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Address {address} has host bits set for prefix /{prefix}")]
    HostBitsSet { address: Ipv4Addr, prefix: u8 },

    #[error("Address block {block} cannot hold the requested subnets ({requested})")]
    InsufficientAddressSpace { block: String, requested: String },
}

/// IPv4 address block in CIDR notation
///
/// Invariants:
/// - Valid IPv4 address
/// - Prefix length 0-32
/// - No host bits set (the address is the network address)
///
/// # Examples
///
/// ```rust
/// use layered_stack::domain::CidrBlock;
///
/// let vpc = CidrBlock::new("10.0.0.0/16").unwrap();
/// let subnet = CidrBlock::new("10.0.3.0/24").unwrap();
/// assert!(vpc.overlaps(&subnet));
/// assert_eq!(vpc.size(), 65536);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    address: Ipv4Addr,
    prefix_length: u8,
}

impl CidrBlock {
    /// Create a block from CIDR notation (e.g. `"10.0.0.0/16"`)
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(address, prefix_length)
    }

    /// Create from separate address and prefix
    pub fn from_parts(address: Ipv4Addr, prefix_length: u8) -> Result<Self, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let bits = u32::from(address);
        if bits & !Self::mask(prefix_length) != 0 {
            return Err(NetworkError::HostBitsSet {
                address,
                prefix: prefix_length,
            });
        }

        Ok(Self {
            address,
            prefix_length,
        })
    }

    /// The whole IPv4 internet (`0.0.0.0/0`)
    pub fn anywhere() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            prefix_length: 0,
        }
    }

    fn mask(prefix_length: u8) -> u32 {
        if prefix_length == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_length))
        }
    }

    /// Network address
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_length))
    }

    fn first(&self) -> u64 {
        u64::from(u32::from(self.address))
    }

    fn last(&self) -> u64 {
        self.first() + self.size() - 1
    }

    /// Address `offset` positions past the network address, if inside the block
    pub fn host(&self, offset: u64) -> Option<Ipv4Addr> {
        if offset >= self.size() {
            return None;
        }
        u32::try_from(self.first() + offset).ok().map(Ipv4Addr::from)
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(&self, other: &CidrBlock) -> bool {
        self.first() <= other.first() && other.last() <= self.last()
    }

    /// Whether the two blocks share at least one address
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// Carve consecutive, aligned subnets out of this block
    ///
    /// Subnets are allocated in the order given; each one starts at the
    /// first address after the previous subnet that is aligned to its own
    /// size.
    pub fn carve(&self, masks: &[u8]) -> Result<Vec<CidrBlock>, NetworkError> {
        let insufficient = || NetworkError::InsufficientAddressSpace {
            block: self.to_string(),
            requested: masks
                .iter()
                .map(|m| format!("/{m}"))
                .collect::<Vec<_>>()
                .join(","),
        };

        let mut cursor = self.first();
        let mut subnets = Vec::with_capacity(masks.len());

        for &mask in masks {
            if mask > 32 {
                return Err(NetworkError::InvalidPrefixLength(mask));
            }
            if mask < self.prefix_length {
                return Err(insufficient());
            }

            let size = 1u64 << (32 - u32::from(mask));
            let start = cursor.div_ceil(size) * size;
            let end = start + size - 1;
            if end > self.last() {
                return Err(insufficient());
            }

            let address = Ipv4Addr::from(u32::try_from(start).map_err(|_| insufficient())?);
            subnets.push(Self::from_parts(address, mask)?);
            cursor = end + 1;
        }

        Ok(subnets)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_length)
    }
}

impl FromStr for CidrBlock {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

/// Transport protocol of an ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Well-known ports used by the layered topology
pub mod ports {
    pub const SSH: u16 = 22;
    pub const HTTP: u16 = 80;
    pub const HTTPS: u16 = 443;
    pub const MYSQL: u16 = 3306;
    pub const TOMCAT: u16 = 8080;
}
