// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subnet tiers and security tiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named isolation class of subnet governing internet reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetTier {
    /// Routes to and from the internet
    Public,
    /// Outbound-only internet access through the egress gateway
    PrivateWithEgress,
    /// No internet route in either direction
    PrivateIsolated,
}

impl SubnetTier {
    /// All tiers in allocation order
    pub const ALL: [SubnetTier; 3] = [
        SubnetTier::Public,
        SubnetTier::PrivateWithEgress,
        SubnetTier::PrivateIsolated,
    ];

    /// Subnet name used in the network layout
    pub fn subnet_name(&self) -> &'static str {
        match self {
            SubnetTier::Public => "public",
            SubnetTier::PrivateWithEgress => "private-w-egress",
            SubnetTier::PrivateIsolated => "private-isolated",
        }
    }

    /// Whether instances in this tier can be reached from the internet
    pub fn is_internet_reachable(&self) -> bool {
        matches!(self, SubnetTier::Public)
    }
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subnet_name())
    }
}

/// Role-scoped tier a security group protects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityTier {
    Bastion,
    Web,
    App,
    Database,
}

impl SecurityTier {
    pub const ALL: [SecurityTier; 4] = [
        SecurityTier::Bastion,
        SecurityTier::Web,
        SecurityTier::App,
        SecurityTier::Database,
    ];

    /// Name segment used in logical identifiers (`dev-<Segment>-SecurityGroup`)
    pub fn segment(&self) -> &'static str {
        match self {
            SecurityTier::Bastion => "Bastion",
            SecurityTier::Web => "Web",
            SecurityTier::App => "App",
            SecurityTier::Database => "Database",
        }
    }
}

impl fmt::Display for SecurityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}
