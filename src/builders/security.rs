// Copyright (c) 2025 - Cowboy AI, Inc.
//! Security Policy Matrix
//!
//! One security group per tier, each with an append-only list of ingress
//! rules. A rule admits traffic from a literal address block or from every
//! member of a peer group; peer references stay correct as membership
//! changes.
//!
//! The standard [`AllowList`] is the complete set of rules a layered
//! environment needs. It is applied by the caller; [`SecurityPolicyMatrix::audit`]
//! reports any rule outside of it and any entry the matrix is missing.
//!
//! # Invariants
//!
//! - Rules are never removed (revocation happens at teardown only)
//! - One group per tier
//! - Peer references point at groups of the same matrix

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::builders::network::NetworkTopology;
use crate::config::EnvironmentConfig;
use crate::domain::{ports, CidrBlock, LogicalId, Protocol, SecurityTier};
use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::graph::{Declaration, IngressRuleSpec, ResourceGraph, RuleSource, SecurityGroupSpec};

/// Reference to a group created by the matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityGroupHandle {
    pub id: LogicalId,
    pub tier: SecurityTier,
}

impl SecurityGroupHandle {
    /// Rule source admitting every member of this group
    pub fn as_source(&self) -> RuleSource {
        RuleSource::Group(self.id.clone())
    }
}

/// One ingress rule of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// Logical identifier the rule is declared under
    pub id: LogicalId,
    pub source: RuleSource,
    pub protocol: Protocol,
    pub port: u16,
    pub label: String,
}

#[derive(Debug, Clone)]
struct GroupEntry {
    handle: SecurityGroupHandle,
    description: String,
    rules: Vec<IngressRule>,
}

/// Where allowed traffic may originate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowSource {
    Internet,
    Tier(SecurityTier),
}

impl fmt::Display for AllowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowSource::Internet => f.write_str("internet"),
            AllowSource::Tier(tier) => write!(f, "{tier}"),
        }
    }
}

/// One permitted (target, source, port) combination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowEntry {
    pub target: SecurityTier,
    pub source: AllowSource,
    pub port: u16,
    pub label: String,
}

impl fmt::Display for AllowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}←{}:{}", self.target, self.source, self.port)
    }
}

/// Complete set of permitted ingress combinations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    entries: Vec<AllowEntry>,
}

impl AllowList {
    /// Allow-list of the layered topology
    ///
    /// ```text
    /// bastion  ← internet:22
    /// web      ← internet:80, internet:443, bastion:22
    /// app      ← web:<app_port>, bastion:22
    /// database ← app:<db_port>, bastion:<db_port>
    /// ```
    pub fn standard(app_port: u16, db_port: u16) -> Self {
        use AllowSource::{Internet, Tier};
        use SecurityTier::{App, Bastion, Database, Web};

        let entry = |target, source, port, label: &str| AllowEntry {
            target,
            source,
            port,
            label: label.to_string(),
        };

        Self {
            entries: vec![
                entry(Bastion, Internet, ports::SSH, "SSH access"),
                entry(Web, Internet, ports::HTTP, "HTTP access"),
                entry(Web, Internet, ports::HTTPS, "HTTPS access"),
                entry(Web, Tier(Bastion), ports::SSH, "SSH from bastion"),
                entry(App, Tier(Web), app_port, "Service port from web"),
                entry(App, Tier(Bastion), ports::SSH, "SSH from bastion"),
                entry(Database, Tier(App), db_port, "Database access from app"),
                entry(Database, Tier(Bastion), db_port, "Database access from bastion"),
            ],
        }
    }

    pub fn entries(&self) -> &[AllowEntry] {
        &self.entries
    }

    /// Entries protecting one tier
    pub fn for_target(&self, target: SecurityTier) -> impl Iterator<Item = &AllowEntry> {
        self.entries.iter().filter(move |e| e.target == target)
    }
}

/// Difference between a matrix and an allow-list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum PolicyViolation {
    /// Rule present that no allow-list entry permits
    Unexpected { group: LogicalId, rule: LogicalId },
    /// Allow-list entry the matrix does not implement
    Missing { entry: AllowEntry },
}

/// Per-tier security groups and their ingress rules
#[derive(Debug, Clone)]
pub struct SecurityPolicyMatrix {
    prefix: String,
    network: LogicalId,
    groups: Vec<GroupEntry>,
}

impl SecurityPolicyMatrix {
    pub fn new(config: &EnvironmentConfig, network: &NetworkTopology) -> Self {
        Self {
            prefix: config.prefix.clone(),
            network: network.network.clone(),
            groups: Vec::new(),
        }
    }

    /// Create the security group of a tier (`<env>-<Tier>-SecurityGroup`)
    pub fn create_group(
        &mut self,
        tier: SecurityTier,
        description: &str,
    ) -> ProvisioningResult<SecurityGroupHandle> {
        let id = LogicalId::new(format!("{}-{}-SecurityGroup", self.prefix, tier.segment()))?;
        if self.groups.iter().any(|g| g.handle.tier == tier) {
            return Err(ProvisioningError::DuplicateDeclaration(id));
        }

        let handle = SecurityGroupHandle { id, tier };
        self.groups.push(GroupEntry {
            handle: handle.clone(),
            description: description.to_string(),
            rules: Vec::new(),
        });
        Ok(handle)
    }

    /// Append an ingress rule to a group
    pub fn allow(
        &mut self,
        group: &SecurityGroupHandle,
        source: RuleSource,
        protocol: Protocol,
        port: u16,
        label: &str,
    ) -> ProvisioningResult<LogicalId> {
        if let RuleSource::Group(peer) = &source {
            if self.find(peer).is_none() {
                return Err(ProvisioningError::UnknownReference {
                    resource: group.id.clone(),
                    missing: peer.clone(),
                });
            }
        }

        let entry = self
            .groups
            .iter_mut()
            .find(|g| g.handle.id == group.id)
            .ok_or_else(|| {
                ProvisioningError::InvalidConfiguration(format!(
                    "{} is not a group of this matrix",
                    group.id
                ))
            })?;

        let id = entry
            .handle
            .id
            .child(&format!("Ingress-{}", entry.rules.len() + 1))?;
        tracing::debug!(group = %group.id, source = %source, port, label, "allow rule added");
        entry.rules.push(IngressRule {
            id: id.clone(),
            source,
            protocol,
            port,
            label: label.to_string(),
        });
        Ok(id)
    }

    /// Apply every allow-list entry protecting `target`
    pub fn apply_allow_list(
        &mut self,
        list: &AllowList,
        target: SecurityTier,
    ) -> ProvisioningResult<Vec<LogicalId>> {
        let group = self.group(target).ok_or_else(|| {
            ProvisioningError::InvalidConfiguration(format!("no {target} security group"))
        })?;

        let mut added = Vec::new();
        for entry in list.for_target(target) {
            let source = self.resolve_source(entry.source)?;
            added.push(self.allow(&group, source, Protocol::Tcp, entry.port, &entry.label)?);
        }
        Ok(added)
    }

    fn resolve_source(&self, source: AllowSource) -> ProvisioningResult<RuleSource> {
        match source {
            AllowSource::Internet => Ok(RuleSource::internet()),
            AllowSource::Tier(tier) => self
                .group(tier)
                .map(|g| g.as_source())
                .ok_or_else(|| {
                    ProvisioningError::InvalidConfiguration(format!("no {tier} security group"))
                }),
        }
    }

    fn find(&self, id: &LogicalId) -> Option<&GroupEntry> {
        self.groups.iter().find(|g| &g.handle.id == id)
    }

    /// Group protecting a tier
    pub fn group(&self, tier: SecurityTier) -> Option<SecurityGroupHandle> {
        self.groups
            .iter()
            .find(|g| g.handle.tier == tier)
            .map(|g| g.handle.clone())
    }

    pub fn groups(&self) -> Vec<SecurityGroupHandle> {
        self.groups.iter().map(|g| g.handle.clone()).collect()
    }

    /// Rules of a group in the order they were added
    pub fn rules(&self, group: &LogicalId) -> &[IngressRule] {
        self.find(group).map(|g| g.rules.as_slice()).unwrap_or(&[])
    }

    /// Logical ids of a group's rules
    pub fn rule_ids(&self, group: &LogicalId) -> Vec<LogicalId> {
        self.rules(group).iter().map(|r| r.id.clone()).collect()
    }

    /// Whether `group` admits traffic from `source` on `port`
    ///
    /// A peer-group source is admitted only by a rule naming that exact
    /// group. A literal block is admitted by any rule whose block contains it.
    pub fn admits(&self, group: &LogicalId, source: &RuleSource, port: u16) -> bool {
        self.rules(group).iter().any(|rule| {
            rule.port == port
                && match (&rule.source, source) {
                    (RuleSource::Group(allowed), RuleSource::Group(peer)) => allowed == peer,
                    (RuleSource::Cidr(allowed), RuleSource::Cidr(block)) => {
                        allowed.contains(block)
                    }
                    _ => false,
                }
        })
    }

    /// Whether any node at `address` would be admitted on `port`
    pub fn admits_address(&self, group: &LogicalId, address: CidrBlock, port: u16) -> bool {
        self.admits(group, &RuleSource::Cidr(address), port)
    }

    fn entry_matches(&self, entry: &AllowEntry, group: &GroupEntry, rule: &IngressRule) -> bool {
        if entry.target != group.handle.tier || entry.port != rule.port {
            return false;
        }
        match (entry.source, &rule.source) {
            (AllowSource::Internet, RuleSource::Cidr(block)) => *block == CidrBlock::anywhere(),
            (AllowSource::Tier(tier), RuleSource::Group(peer)) => {
                self.group(tier).map(|g| &g.id == peer).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Compare the matrix with an allow-list
    ///
    /// Entries for tiers without a group are not reported as missing.
    pub fn audit(&self, list: &AllowList) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();

        for group in &self.groups {
            for rule in &group.rules {
                if !list
                    .entries()
                    .iter()
                    .any(|entry| self.entry_matches(entry, group, rule))
                {
                    violations.push(PolicyViolation::Unexpected {
                        group: group.handle.id.clone(),
                        rule: rule.id.clone(),
                    });
                }
            }
        }

        for entry in list.entries() {
            let Some(group) = self.groups.iter().find(|g| g.handle.tier == entry.target) else {
                continue;
            };
            if !group
                .rules
                .iter()
                .any(|rule| self.entry_matches(entry, group, rule))
            {
                violations.push(PolicyViolation::Missing {
                    entry: entry.clone(),
                });
            }
        }

        violations
    }

    /// Declare every group and rule into the graph
    pub fn declare_into(&self, graph: &mut ResourceGraph) -> ProvisioningResult<()> {
        for group in &self.groups {
            graph.declare(
                group.handle.id.clone(),
                Declaration::SecurityGroup(SecurityGroupSpec {
                    network: self.network.clone(),
                    tier: group.handle.tier,
                    name: format!("{}SecurityGroup", group.handle.tier.segment()),
                    description: group.description.clone(),
                    allow_all_outbound: true,
                }),
                &[],
            )?;
        }

        for group in &self.groups {
            for rule in &group.rules {
                graph.declare(
                    rule.id.clone(),
                    Declaration::IngressRule(IngressRuleSpec {
                        group: group.handle.id.clone(),
                        source: rule.source.clone(),
                        protocol: rule.protocol,
                        port: rule.port,
                        label: rule.label.clone(),
                    }),
                    &[],
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::network::NetworkTopologyBuilder;

    fn matrix() -> SecurityPolicyMatrix {
        let config = EnvironmentConfig::new("dev");
        let mut graph = ResourceGraph::new("dev-VpcStack");
        let topology = NetworkTopologyBuilder::new(&config).build(&mut graph).unwrap();
        let mut matrix = SecurityPolicyMatrix::new(&config, &topology);
        for tier in SecurityTier::ALL {
            matrix.create_group(tier, &format!("{tier} tier")).unwrap();
        }
        matrix
    }

    fn standard() -> SecurityPolicyMatrix {
        let mut matrix = matrix();
        let list = AllowList::standard(ports::TOMCAT, ports::MYSQL);
        for tier in SecurityTier::ALL {
            matrix.apply_allow_list(&list, tier).unwrap();
        }
        matrix
    }

    #[test]
    fn test_group_naming_and_uniqueness() {
        let mut matrix = matrix();
        let bastion = matrix.group(SecurityTier::Bastion).unwrap();
        assert_eq!(bastion.id.as_str(), "dev-Bastion-SecurityGroup");
        assert!(matches!(
            matrix.create_group(SecurityTier::Bastion, "again"),
            Err(ProvisioningError::DuplicateDeclaration(_))
        ));
    }

    #[test]
    fn test_standard_matrix_has_no_violations() {
        let matrix = standard();
        let list = AllowList::standard(ports::TOMCAT, ports::MYSQL);
        assert!(matrix.audit(&list).is_empty());

        let total: usize = matrix.groups().iter().map(|g| matrix.rules(&g.id).len()).sum();
        assert_eq!(total, list.entries().len());
    }

    #[test]
    fn test_extra_rule_is_reported() {
        let mut matrix = standard();
        let db = matrix.group(SecurityTier::Database).unwrap();
        let web = matrix.group(SecurityTier::Web).unwrap();
        let rule = matrix
            .allow(&db, web.as_source(), Protocol::Tcp, ports::MYSQL, "shortcut")
            .unwrap();

        let violations = matrix.audit(&AllowList::standard(ports::TOMCAT, ports::MYSQL));
        assert_eq!(
            violations,
            vec![PolicyViolation::Unexpected {
                group: db.id,
                rule
            }]
        );
    }

    #[test]
    fn test_missing_rule_is_reported() {
        let mut matrix = matrix();
        let list = AllowList::standard(ports::TOMCAT, ports::MYSQL);
        matrix.apply_allow_list(&list, SecurityTier::Bastion).unwrap();

        let missing = matrix
            .audit(&list)
            .into_iter()
            .filter(|v| matches!(v, PolicyViolation::Missing { .. }))
            .count();
        assert_eq!(missing, list.entries().len() - 1);
    }

    #[test]
    fn test_database_admits_only_bastion_and_app() {
        let matrix = standard();
        let db = matrix.group(SecurityTier::Database).unwrap();

        for tier in [SecurityTier::Bastion, SecurityTier::App] {
            let peer = matrix.group(tier).unwrap();
            assert!(matrix.admits(&db.id, &peer.as_source(), ports::MYSQL));
        }
        let web = matrix.group(SecurityTier::Web).unwrap();
        assert!(!matrix.admits(&db.id, &web.as_source(), ports::MYSQL));
        assert!(!matrix.admits_address(&db.id, CidrBlock::anywhere(), ports::MYSQL));
    }

    #[test]
    fn test_internet_reaches_bastion_over_ssh_only() {
        let matrix = standard();
        let bastion = matrix.group(SecurityTier::Bastion).unwrap();
        let host = CidrBlock::new("203.0.113.7/32").unwrap();

        assert!(matrix.admits_address(&bastion.id, host, ports::SSH));
        assert!(!matrix.admits_address(&bastion.id, host, ports::HTTP));
    }

    #[test]
    fn test_unknown_peer_rejected() {
        let mut matrix = matrix();
        let web = matrix.group(SecurityTier::Web).unwrap();
        let stranger = RuleSource::Group(LogicalId::new("qa-Bastion-SecurityGroup").unwrap());
        assert!(matches!(
            matrix.allow(&web, stranger, Protocol::Tcp, ports::SSH, "SSH"),
            Err(ProvisioningError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_declare_into_graph() {
        let config = EnvironmentConfig::new("dev");
        let mut graph = ResourceGraph::new("dev-VpcStack");
        let topology = NetworkTopologyBuilder::new(&config).build(&mut graph).unwrap();
        let mut matrix = SecurityPolicyMatrix::new(&config, &topology);
        let bastion = matrix
            .create_group(SecurityTier::Bastion, "Bastion access")
            .unwrap();
        matrix
            .allow(&bastion, RuleSource::internet(), Protocol::Tcp, ports::SSH, "SSH access")
            .unwrap();

        matrix.declare_into(&mut graph).unwrap();
        let rule = LogicalId::new("dev-Bastion-SecurityGroup-Ingress-1").unwrap();
        assert!(graph.contains(&rule));
        assert!(graph.validate().is_ok());
    }
}
