use crate::resource::ResourceType::DocumentDatabaseAccount;
use crate::rules::{PolicyRule, RuleCategory, Severity};

use super::{metadata, not_disabled, not_enabled};

const OPEN_RANGES: &[&str] = &["0.0.0.0/0", "0.0.0.0"];

pub(super) fn rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(
            metadata(
                "DDB-001",
                "Public network access",
                Severity::High,
                RuleCategory::Network,
                DocumentDatabaseAccount,
                "Database account allows public network access",
                "Disable public network access and use private endpoints",
            ),
            |d| not_disabled(d, "publicNetworkAccess"),
        )
        .reads(&["publicNetworkAccess"]),
        PolicyRule::new(
            metadata(
                "DDB-002",
                "No customer-managed key",
                Severity::High,
                RuleCategory::Encryption,
                DocumentDatabaseAccount,
                "Customer-managed key is not used for encryption at rest",
                "Configure a customer-managed key in Key Vault for encryption at rest",
            ),
            |d| d.str("keyVaultKeyUri").map_or(true, |uri| uri.trim().is_empty()),
        )
        .reads(&["keyVaultKeyUri"]),
        PolicyRule::new(
            metadata(
                "DDB-003",
                "No IP firewall",
                Severity::Medium,
                RuleCategory::Network,
                DocumentDatabaseAccount,
                "No IP firewall rules configured",
                "Configure IP firewall rules to restrict access",
            ),
            |d| d.list("ipRules").map_or(true, |rules| rules.is_empty()),
        )
        .reads(&["ipRules"]),
        // Absence of rules is DDB-003's concern.
        PolicyRule::new(
            metadata(
                "DDB-004",
                "Open IP range",
                Severity::Medium,
                RuleCategory::Network,
                DocumentDatabaseAccount,
                "IP firewall allows access from any address",
                "Restrict IP ranges to only necessary addresses",
            ),
            |d| {
                d.list("ipRules").is_some_and(|rules| {
                    rules.iter().filter_map(|r| r.as_str()).any(|r| {
                        OPEN_RANGES
                            .iter()
                            .any(|open| r == *open || r.contains(&format!("\"{open}\"")))
                    })
                })
            },
        )
        .reads(&["ipRules"])
        .assume_compliant_when_missing(),
        PolicyRule::new(
            metadata(
                "DDB-005",
                "VNET filter disabled",
                Severity::Medium,
                RuleCategory::Network,
                DocumentDatabaseAccount,
                "VNET integration is not enabled",
                "Enable VNET integration for improved network security",
            ),
            |d| not_enabled(d, "isVirtualNetworkFilterEnabled"),
        )
        .reads(&["isVirtualNetworkFilterEnabled"]),
        PolicyRule::new(
            metadata(
                "DDB-006",
                "Key-based metadata writes",
                Severity::Medium,
                RuleCategory::Access,
                DocumentDatabaseAccount,
                "Account keys can modify database metadata",
                "Disable key-based metadata write access and manage resources through RBAC",
            ),
            |d| not_enabled(d, "disableKeyBasedMetadataWriteAccess"),
        )
        .reads(&["disableKeyBasedMetadataWriteAccess"]),
        PolicyRule::new(
            metadata(
                "DDB-007",
                "No automatic failover",
                Severity::Low,
                RuleCategory::Availability,
                DocumentDatabaseAccount,
                "Automatic failover is not enabled",
                "Enable automatic failover for improved availability",
            ),
            |d| not_enabled(d, "enableAutomaticFailover"),
        )
        .reads(&["enableAutomaticFailover"]),
        PolicyRule::new(
            metadata(
                "DDB-008",
                "Single-region writes",
                Severity::Low,
                RuleCategory::Availability,
                DocumentDatabaseAccount,
                "Multi-region writes are not enabled",
                "Enable multi-region writes for improved availability and performance",
            ),
            |d| not_enabled(d, "enableMultipleWriteLocations"),
        )
        .reads(&["enableMultipleWriteLocations"]),
    ]
}
