use crate::resource::ResourceType::StorageAccount;
use crate::rules::{PolicyRule, RuleCategory, Severity};

use super::{metadata, not_disabled};

/// Key source value that means a customer-managed key in Key Vault.
const CUSTOMER_KEY_SOURCE: &str = "Microsoft.Keyvault";

/// TLS versions still acceptable as a storage account minimum.
const ACCEPTED_TLS: &[&str] = &["TLS1_2", "TLS1_3"];

pub(super) fn rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(
            metadata(
                "STG-001",
                "Public network access",
                Severity::High,
                RuleCategory::Network,
                StorageAccount,
                "Storage account allows public network access",
                "Disable public network access and use private endpoints",
            ),
            |d| not_disabled(d, "publicNetworkAccess"),
        )
        .reads(&["publicNetworkAccess"]),
        PolicyRule::new(
            metadata(
                "STG-002",
                "Provider-managed key",
                Severity::Medium,
                RuleCategory::Encryption,
                StorageAccount,
                "Storage account is encrypted with a provider-managed key",
                "Use a customer-managed key from Key Vault for encryption at rest",
            ),
            |d| {
                !d.str("encryptionKeySource")
                    .is_some_and(|s| s.eq_ignore_ascii_case(CUSTOMER_KEY_SOURCE))
            },
        )
        .reads(&["encryptionKeySource"]),
        // Platform default is HTTPS-only.
        PolicyRule::new(
            metadata(
                "STG-003",
                "HTTP traffic allowed",
                Severity::High,
                RuleCategory::Network,
                StorageAccount,
                "Storage account accepts unencrypted HTTP traffic",
                "Enable secure transfer (HTTPS only)",
            ),
            |d| d.flag("supportsHttpsTrafficOnly") != Some(true),
        )
        .reads(&["supportsHttpsTrafficOnly"])
        .assume_compliant_when_missing(),
        // Platform default is TLS 1.2.
        PolicyRule::new(
            metadata(
                "STG-004",
                "Weak minimum TLS",
                Severity::Medium,
                RuleCategory::Encryption,
                StorageAccount,
                "Storage account accepts TLS versions below 1.2",
                "Set the minimum TLS version to TLS1_2",
            ),
            |d| {
                !d.str("minimumTlsVersion").is_some_and(|v| {
                    ACCEPTED_TLS.iter().any(|ok| ok.eq_ignore_ascii_case(v))
                })
            },
        )
        .reads(&["minimumTlsVersion"])
        .assume_compliant_when_missing(),
        PolicyRule::new(
            metadata(
                "STG-005",
                "Anonymous blob access",
                Severity::Medium,
                RuleCategory::Access,
                StorageAccount,
                "Storage account permits anonymous public read access to blobs",
                "Disallow blob public access on the account",
            ),
            |d| d.flag("allowBlobPublicAccess") != Some(false),
        )
        .reads(&["allowBlobPublicAccess"])
        .assume_compliant_when_missing(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceDescriptor, ResourceType};
    use crate::rules::{Finding, PolicyRegistry};
    use serde_json::json;

    fn scan(raw: serde_json::Value) -> Vec<Finding> {
        let d = ResourceDescriptor::normalize(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/st",
            ResourceType::StorageAccount,
            &raw,
        )
        .unwrap();
        PolicyRegistry::with_builtin_rules().unwrap().evaluate(&d)
    }

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.rule_id.as_str()).collect()
    }

    #[test]
    fn public_and_provider_key_yield_two_findings_in_order() {
        let findings = scan(json!({
            "publicNetworkAccess": true,
            "encryptionKeySource": "Microsoft",
        }));
        assert_eq!(ids(&findings), vec!["STG-001", "STG-002"]);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[1].severity, Severity::Medium);
    }

    #[test]
    fn hardened_account_is_clean() {
        let findings = scan(json!({
            "publicNetworkAccess": "Disabled",
            "encryptionKeySource": "Microsoft.Keyvault",
            "supportsHttpsTrafficOnly": true,
            "minimumTlsVersion": "TLS1_2",
            "allowBlobPublicAccess": false,
        }));
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[test]
    fn missing_network_setting_fails_closed() {
        let findings = scan(json!({ "encryptionKeySource": "Microsoft.Keyvault" }));
        assert_eq!(ids(&findings), vec!["STG-001"]);
    }

    #[test]
    fn missing_encryption_setting_fails_closed() {
        let findings = scan(json!({ "publicNetworkAccess": "Disabled" }));
        assert_eq!(ids(&findings), vec!["STG-002"]);
    }

    #[test]
    fn unknown_access_value_fails_closed() {
        let findings = scan(json!({
            "publicNetworkAccess": "SecuredByPerimeter-ish",
            "encryptionKeySource": "Microsoft.Keyvault",
        }));
        assert_eq!(ids(&findings), vec!["STG-001"]);
    }

    #[test]
    fn weak_tls_and_http_flagged() {
        let findings = scan(json!({
            "publicNetworkAccess": false,
            "encryptionKeySource": "Microsoft.Keyvault",
            "supportsHttpsTrafficOnly": false,
            "minimumTlsVersion": "TLS1_0",
        }));
        assert_eq!(ids(&findings), vec!["STG-003", "STG-004"]);
    }
}
