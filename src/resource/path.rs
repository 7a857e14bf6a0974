use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShieldError};

static ARM_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^/subscriptions/([^/]+)/resourceGroups/([^/]+)/providers/([^/]+)/([^/]+)/([^/]+)/?$",
    )
    .unwrap()
});

/// Parsed management-API resource path:
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePath {
    pub subscription_id: String,
    pub resource_group: String,
    pub namespace: String,
    pub type_name: String,
    pub name: String,
}

impl ResourcePath {
    pub fn parse(resource_id: &str) -> Result<Self> {
        let caps = ARM_ID_RE
            .captures(resource_id.trim())
            .ok_or_else(|| ShieldError::InvalidResourceId(resource_id.into()))?;

        Ok(Self {
            subscription_id: caps[1].to_string(),
            resource_group: caps[2].to_string(),
            namespace: caps[3].to_string(),
            type_name: caps[4].to_string(),
            name: caps[5].to_string(),
        })
    }

    /// `Microsoft.Storage/storageAccounts` style provider type.
    pub fn provider_type(&self) -> String {
        format!("{}/{}", self.namespace, self.type_name)
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription_id, self.resource_group, self.namespace, self.type_name, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_storage_account_id() {
        let p = ResourcePath::parse(
            "/subscriptions/0000-1111/resourceGroups/prod-rg/providers/Microsoft.Storage/storageAccounts/logs01",
        )
        .unwrap();
        assert_eq!(p.subscription_id, "0000-1111");
        assert_eq!(p.resource_group, "prod-rg");
        assert_eq!(p.provider_type(), "Microsoft.Storage/storageAccounts");
        assert_eq!(p.name, "logs01");
    }

    #[test]
    fn case_insensitive_segments() {
        let p = ResourcePath::parse(
            "/SUBSCRIPTIONS/s/RESOURCEGROUPS/rg/PROVIDERS/Microsoft.Compute/virtualMachines/vm1/",
        )
        .unwrap();
        assert_eq!(p.name, "vm1");
    }

    #[test]
    fn display_round_trips() {
        let id = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/db";
        assert_eq!(ResourcePath::parse(id).unwrap().to_string(), id);
    }

    #[test]
    fn rejects_nested_or_short_ids() {
        assert!(ResourcePath::parse("acct1").is_err());
        assert!(ResourcePath::parse("/subscriptions/s/resourceGroups/rg").is_err());
        assert!(ResourcePath::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/a/databases/b"
        )
        .is_err());
    }
}
