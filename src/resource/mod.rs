//! Normalized resource model.
//!
//! Every collaborator hands the engine raw JSON configuration. It is turned
//! into a `ResourceDescriptor` exactly once per scan, and rules only ever see
//! that typed snapshot.

pub mod path;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShieldError};
use crate::provider::FetchError;

pub use path::ResourcePath;

/// Kind of cloud resource. Decides which rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    VirtualMachine,
    StorageAccount,
    DocumentDatabaseAccount,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        Self::VirtualMachine,
        Self::StorageAccount,
        Self::DocumentDatabaseAccount,
    ];

    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(&['-', ' '][..], "_").as_str() {
            "virtual_machine" | "vm" => Some(Self::VirtualMachine),
            "storage_account" | "storage" => Some(Self::StorageAccount),
            "document_database_account" | "cosmos" | "cosmosdb" | "documentdb" => {
                Some(Self::DocumentDatabaseAccount)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VirtualMachine => write!(f, "virtual_machine"),
            Self::StorageAccount => write!(f, "storage_account"),
            Self::DocumentDatabaseAccount => write!(f, "document_database_account"),
        }
    }
}

/// A single normalized configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Interpret the value as an on/off switch. Accepts real booleans and the
    /// `"Enabled"`/`"Disabled"` strings management APIs tend to return.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) => match s.to_lowercase().as_str() {
                "enabled" | "true" | "on" | "yes" => Some(true),
                "disabled" | "false" | "off" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Point-in-time snapshot of a resource's configuration.
///
/// Fields are private: a descriptor is built once by [`ResourceDescriptor::normalize`]
/// or [`ResourceDescriptor::new`] and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    resource_id: String,
    resource_type: ResourceType,
    resource_name: String,
    properties: BTreeMap<String, PropertyValue>,
}

impl ResourceDescriptor {
    pub fn new(
        resource_id: impl Into<String>,
        resource_type: ResourceType,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Self {
        let resource_id = resource_id.into();
        let resource_name = default_name(&resource_id);
        Self {
            resource_id,
            resource_type,
            resource_name,
            properties,
        }
    }

    /// Build a descriptor from raw fetched configuration.
    ///
    /// Nested objects are flattened into dotted keys (`encryption.keySource`),
    /// `null` values are dropped so they read as absent, and objects inside
    /// lists are kept as their compact JSON text.
    pub fn normalize(
        resource_id: &str,
        resource_type: ResourceType,
        raw: &serde_json::Value,
    ) -> Result<Self> {
        let obj = raw.as_object().ok_or_else(|| ShieldError::Fetch {
            resource_id: resource_id.into(),
            source: FetchError::Malformed("configuration is not a JSON object".into()),
        })?;

        let mut properties = BTreeMap::new();
        for (key, value) in obj {
            flatten_into(&mut properties, key, value);
        }

        let resource_name = properties
            .get("name")
            .and_then(PropertyValue::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| default_name(resource_id));

        Ok(Self {
            resource_id: resource_id.into(),
            resource_type,
            resource_name,
            properties,
        })
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn has(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PropertyValue::as_flag)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropertyValue::as_number)
    }

    pub fn list(&self, key: &str) -> Option<&[PropertyValue]> {
        self.get(key).and_then(PropertyValue::as_list)
    }
}

fn default_name(resource_id: &str) -> String {
    resource_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(resource_id)
        .to_string()
}

fn flatten_into(out: &mut BTreeMap<String, PropertyValue>, key: &str, value: &serde_json::Value) {
    use serde_json::Value;

    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (child, v) in map {
                flatten_into(out, &format!("{key}.{child}"), v);
            }
        }
        other => {
            if let Some(v) = convert(other) {
                out.insert(key.to_string(), v);
            }
        }
    }
}

fn convert(value: &serde_json::Value) -> Option<PropertyValue> {
    use serde_json::Value;

    match value {
        Value::Null => None,
        Value::Bool(b) => Some(PropertyValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(PropertyValue::Number),
        Value::String(s) => Some(PropertyValue::String(s.clone())),
        Value::Array(items) => Some(PropertyValue::List(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(_) => Some(PropertyValue::String(item.to_string())),
                    other => convert(other),
                })
                .collect(),
        )),
        Value::Object(_) => Some(PropertyValue::String(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct1";

    #[test]
    fn flattens_nested_objects() {
        let raw = json!({
            "publicNetworkAccess": "Enabled",
            "encryption": { "keySource": "Microsoft", "services": { "blob": { "enabled": true } } },
            "minimumTlsVersion": null,
        });
        let d = ResourceDescriptor::normalize(ID, ResourceType::StorageAccount, &raw).unwrap();

        assert_eq!(d.str("encryption.keySource"), Some("Microsoft"));
        assert_eq!(d.flag("encryption.services.blob.enabled"), Some(true));
        assert_eq!(d.flag("publicNetworkAccess"), Some(true));
        assert!(!d.has("minimumTlsVersion"), "null should read as absent");
    }

    #[test]
    fn name_falls_back_to_last_segment() {
        let d = ResourceDescriptor::normalize(ID, ResourceType::StorageAccount, &json!({})).unwrap();
        assert_eq!(d.resource_name(), "acct1");

        let named = ResourceDescriptor::normalize(
            ID,
            ResourceType::StorageAccount,
            &json!({ "name": "display" }),
        )
        .unwrap();
        assert_eq!(named.resource_name(), "display");
    }

    #[test]
    fn list_objects_kept_as_json_text() {
        let raw = json!({ "ipRules": [{ "ipAddressOrRange": "0.0.0.0/0" }, "10.0.0.0/8"] });
        let d =
            ResourceDescriptor::normalize(ID, ResourceType::DocumentDatabaseAccount, &raw).unwrap();
        let rules = d.list("ipRules").unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[0].as_str().unwrap().contains("0.0.0.0/0"));
        assert_eq!(rules[1].as_str(), Some("10.0.0.0/8"));
    }

    #[test]
    fn non_object_config_is_malformed_fetch() {
        let err = ResourceDescriptor::normalize(ID, ResourceType::StorageAccount, &json!([1, 2]))
            .unwrap_err();
        assert!(matches!(
            err,
            ShieldError::Fetch {
                source: FetchError::Malformed(_),
                ..
            }
        ));
    }

    #[test]
    fn resource_type_lenient_parse() {
        assert_eq!(
            ResourceType::from_str_lenient("Storage-Account"),
            Some(ResourceType::StorageAccount)
        );
        assert_eq!(
            ResourceType::from_str_lenient("cosmosdb"),
            Some(ResourceType::DocumentDatabaseAccount)
        );
        assert_eq!(ResourceType::from_str_lenient("lambda"), None);
    }
}
