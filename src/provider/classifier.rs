use crate::error::{Result, ShieldError};
use crate::resource::{ResourcePath, ResourceType};

use super::ResourceTypeClassifier;

/// Classifies management-API resource ids by their provider type segment.
pub struct ArmPathClassifier;

impl ArmPathClassifier {
    pub fn type_for(provider_type: &str) -> Option<ResourceType> {
        match provider_type.to_lowercase().as_str() {
            "microsoft.compute/virtualmachines" => Some(ResourceType::VirtualMachine),
            "microsoft.storage/storageaccounts" => Some(ResourceType::StorageAccount),
            "microsoft.documentdb/databaseaccounts" => Some(ResourceType::DocumentDatabaseAccount),
            _ => None,
        }
    }
}

impl ResourceTypeClassifier for ArmPathClassifier {
    fn classify(&self, resource_id: &str) -> Result<ResourceType> {
        let path = ResourcePath::parse(resource_id)
            .map_err(|_| ShieldError::unsupported(resource_id, None))?;

        Self::type_for(&path.provider_type()).ok_or_else(|| {
            tracing::debug!(
                resource_id,
                provider_type = %path.provider_type(),
                "no resource type mapping"
            );
            ShieldError::unsupported(resource_id, None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_provider_types() {
        let c = ArmPathClassifier;
        assert_eq!(
            c.classify("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1")
                .unwrap(),
            ResourceType::VirtualMachine
        );
        assert_eq!(
            c.classify("/subscriptions/s/resourceGroups/rg/providers/microsoft.storage/storageaccounts/st")
                .unwrap(),
            ResourceType::StorageAccount
        );
        assert_eq!(
            c.classify("/subscriptions/s/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/db")
                .unwrap(),
            ResourceType::DocumentDatabaseAccount
        );
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let err = ArmPathClassifier
            .classify("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Web/sites/app")
            .unwrap_err();
        assert!(matches!(err, ShieldError::UnsupportedResourceType { .. }));
    }

    #[test]
    fn garbage_id_is_unsupported() {
        let err = ArmPathClassifier.classify("not-a-path").unwrap_err();
        assert_eq!(err.kind(), "unsupported_resource_type");
    }
}
