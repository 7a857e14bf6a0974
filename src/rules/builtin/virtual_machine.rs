use crate::resource::ResourceType::VirtualMachine;
use crate::rules::{PolicyRule, RuleCategory, Severity};

use super::{metadata, not_enabled};

const OS_DISK_MANAGED_ID: &str = "storageProfile.osDisk.managedDisk.id";
const IMAGE_OFFER: &str = "storageProfile.imageReference.offer";
const IMAGE_SKU: &str = "storageProfile.imageReference.sku";

/// Windows Server image SKUs still receiving security updates.
const SUPPORTED_WINDOWS_SKUS: &[&str] = &[
    "2019-Datacenter",
    "2022-Datacenter",
    "2022-datacenter-azure-edition",
    "2025-Datacenter",
];

pub(super) fn rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(
            metadata(
                "VM-001",
                "Unmanaged OS disk",
                Severity::High,
                RuleCategory::Compute,
                VirtualMachine,
                "VM is not using managed disks",
                "Convert to managed disks for improved security and management",
            ),
            |d| d.str(OS_DISK_MANAGED_ID).map_or(true, str::is_empty),
        )
        .reads(&[OS_DISK_MANAGED_ID]),
        PolicyRule::new(
            metadata(
                "VM-002",
                "Host encryption disabled",
                Severity::High,
                RuleCategory::Encryption,
                VirtualMachine,
                "VM disks are not encrypted at host",
                "Enable encryption at host for the VM",
            ),
            |d| not_enabled(d, "securityProfile.encryptionAtHost"),
        )
        .reads(&["securityProfile.encryptionAtHost"]),
        PolicyRule::new(
            metadata(
                "VM-003",
                "Public IP attached",
                Severity::Medium,
                RuleCategory::Network,
                VirtualMachine,
                "VM has a public IP address attached",
                "Remove the public IP and reach the VM through a bastion or private network",
            ),
            |d| d.list("publicIpAddresses").map_or(true, |ips| !ips.is_empty()),
        )
        .reads(&["publicIpAddresses"]),
        // Custom images carry no marketplace reference; nothing to compare.
        PolicyRule::new(
            metadata(
                "VM-004",
                "Outdated OS image",
                Severity::Medium,
                RuleCategory::Compute,
                VirtualMachine,
                "VM is not using a supported OS version",
                "Update to a supported OS version to ensure security patches are applied",
            ),
            |d| {
                let offer = d.str(IMAGE_OFFER).unwrap_or_default();
                let sku = d.str(IMAGE_SKU).unwrap_or_default();
                offer.eq_ignore_ascii_case("WindowsServer")
                    && !SUPPORTED_WINDOWS_SKUS
                        .iter()
                        .any(|s| s.eq_ignore_ascii_case(sku))
            },
        )
        .reads(&[IMAGE_OFFER, IMAGE_SKU])
        .assume_compliant_when_missing(),
    ]
}
