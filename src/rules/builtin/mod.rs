mod document_db;
mod storage;
mod virtual_machine;

use crate::resource::{ResourceDescriptor, ResourceType};

use super::{PolicyRule, RuleCategory, RuleMetadata, Severity};

/// Returns the standard rule set, in evaluation order.
pub fn all_rules() -> Vec<PolicyRule> {
    let mut rules = storage::rules();
    rules.extend(virtual_machine::rules());
    rules.extend(document_db::rules());
    rules
}

fn metadata(
    id: &str,
    name: &str,
    severity: Severity,
    category: RuleCategory,
    applies_to: ResourceType,
    description: &str,
    recommendation: &str,
) -> RuleMetadata {
    RuleMetadata {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        recommendation: recommendation.into(),
        severity,
        category,
        applies_to: vec![applies_to],
    }
}

/// Non-compliant unless the switch is explicitly off.
fn not_disabled(d: &ResourceDescriptor, key: &str) -> bool {
    d.flag(key) != Some(false)
}

/// Non-compliant unless the switch is explicitly on.
fn not_enabled(d: &ResourceDescriptor, key: &str) -> bool {
    d.flag(key) != Some(true)
}
