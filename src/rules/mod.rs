pub mod builtin;
pub mod finding;
pub mod policy;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Result, ShieldError};
use crate::resource::{ResourceDescriptor, ResourceType};

pub use finding::{Finding, RuleCategory, RuleMetadata, Severity};
pub use policy::{Policy, PolicyVerdict};

type Predicate = Arc<dyn Fn(&ResourceDescriptor) -> bool + Send + Sync>;

/// What a rule concludes when a property it reads is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingProperty {
    /// Absent data counts as non-compliant. The default.
    FailClosed,
    /// The rule declares a compliant platform default for absent data.
    AssumeCompliant,
}

/// A named compliance check.
///
/// The predicate returns `true` when the resource is NOT compliant. It only
/// runs when every property listed in `reads` is present; otherwise the
/// rule's [`MissingProperty`] policy decides.
#[derive(Clone)]
pub struct PolicyRule {
    metadata: RuleMetadata,
    reads: Vec<String>,
    on_missing: MissingProperty,
    predicate: Predicate,
}

impl PolicyRule {
    pub fn new<P>(metadata: RuleMetadata, predicate: P) -> Self
    where
        P: Fn(&ResourceDescriptor) -> bool + Send + Sync + 'static,
    {
        Self {
            metadata,
            reads: Vec::new(),
            on_missing: MissingProperty::FailClosed,
            predicate: Arc::new(predicate),
        }
    }

    /// Declare the properties the predicate depends on.
    pub fn reads(mut self, keys: &[&str]) -> Self {
        self.reads = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn assume_compliant_when_missing(mut self) -> Self {
        self.on_missing = MissingProperty::AssumeCompliant;
        self
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    pub fn on_missing(&self) -> MissingProperty {
        self.on_missing
    }

    pub fn applies_to(&self, resource_type: ResourceType) -> bool {
        self.metadata.applies_to.contains(&resource_type)
    }

    /// Evaluate against one descriptor. Never fires for other resource types.
    pub fn evaluate(&self, descriptor: &ResourceDescriptor) -> Option<Finding> {
        if !self.applies_to(descriptor.resource_type()) {
            return None;
        }

        let missing = self.reads.iter().any(|k| !descriptor.has(k));
        let fires = if missing {
            self.on_missing == MissingProperty::FailClosed
        } else {
            (self.predicate)(descriptor)
        };

        fires.then(|| self.metadata.to_finding())
    }

    fn with_severity(mut self, severity: Severity) -> Self {
        self.metadata.severity = severity;
        self
    }
}

impl std::fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRule")
            .field("id", &self.metadata.id)
            .field("severity", &self.metadata.severity)
            .field("applies_to", &self.metadata.applies_to)
            .field("reads", &self.reads)
            .field("on_missing", &self.on_missing)
            .finish()
    }
}

/// Ordered set of rules, indexed by resource type.
///
/// Built once at startup and shared read-only (`Arc<PolicyRegistry>`) by
/// every scan afterwards.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    rules: Vec<PolicyRule>,
    ids: HashSet<String>,
    by_type: HashMap<ResourceType, Vec<usize>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in rule set.
    pub fn with_builtin_rules() -> Result<Self> {
        let mut registry = Self::new();
        for rule in builtin::all_rules() {
            registry.register(rule)?;
        }
        Ok(registry)
    }

    /// Built-in rules with the policy's ignore list and severity overrides
    /// applied before registration.
    pub fn from_policy(policy: &Policy) -> Result<Self> {
        let mut registry = Self::new();
        for rule in builtin::all_rules() {
            if policy.ignore_rules.contains(rule.id()) {
                tracing::debug!(rule_id = rule.id(), "rule ignored by policy");
                continue;
            }
            let rule = match policy.overrides.get(rule.id()) {
                Some(&severity) => rule.with_severity(severity),
                None => rule,
            };
            registry.register(rule)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, rule: PolicyRule) -> Result<()> {
        if !self.ids.insert(rule.id().to_string()) {
            return Err(ShieldError::DuplicateRuleId(rule.id().to_string()));
        }

        let index = self.rules.len();
        for &t in &rule.metadata.applies_to {
            let slots = self.by_type.entry(t).or_default();
            if !slots.contains(&index) {
                slots.push(index);
            }
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Rules applying to `resource_type`, in registration order.
    pub fn rules_for(&self, resource_type: ResourceType) -> Vec<&PolicyRule> {
        self.by_type
            .get(&resource_type)
            .map(|idx| idx.iter().map(|&i| &self.rules[i]).collect())
            .unwrap_or_default()
    }

    pub fn supports(&self, resource_type: ResourceType) -> bool {
        self.by_type
            .get(&resource_type)
            .is_some_and(|idx| !idx.is_empty())
    }

    /// Run every applicable rule, in registry order.
    pub fn evaluate(&self, descriptor: &ResourceDescriptor) -> Vec<Finding> {
        self.rules_for(descriptor.resource_type())
            .into_iter()
            .filter_map(|rule| rule.evaluate(descriptor))
            .collect()
    }

    pub fn list_rules(&self) -> Vec<RuleMetadata> {
        self.rules.iter().map(|r| r.metadata.clone()).collect()
    }

    pub fn get(&self, rule_id: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.id() == rule_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::PropertyValue;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn meta(id: &str, types: &[ResourceType]) -> RuleMetadata {
        RuleMetadata {
            id: id.into(),
            name: "Test".into(),
            description: format!("{id} description"),
            recommendation: "fix it".into(),
            severity: Severity::Medium,
            category: RuleCategory::Network,
            applies_to: types.to_vec(),
        }
    }

    fn descriptor(t: ResourceType, props: &[(&str, PropertyValue)]) -> ResourceDescriptor {
        let properties = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>();
        ResourceDescriptor::new("/subscriptions/s/x", t, properties)
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut registry = PolicyRegistry::new();
        registry
            .register(PolicyRule::new(meta("R-1", &[ResourceType::StorageAccount]), |_| true))
            .unwrap();
        let err = registry
            .register(PolicyRule::new(meta("R-1", &[ResourceType::VirtualMachine]), |_| true))
            .unwrap_err();
        assert!(matches!(err, ShieldError::DuplicateRuleId(id) if id == "R-1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rules_for_keeps_registration_order() {
        let mut registry = PolicyRegistry::new();
        for id in ["C", "A", "B"] {
            registry
                .register(PolicyRule::new(meta(id, &[ResourceType::StorageAccount]), |_| true))
                .unwrap();
        }
        registry
            .register(PolicyRule::new(meta("VM", &[ResourceType::VirtualMachine]), |_| true))
            .unwrap();

        let ids: Vec<&str> = registry
            .rules_for(ResourceType::StorageAccount)
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
        assert!(!registry.supports(ResourceType::DocumentDatabaseAccount));
    }

    #[test]
    fn missing_property_fails_closed_by_default() {
        let rule = PolicyRule::new(meta("R", &[ResourceType::StorageAccount]), |d| {
            d.flag("x") == Some(true)
        })
        .reads(&["x"]);
        let d = descriptor(ResourceType::StorageAccount, &[]);
        assert!(rule.evaluate(&d).is_some());
    }

    #[test]
    fn declared_default_suppresses_missing() {
        let rule = PolicyRule::new(meta("R", &[ResourceType::StorageAccount]), |d| {
            d.flag("x") == Some(true)
        })
        .reads(&["x"])
        .assume_compliant_when_missing();
        let d = descriptor(ResourceType::StorageAccount, &[]);
        assert!(rule.evaluate(&d).is_none());
    }

    #[test]
    fn policy_ignore_and_override_applied_at_build() {
        let mut policy = Policy::default();
        policy.ignore_rules.insert("STG-003".into());
        policy.overrides.insert("STG-001".into(), Severity::Critical);

        let registry = PolicyRegistry::from_policy(&policy).unwrap();
        assert!(registry.get("STG-003").is_none());
        assert_eq!(
            registry.get("STG-001").unwrap().metadata().severity,
            Severity::Critical
        );
    }

    fn arb_value() -> impl Strategy<Value = PropertyValue> {
        prop_oneof![
            any::<bool>().prop_map(PropertyValue::Bool),
            (-1000.0f64..1000.0).prop_map(PropertyValue::Number),
            prop_oneof![
                Just("Enabled".to_string()),
                Just("Disabled".to_string()),
                Just("Microsoft".to_string()),
                Just("Microsoft.Keyvault".to_string()),
                Just("TLS1_0".to_string()),
                Just("TLS1_2".to_string()),
                "[a-z]{0,8}",
            ]
            .prop_map(PropertyValue::String),
            prop::collection::vec("[0-9./]{0,12}".prop_map(PropertyValue::String), 0..3)
                .prop_map(PropertyValue::List),
        ]
    }

    fn arb_descriptor() -> impl Strategy<Value = ResourceDescriptor> {
        let keys = prop_oneof![
            Just("publicNetworkAccess"),
            Just("encryptionKeySource"),
            Just("supportsHttpsTrafficOnly"),
            Just("minimumTlsVersion"),
            Just("storageProfile.osDisk.managedDisk.id"),
            Just("securityProfile.encryptionAtHost"),
            Just("publicIpAddresses"),
            Just("ipRules"),
            Just("keyVaultKeyUri"),
            Just("enableAutomaticFailover"),
            Just("enableMultipleWriteLocations"),
            Just("isVirtualNetworkFilterEnabled"),
        ];
        (
            prop::sample::select(ResourceType::ALL.to_vec()),
            prop::collection::btree_map(keys.prop_map(String::from), arb_value(), 0..8),
        )
            .prop_map(|(t, props)| ResourceDescriptor::new("/subscriptions/s/r", t, props))
    }

    proptest! {
        #[test]
        fn evaluation_is_deterministic(d in arb_descriptor()) {
            let registry = PolicyRegistry::with_builtin_rules().unwrap();
            let first = registry.evaluate(&d);
            let second = registry.evaluate(&d);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn rules_never_fire_on_other_types(d in arb_descriptor()) {
            let registry = PolicyRegistry::with_builtin_rules().unwrap();
            for meta in registry.list_rules() {
                let rule = registry.get(&meta.id).unwrap();
                if !meta.applies_to.contains(&d.resource_type()) {
                    prop_assert!(rule.evaluate(&d).is_none());
                }
            }
            for f in registry.evaluate(&d) {
                let meta = registry.get(&f.rule_id).unwrap().metadata();
                prop_assert!(meta.applies_to.contains(&d.resource_type()));
            }
        }
    }
}
