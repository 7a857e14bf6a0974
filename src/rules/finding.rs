use serde::{Deserialize, Serialize};

use crate::resource::ResourceType;

/// A compliance finding produced by a policy rule.
///
/// Rule metadata is copied in at evaluation time, so a finding stays
/// meaningful after its rule is reworded or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable rule identifier (e.g., "STG-001").
    pub rule_id: String,
    /// Severity level.
    pub severity: Severity,
    /// Area of the resource configuration the rule covers.
    pub category: RuleCategory,
    /// Human-readable description of the finding.
    pub description: String,
    /// Suggested remediation.
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Network,
    Encryption,
    Availability,
    Compute,
    Access,
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "Network"),
            Self::Encryption => write!(f, "Encryption"),
            Self::Availability => write!(f, "Availability"),
            Self::Compute => write!(f, "Compute"),
            Self::Access => write!(f, "Access"),
        }
    }
}

/// Static description of a rule, used for `list-rules` output and copied
/// into every finding the rule produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub recommendation: String,
    pub severity: Severity,
    pub category: RuleCategory,
    pub applies_to: Vec<ResourceType>,
}

impl RuleMetadata {
    pub fn to_finding(&self) -> Finding {
        Finding {
            rule_id: self.id.clone(),
            severity: self.severity,
            category: self.category,
            description: self.description.clone(),
            recommendation: self.recommendation.clone(),
        }
    }
}
