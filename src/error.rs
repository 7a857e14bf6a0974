use thiserror::Error;

use crate::provider::FetchError;
use crate::resource::ResourceType;

pub type Result<T> = std::result::Result<T, ShieldError>;

#[derive(Error, Debug)]
pub enum ShieldError {
    #[error("Unsupported resource type for {resource_id}: {reason}")]
    UnsupportedResourceType { resource_id: String, reason: String },

    #[error("Failed to fetch configuration for {resource_id}: {source}")]
    Fetch {
        resource_id: String,
        #[source]
        source: FetchError,
    },

    #[error("Duplicate rule id: {0}")]
    DuplicateRuleId(String),

    #[error("Result store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid resource id '{0}'")]
    InvalidResourceId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShieldError {
    pub fn unsupported(resource_id: &str, resource_type: Option<ResourceType>) -> Self {
        let reason = match resource_type {
            Some(t) => format!("no rules registered for {t}"),
            None => "resource type not recognized".into(),
        };
        Self::UnsupportedResourceType {
            resource_id: resource_id.into(),
            reason,
        }
    }

    /// Short machine-readable tag, used in sweep summaries and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedResourceType { .. } => "unsupported_resource_type",
            Self::Fetch { .. } => "fetch_error",
            Self::DuplicateRuleId(_) => "duplicate_rule_id",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidResourceId(_) => "invalid_resource_id",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { source, .. } => source.is_transient(),
            Self::StoreUnavailable(_) => true,
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}
