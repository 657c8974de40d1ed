use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Names of the required options, as they appear in the environment.
pub const FLOW_ID_VAR: &str = "FLOW_ID";
pub const FLOW_ALIAS_ID_VAR: &str = "FLOW_ALIAS_ID";
pub const TARGET_EXTENSIONS_VAR: &str = "TARGET_EXTENSIONS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("Malformed target extension list {raw:?}: {reason}")]
    MalformedExtensions { raw: String, reason: String },
}

/// Accepted file suffixes, matched case-insensitively against file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TargetExtensions(Vec<String>);

impl TargetExtensions {
    /// Parse a comma-separated list such as `.py, .js,.java`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::from_list(raw.split(','))
    }

    pub fn from_list<I, S>(items: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = items.into_iter().map(|s| s.as_ref().to_string()).collect();
        let raw = items.join(",");
        let mut extensions = Vec::with_capacity(items.len());
        for item in &items {
            let ext = item.trim();
            if ext.is_empty() {
                return Err(ConfigError::MalformedExtensions {
                    raw,
                    reason: "empty entry".to_string(),
                });
            }
            if ext.contains('/') || ext.contains('\\') {
                return Err(ConfigError::MalformedExtensions {
                    raw,
                    reason: format!("{ext:?} contains a path separator"),
                });
            }
            extensions.push(ext.to_lowercase());
        }
        if extensions.is_empty() {
            return Err(ConfigError::MalformedExtensions {
                raw,
                reason: "no extensions given".to_string(),
            });
        }
        Ok(Self(extensions))
    }

    /// Plain suffix match on the lowercased file name.
    pub fn matches(&self, file_name: &str) -> bool {
        self.matched(file_name).is_some()
    }

    /// The first configured suffix `file_name` ends with.
    pub fn matched(&self, file_name: &str) -> Option<&str> {
        let lower = file_name.to_lowercase();
        self.0
            .iter()
            .find(|ext| lower.ends_with(ext.as_str()))
            .map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for TargetExtensions {
    type Error = ConfigError;

    fn try_from(items: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_list(items)
    }
}

impl From<TargetExtensions> for Vec<String> {
    fn from(extensions: TargetExtensions) -> Self {
        extensions.0
    }
}

/// Identifies which remote analysis flow to invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    pub flow_id: String,
    pub flow_alias_id: String,
}

/// Validated configuration for one digest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestConfig {
    pub target_extensions: TargetExtensions,
    pub flow: FlowConfig,
}

impl DigestConfig {
    /// Build from raw optional values. Blank values count as missing, and all
    /// missing options are reported together.
    pub fn from_parts(
        target_extensions: Option<String>,
        flow_id: Option<String>,
        flow_alias_id: Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        match (
            non_blank(target_extensions),
            non_blank(flow_id),
            non_blank(flow_alias_id),
        ) {
            (Some(raw_extensions), Some(flow_id), Some(flow_alias_id)) => Ok(Self {
                target_extensions: TargetExtensions::parse(&raw_extensions)?,
                flow: FlowConfig {
                    flow_id: flow_id.trim().to_string(),
                    flow_alias_id: flow_alias_id.trim().to_string(),
                },
            }),
            (extensions, flow_id, flow_alias_id) => {
                let mut missing = Vec::new();
                if flow_id.is_none() {
                    missing.push(FLOW_ID_VAR);
                }
                if flow_alias_id.is_none() {
                    missing.push(FLOW_ALIAS_ID_VAR);
                }
                if extensions.is_none() {
                    missing.push(TARGET_EXTENSIONS_VAR);
                }
                Err(ConfigError::Missing(missing))
            }
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            flow_id = %self.flow.flow_id,
            flow_alias_id = %self.flow.flow_alias_id,
            extensions = ?self.target_extensions.as_slice(),
            "Loaded DigestConfig"
        );
        debug!(?self, "DigestConfig loaded (full debug)");
    }
}
