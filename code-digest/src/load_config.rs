/// `load_config` module: merges an optional YAML file with the environment into run settings.
///
/// This is the only place where untrusted YAML and environment values are
/// turned into the strongly-typed [`DigestConfig`] used by the core.
///
/// # Responsibilities
/// - Parse the optional YAML config file (no secrets) into intermediate structs
/// - Overlay environment variables (`TARGET_EXTENSIONS`, `FLOW_ID`,
///   `FLOW_ALIAS_ID`, `BEDROCK_REGION`), which take precedence over the file
/// - Report *all* missing required options at once, before any client is built
///
/// # Errors
/// Read and parse failures use `anyhow::Error`; missing or malformed required
/// options surface as a [`ConfigError`] inside it so the CLI can report them
/// as configuration errors.
use anyhow::Result;
use code_digest_core::config::{
    ConfigError, DigestConfig, FLOW_ALIAS_ID_VAR, FLOW_ID_VAR, TARGET_EXTENSIONS_VAR,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const REGION_VAR: &str = "BEDROCK_REGION";
pub const DEFAULT_REGION: &str = "ap-northeast-1";
pub const DEFAULT_INPUT_DIR: &str = "input";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_OUTPUT_PREFIX: &str = "output/";

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub selection: SelectionSection,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisSection {
    pub flow_id: Option<String>,
    pub flow_alias_id: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectionSection {
    pub target_extensions: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PathsSection {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub output_prefix: Option<String>,
}

/// Everything a run needs besides the command's own flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub digest: DigestConfig,
    pub region: String,
    pub paths: PathsSection,
}

/// Read and parse the YAML config file.
pub fn load_file_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    match serde_yaml::from_str::<Option<FileConfig>>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Merge the optional config file with the environment.
pub fn load_config(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };

    let env_or = |var: &str, fallback: Option<String>| match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => fallback,
    };

    let target_extensions = env_or(
        TARGET_EXTENSIONS_VAR,
        file.selection.target_extensions.map(|list| list.join(",")),
    );
    let flow_id = env_or(FLOW_ID_VAR, file.analysis.flow_id);
    let flow_alias_id = env_or(FLOW_ALIAS_ID_VAR, file.analysis.flow_alias_id);
    let region = env_or(REGION_VAR, file.analysis.region).unwrap_or_else(|| DEFAULT_REGION.to_string());

    let digest = DigestConfig::from_parts(target_extensions, flow_id, flow_alias_id).map_err(
        |e: ConfigError| {
            error!(error = %e, "Invalid configuration");
            anyhow::Error::new(e)
        },
    )?;
    digest.trace_loaded();
    info!(region = %region, "Config loaded and merged successfully");

    Ok(Settings {
        digest,
        region,
        paths: file.paths,
    })
}
