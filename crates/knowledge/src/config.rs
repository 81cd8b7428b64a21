//! Per-base settings and on-disk layout.
//!
//! Every base lives in `.cityhub/knowledge/<base>/` and holds its
//! `config.yaml` next to the SQLite index.

use crate::types::KnowledgeBaseConfig;
use cityhub_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";
const INDEX_FILE: &str = "index.sqlite";

/// Settings for `base_name`, falling back to defaults when the base has no
/// `config.yaml` yet. The name stored in the file is ignored.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    check_base_name(base_name)?;
    let path = get_config_path(workspace, base_name);

    let mut config = if path.is_file() {
        let raw = fs::read_to_string(&path)
            .map_err(|e| AppError::Knowledge(format!("Cannot read {}: {}", path.display(), e)))?;
        serde_yaml::from_str::<KnowledgeBaseConfig>(&raw)
            .map_err(|e| AppError::Knowledge(format!("Invalid {}: {}", path.display(), e)))?
    } else {
        tracing::debug!(base = base_name, "No base config on disk, using defaults");
        KnowledgeBaseConfig::default()
    };

    config.name = base_name.to_string();
    check_chunking(&config)?;
    Ok(config)
}

/// Persist settings so later queries embed with the same provider.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    check_base_name(&config.name)?;
    let dir = get_base_dir(workspace, &config.name);
    fs::create_dir_all(&dir)?;

    let yaml = serde_yaml::to_string(config)
        .map_err(|e| AppError::Serialization(format!("Base config: {}", e)))?;
    fs::write(dir.join(CONFIG_FILE), yaml)?;

    tracing::debug!(base = %config.name, "Saved base config");
    Ok(())
}

pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join(CONFIG_FILE)
}

pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace.join(".cityhub").join("knowledge").join(base_name)
}

pub fn get_index_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join(INDEX_FILE)
}

/// Base names become directory names, so only plain identifiers pass.
fn check_base_name(base_name: &str) -> AppResult<()> {
    let valid = !base_name.is_empty()
        && !base_name.starts_with('.')
        && base_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AppError::Knowledge(format!(
            "Invalid knowledge base name '{}': use letters, digits, '-', '_' or '.'",
            base_name
        )))
    }
}

fn check_chunking(config: &KnowledgeBaseConfig) -> AppResult<()> {
    if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
        return Err(AppError::Knowledge(format!(
            "Base '{}': chunkOverlap ({}) must be smaller than a non-zero chunkSize ({})",
            config.name, config.chunk_overlap, config.chunk_size
        )));
    }
    Ok(())
}
