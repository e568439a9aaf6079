use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::entity::ConfigEntity;
use crate::error::{AmosError, Result};

static CONFIG: OnceLock<ConfigEntity> = OnceLock::new();

pub fn default_config_path() -> PathBuf {
    // 优先使用环境变量 AMOS_CONFIG_PATH，否则使用工作目录下的 amos.toml
    if let Ok(p) = env::var("AMOS_CONFIG_PATH") {
        return PathBuf::from(p);
    }
    PathBuf::from("amos.toml")
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Parse the config at `path`; a missing file is created with defaults.
pub fn read_config(path: &Path) -> Result<ConfigEntity> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AmosError::Config(format!("{}: {e}", path.display())))
    } else {
        let cfg = ConfigEntity::default();
        write_config(path, &cfg)?;
        Ok(cfg)
    }
}

pub fn write_config(path: &Path, cfg: &ConfigEntity) -> Result<()> {
    let toml_str = toml::to_string_pretty(cfg).map_err(|e| AmosError::Config(e.to_string()))?;
    ensure_parent_dir(path)?;
    fs::write(path, toml_str)?;
    Ok(())
}

fn get_or_init_config() -> &'static ConfigEntity {
    CONFIG.get_or_init(ConfigEntity::default)
}

/// Load `path` (or the default location) into the process-wide holder.
pub fn load_config(path: Option<&Path>) -> Result<&'static ConfigEntity> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let cfg = read_config(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(get_or_init_config())
}
