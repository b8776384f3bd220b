use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    Error, Result,
    env_subst::substitute_env,
    schema::MirrorConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["config.json", "config.toml", "config.yaml", "config.yml"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<MirrorConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load config from `explicit` when given, otherwise from the first file found
/// in the standard locations.
///
/// Search order:
/// 1. `./config.{json,toml,yaml,yml}` (project-local)
/// 2. `~/.config/mirror/config.{json,toml,yaml,yml}` (user-global)
///
/// Unlike most settings files, a missing config is an error: without
/// redirects there is nothing to relay.
pub fn discover_config(explicit: Option<&Path>) -> Result<(PathBuf, MirrorConfig)> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config_file().ok_or_else(|| Error::NotFound {
            searched: searched_locations(),
        })?,
    };
    debug!(path = %path.display(), "loading config");
    let config = load_config(&path)?;
    Ok((path, config))
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/mirror/
    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/mirror/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mirror").map(|d| d.config_dir().to_path_buf())
}

fn searched_locations() -> String {
    let mut places: Vec<String> = CONFIG_FILENAMES.iter().map(|n| format!("./{n}")).collect();
    if let Some(dir) = config_dir() {
        places.extend(
            CONFIG_FILENAMES
                .iter()
                .map(|n| dir.join(n).display().to_string()),
        );
    }
    places.join(", ")
}

fn parse_config(raw: &str, path: &Path) -> Result<MirrorConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match ext {
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
