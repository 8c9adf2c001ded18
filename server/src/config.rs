//! Locates and loads `fsx.toml` (spec's "Configuration" ambient-stack
//! section): an explicit `--config` path takes precedence, otherwise a
//! `fsx.toml` in the current directory is used if present, otherwise the
//! engine runs on [`EngineConfig::default`].

use std::path::{Path, PathBuf};

use fsx_core::config::EngineConfig;
use tracing::{error, warn};

pub fn discover(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }
    let candidate = PathBuf::from("fsx.toml");
    candidate.exists().then_some(candidate)
}

pub fn load(path: Option<&Path>) -> EngineConfig {
    let Some(path) = path else {
        return EngineConfig::default();
    };
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            error!(path = %path.display(), error = %e, "could not read config file, using defaults");
            return EngineConfig::default();
        }
    };
    match EngineConfig::from_toml_str(&raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_path_reads_through_to_defaults() {
        let cfg = load(Some(Path::new("/nonexistent/fsx.toml")));
        assert_eq!(cfg.limits.hot_max_size, 1024 * 1024);
    }

    #[test]
    fn no_path_is_defaults() {
        let cfg = load(None);
        assert_eq!(cfg.limits.max_file_size, 100 * 1024 * 1024);
    }
}
