//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::FileConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Failure to produce a usable configuration from a file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("configuration rejected: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_the_path() {
        let err = load_config(Path::new("/no/such/front.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/no/such/front.toml"));
    }

    #[test]
    fn malformed_toml_reports_a_parse_error() {
        let path = std::env::temp_dir().join(format!(
            "stream-front-loader-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[[server]\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn validation_errors_joined_in_one_message() {
        let err = ConfigError::Validation(vec![
            ValidationError::NoServers,
            ValidationError::NoListen { server: 0 },
        ]);
        let text = err.to_string();
        assert!(text.contains("no server blocks configured"));
        assert!(text.contains("; "));
    }
}
