//! Command handlers - extracted from main.rs for testability
//!
//! Each handler module contains the execution logic for one CLI command and
//! its tests.

pub mod machine;
pub mod refs;
pub mod run;
pub mod validate;

pub use machine::execute_machine;
pub use refs::execute_refs;
pub use run::{apply_run_overrides, execute_run};
pub use validate::{execute_validate, validate_file, FileCheck};

use crate::error::{CliError, CliResult};
use comprobar::HarnessConfig;
use std::path::{Path, PathBuf};

/// Load the harness config (file, then environment), adding extra selector
/// tables from the command line after those the file names.
pub fn load_harness_config(
    path: Option<&Path>,
    selectors: &[PathBuf],
) -> CliResult<HarnessConfig> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            HarnessConfig::from_yaml_file(path)?
        }
        None => HarnessConfig::default(),
    }
    .with_env_overrides();
    for extra in selectors {
        config = config.with_selectors(extra);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = load_harness_config(None, &[]).unwrap();
        assert!(config.selectors.is_empty());
        assert_eq!(config.max_concurrency, HarnessConfig::default().max_concurrency);
    }

    #[test]
    fn test_missing_file() {
        let err = load_harness_config(Some(Path::new("/nonexistent/comprobar.yaml")), &[])
            .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_extra_selectors_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comprobar.yaml");
        std::fs::write(&path, "max_concurrency: 2\nselectors: [site.yaml]\n").unwrap();
        let config = load_harness_config(Some(&path), &[PathBuf::from("cli.yaml")]).unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(
            config.selectors,
            vec![dir.path().join("site.yaml"), PathBuf::from("cli.yaml")]
        );
    }
}
