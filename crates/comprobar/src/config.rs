//! Harness configuration.
//!
//! Loaded from YAML, then overridden by environment variables, then by
//! command-line flags. Every field has a default, so an empty file is valid.
//!
//! ```yaml
//! base_url: http://localhost:5173
//! artifacts_dir: verification
//! assert_timeout_ms: 5000
//! max_concurrency: 2
//! selectors: [refs/overrides.yaml]
//! variables:
//!   ADMIN_USER: superadmin
//! driver:
//!   headless: true
//! ```

use crate::assertion::{AssertionEngine, NotVisiblePolicy, DEFAULT_ASSERT_TIMEOUT_MS};
use crate::driver::{DriverConfig, DEFAULT_POLL_INTERVAL_MS};
use crate::result::{ComprobarError, ComprobarResult};
use crate::scenario::Variables;
use crate::selector::{SelectorResolver, SelectorTable, DEFAULT_PROBE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "COMPROBAR_BASE_URL";
/// Environment variable overriding `artifacts_dir`
pub const ENV_ARTIFACTS_DIR: &str = "COMPROBAR_ARTIFACTS_DIR";

/// Configuration shared by every scenario in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL relative `navigate` targets are joined to
    pub base_url: String,
    /// Root for screenshots, HTML snapshots and reports
    pub artifacts_dir: PathBuf,
    /// Default timeout for visibility assertions
    pub assert_timeout_ms: u64,
    /// Per-strategy existence probe
    pub probe_timeout_ms: u64,
    /// Assertion polling interval
    pub poll_interval_ms: u64,
    /// Budget for locating a control to act on
    pub resolve_budget_ms: u64,
    /// Wait on each role-picker guard
    pub guard_probe_ms: u64,
    /// Wait for a dashboard marker after submitting credentials
    pub login_timeout_ms: u64,
    /// Hard ceiling for one scenario
    pub scenario_deadline_ms: u64,
    /// Scenarios run at once
    pub max_concurrency: usize,
    /// What satisfies `assert_not_visible`
    pub not_visible_policy: NotVisiblePolicy,
    /// Write `<scenario>/report.json` next to the artifacts
    pub write_reports: bool,
    /// Selector override tables, merged in order over the defaults
    pub selectors: Vec<PathBuf>,
    /// Values for `${NAME}` placeholders; the environment is consulted after
    pub variables: BTreeMap<String, String>,
    /// Browser settings
    pub driver: DriverConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".to_string(),
            artifacts_dir: PathBuf::from("verification"),
            assert_timeout_ms: DEFAULT_ASSERT_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            resolve_budget_ms: 3000,
            guard_probe_ms: 1000,
            login_timeout_ms: 5000,
            scenario_deadline_ms: 120_000,
            max_concurrency: 4,
            not_visible_policy: NotVisiblePolicy::default(),
            write_reports: true,
            selectors: Vec::new(),
            variables: BTreeMap::new(),
            driver: DriverConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the artifacts directory
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Set the default assertion timeout
    #[must_use]
    pub const fn with_assert_timeout(mut self, timeout: Duration) -> Self {
        self.assert_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the assertion polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the login outcome timeout
    #[must_use]
    pub const fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the scenario deadline
    #[must_use]
    pub const fn with_scenario_deadline(mut self, deadline: Duration) -> Self {
        self.scenario_deadline_ms = deadline.as_millis() as u64;
        self
    }

    /// Set the number of scenarios run at once
    #[must_use]
    pub const fn with_max_concurrency(mut self, jobs: usize) -> Self {
        self.max_concurrency = jobs;
        self
    }

    /// Set the `NotVisible` policy
    #[must_use]
    pub const fn with_not_visible_policy(mut self, policy: NotVisiblePolicy) -> Self {
        self.not_visible_policy = policy;
        self
    }

    /// Enable or disable per-scenario JSON reports
    #[must_use]
    pub const fn with_write_reports(mut self, write: bool) -> Self {
        self.write_reports = write;
        self
    }

    /// Add a selector override table
    #[must_use]
    pub fn with_selectors(mut self, path: impl Into<PathBuf>) -> Self {
        self.selectors.push(path.into());
        self
    }

    /// Set a placeholder value
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Set browser settings
    #[must_use]
    pub fn with_driver(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    /// Parse from YAML
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed or the values are invalid
    pub fn from_yaml(yaml: &str) -> ComprobarResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)
                .map_err(|e| ComprobarError::config(format!("invalid config: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file. Relative selector paths resolve against the
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_yaml_file(path: &Path) -> ComprobarResult<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ComprobarError::config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_yaml(&yaml)?;
        if let Some(base) = path.parent() {
            for selector in &mut config.selectors {
                if selector.is_relative() {
                    *selector = base.join(&*selector);
                }
            }
        }
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply `COMPROBAR_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(dir) = lookup(ENV_ARTIFACTS_DIR).filter(|v| !v.is_empty()) {
            self.artifacts_dir = PathBuf::from(dir);
        }
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first bad field
    pub fn validate(&self) -> ComprobarResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ComprobarError::config("base_url cannot be empty"));
        }
        if self.max_concurrency == 0 {
            return Err(ComprobarError::config("max_concurrency must be at least 1"));
        }
        for (name, value) in [
            ("assert_timeout_ms", self.assert_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("resolve_budget_ms", self.resolve_budget_ms),
            ("login_timeout_ms", self.login_timeout_ms),
            ("scenario_deadline_ms", self.scenario_deadline_ms),
        ] {
            if value == 0 {
                return Err(ComprobarError::config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Join a relative URL to `base_url`; absolute URLs pass through
    #[must_use]
    pub fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    /// Default assertion timeout
    #[must_use]
    pub const fn assert_timeout(&self) -> Duration {
        Duration::from_millis(self.assert_timeout_ms)
    }

    /// Assertion polling interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Budget for locating a control
    #[must_use]
    pub const fn resolve_budget(&self) -> Duration {
        Duration::from_millis(self.resolve_budget_ms)
    }

    /// Wait on each role-picker guard
    #[must_use]
    pub const fn guard_probe(&self) -> Duration {
        Duration::from_millis(self.guard_probe_ms)
    }

    /// Login outcome timeout
    #[must_use]
    pub const fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    /// Scenario deadline
    #[must_use]
    pub const fn scenario_deadline(&self) -> Duration {
        Duration::from_millis(self.scenario_deadline_ms)
    }

    /// Default table merged with every override file, in order
    ///
    /// # Errors
    ///
    /// Returns error if an override file cannot be loaded
    pub fn selector_table(&self) -> ComprobarResult<SelectorTable> {
        let mut table = SelectorTable::library_defaults();
        for path in &self.selectors {
            table.merge(SelectorTable::from_yaml_file(path)?);
        }
        Ok(table)
    }

    /// Resolver over [`Self::selector_table`]
    ///
    /// # Errors
    ///
    /// Returns error if an override file cannot be loaded
    pub fn resolver(&self) -> ComprobarResult<SelectorResolver> {
        Ok(SelectorResolver::new(self.selector_table()?)
            .with_probe_timeout(Duration::from_millis(self.probe_timeout_ms)))
    }

    /// Assertion engine with the configured polling and policy
    #[must_use]
    pub fn engine(&self) -> AssertionEngine {
        AssertionEngine::new()
            .with_poll_interval(self.poll_interval())
            .with_not_visible_policy(self.not_visible_policy)
    }

    /// Placeholder values, backed by the environment
    #[must_use]
    pub fn variables(&self) -> Variables {
        let values: HashMap<String, String> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Variables::new(values).with_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod defaults_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = HarnessConfig::default();
            assert_eq!(config.base_url, "http://localhost:5173");
            assert_eq!(config.artifacts_dir, PathBuf::from("verification"));
            assert_eq!(config.assert_timeout(), Duration::from_millis(5000));
            assert_eq!(config.max_concurrency, 4);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_empty_yaml_is_default() {
            assert_eq!(HarnessConfig::from_yaml("").unwrap(), HarnessConfig::default());
        }

        #[test]
        fn test_builder() {
            let config = HarnessConfig::new()
                .with_base_url("https://biblioteca.example")
                .with_max_concurrency(1)
                .with_assert_timeout(Duration::from_millis(800))
                .with_variable("ADMIN_PASSWORD", "admin123");
            assert_eq!(config.assert_timeout_ms, 800);
            assert_eq!(config.variables.get("ADMIN_PASSWORD").unwrap(), "admin123");
        }
    }

    mod yaml_tests {
        use super::*;

        #[test]
        fn test_partial_yaml() {
            let config = HarnessConfig::from_yaml(
                "base_url: https://biblioteca.example\nmax_concurrency: 2\nnot_visible_policy: absent_only\n",
            )
            .unwrap();
            assert_eq!(config.base_url, "https://biblioteca.example");
            assert_eq!(config.max_concurrency, 2);
            assert_eq!(config.not_visible_policy, NotVisiblePolicy::AbsentOnly);
            assert_eq!(config.assert_timeout_ms, DEFAULT_ASSERT_TIMEOUT_MS);
        }

        #[test]
        fn test_invalid_values() {
            assert!(HarnessConfig::from_yaml("max_concurrency: 0\n").is_err());
            assert!(HarnessConfig::from_yaml("poll_interval_ms: 0\n").is_err());
            assert!(HarnessConfig::from_yaml("base_url: ''\n").is_err());
            assert!(HarnessConfig::from_yaml("max_concurrency: many\n").is_err());
        }

        #[test]
        fn test_file_resolves_selector_paths() {
            let dir = TempDir::new().unwrap();
            let refs = dir.path().join("refs.yaml");
            std::fs::write(&refs, "refs:\n  loan-table:\n    - by: css\n      css: table.loans\n")
                .unwrap();
            let path = dir.path().join("comprobar.yaml");
            std::fs::write(&path, "selectors: [refs.yaml]\n").unwrap();

            let config = HarnessConfig::from_yaml_file(&path).unwrap();
            assert_eq!(config.selectors, vec![refs]);
            let table = config.selector_table().unwrap();
            assert!(table.contains(&"loan-table".into()));
            assert!(table.contains(&"teacher-entry".into()));
        }

        #[test]
        fn test_missing_file() {
            let err = HarnessConfig::from_yaml_file(Path::new("/nonexistent/comprobar.yaml"))
                .unwrap_err();
            assert!(matches!(err, ComprobarError::Config { .. }));
        }
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_overrides() {
            let config = HarnessConfig::default().with_overrides_from(|name| match name {
                ENV_BASE_URL => Some("http://staging:8080".to_string()),
                ENV_ARTIFACTS_DIR => Some(String::new()),
                _ => None,
            });
            assert_eq!(config.base_url, "http://staging:8080");
            assert_eq!(config.artifacts_dir, PathBuf::from("verification"));
        }

        #[test]
        fn test_resolve_url() {
            let config = HarnessConfig::default().with_base_url("http://localhost:5173/");
            assert_eq!(config.resolve_url("/"), "http://localhost:5173/");
            assert_eq!(config.resolve_url("admin"), "http://localhost:5173/admin");
            assert_eq!(
                config.resolve_url("https://prisma.bibliohispa.es/"),
                "https://prisma.bibliohispa.es/"
            );
        }

        #[test]
        fn test_variables_prefer_config() {
            let config = HarnessConfig::default().with_variable("PATH", "from-config");
            assert_eq!(config.variables().get("PATH").unwrap(), "from-config");
        }
    }
}
