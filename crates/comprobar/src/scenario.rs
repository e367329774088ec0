//! Scenario definitions.
//!
//! A scenario is a named, ordered list of steps plus the state the session is
//! expected to end in. Scenarios are YAML documents, either a single
//! scenario or a suite:
//!
//! ```yaml
//! scenarios:
//!   - name: superadmin sees history toggles
//!     expect: superadmin
//!     steps:
//!       - kind: navigate
//!         url: /
//!       - kind: authenticate_as
//!         role: superadmin
//!         username: superadmin
//!         password: ${ADMIN_PASSWORD}
//!       - kind: interact
//!         ref: history-tab
//!         action: { type: click }
//!       - kind: assert_visible
//!         ref: global-toggle
//!       - kind: capture
//!         label: history
//! ```
//!
//! Steps are pure data. They never hold driver handles or raw selectors;
//! elements are named by [`UiRef`].

use crate::result::ComprobarError;
use crate::selector::{SelectorTable, UiRef};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// Longest allowed `pause` step (60 seconds)
pub const MAX_PAUSE_MS: u64 = 60_000;

/// User role in the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Nobody signed in
    Anonymous,
    /// Student
    Student,
    /// Teacher (admin without global settings)
    Teacher,
    /// Superadmin
    #[serde(alias = "super_admin")]
    SuperAdmin,
}

impl Role {
    /// Role name as written in scenarios
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::SuperAdmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How staff sign in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Username and password form
    #[default]
    Manual,
    /// External single sign-on
    Sso,
}

/// What an `interact` step does to its element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    /// Click the element
    Click,
    /// Replace the element's value
    Fill {
        /// Text to type; `${NAME}` placeholders are substituted
        text: String,
    },
}

/// One scenario step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Load a URL; relative URLs are joined to the base URL
    Navigate {
        /// Target URL
        url: String,
    },
    /// Sign in as a role through the login machine
    AuthenticateAs {
        /// Role to reach
        role: Role,
        /// Staff login method
        #[serde(default)]
        method: AuthMethod,
        /// Username or student name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Password
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Wait until the element is visible
    AssertVisible {
        /// Element
        #[serde(rename = "ref")]
        target: UiRef,
        /// Override of the default assertion timeout
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Wait until the element is not visible
    AssertNotVisible {
        /// Element
        #[serde(rename = "ref")]
        target: UiRef,
        /// Override of the default assertion timeout
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Click or type into an element
    Interact {
        /// Element
        #[serde(rename = "ref")]
        target: UiRef,
        /// Action
        action: Interaction,
    },
    /// Save a screenshot and HTML snapshot
    Capture {
        /// Artifact label
        label: String,
    },
    /// Let the page settle
    Pause {
        /// Delay in milliseconds
        ms: u64,
    },
}

impl Step {
    /// Semantic label used in reports; never contains a selector or secret
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Navigate { url } => format!("navigate {url}"),
            Self::AuthenticateAs { role, method, .. } => match (role, method) {
                (Role::Teacher | Role::SuperAdmin, AuthMethod::Sso) => {
                    format!("authenticate_as {role} (sso)")
                }
                _ => format!("authenticate_as {role}"),
            },
            Self::AssertVisible { target, .. } => format!("assert_visible {target}"),
            Self::AssertNotVisible { target, .. } => format!("assert_not_visible {target}"),
            Self::Interact {
                target,
                action: Interaction::Click,
            } => format!("click {target}"),
            Self::Interact {
                target,
                action: Interaction::Fill { .. },
            } => format!("fill {target}"),
            Self::Capture { label } => format!("capture {label}"),
            Self::Pause { ms } => format!("pause {ms}ms"),
        }
    }

    /// Element the step targets
    #[must_use]
    pub const fn target(&self) -> Option<&UiRef> {
        match self {
            Self::AssertVisible { target, .. }
            | Self::AssertNotVisible { target, .. }
            | Self::Interact { target, .. } => Some(target),
            _ => None,
        }
    }

}

/// A named, ordered list of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Role the session must hold when the scenario ends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Role>,
    /// Steps, run in order
    pub steps: Vec<Step>,
    /// Informational; every scenario still gets its own browser session
    #[serde(default)]
    pub shared_fixtures: bool,
}

/// A list of scenarios in one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    /// Scenarios, in run order
    pub scenarios: Vec<Scenario>,
}

impl Scenario {
    /// Create a scenario with no steps
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            expect: None,
            steps: Vec::new(),
            shared_fixtures: false,
        }
    }

    /// Set the expected final role
    #[must_use]
    pub const fn expecting(mut self, role: Role) -> Self {
        self.expect = Some(role);
        self
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse and validate a single scenario
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed or the scenario is invalid
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Self =
            serde_yaml_ng::from_str(yaml).map_err(|e| ScenarioError::ParseError(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_yaml(&self) -> Result<String, ScenarioError> {
        serde_yaml_ng::to_string(self).map_err(|e| ScenarioError::ParseError(e.to_string()))
    }

    /// Check structural constraints
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(ScenarioError::NoSteps {
                scenario: self.name.clone(),
            });
        }
        for (index, step) in self.steps.iter().enumerate() {
            self.validate_step(index, step)?;
        }
        Ok(())
    }

    fn validate_step(&self, index: usize, step: &Step) -> Result<(), ScenarioError> {
        let at = |reason: String| ScenarioError::InvalidStep {
            scenario: self.name.clone(),
            index,
            reason,
        };

        if let Some(target) = step.target() {
            if !target.is_well_formed() {
                return Err(at(format!("'{target}' is not a kebab-case reference")));
            }
        }
        match step {
            Step::Navigate { url } if url.trim().is_empty() => Err(at("empty url".to_string())),
            Step::AssertVisible {
                timeout_ms: Some(0),
                ..
            }
            | Step::AssertNotVisible {
                timeout_ms: Some(0),
                ..
            } => Err(at("timeout_ms must be positive".to_string())),
            Step::Capture { label } if label.trim().is_empty() => {
                Err(at("capture label is empty".to_string()))
            }
            Step::Pause { ms } if *ms > MAX_PAUSE_MS => {
                Err(at(format!("pause exceeds {MAX_PAUSE_MS}ms")))
            }
            Step::AuthenticateAs {
                role,
                method,
                username,
                password,
            } => match (role, method) {
                (Role::Student, _) if username.is_none() => {
                    Err(at("student login needs a username".to_string()))
                }
                (Role::Teacher | Role::SuperAdmin, AuthMethod::Manual)
                    if username.is_none() || password.is_none() =>
                {
                    Err(at(format!("{role} manual login needs username and password")))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// References used by the scenario that `table` does not know
    #[must_use]
    pub fn unknown_refs(&self, table: &SelectorTable) -> Vec<UiRef> {
        let mut missing: Vec<UiRef> = self
            .steps
            .iter()
            .filter_map(Step::target)
            .filter(|target| !table.contains(target))
            .cloned()
            .collect();
        missing.dedup();
        missing
    }

    /// Filesystem-safe name used for artifact directories
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes
#[must_use]
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

/// Parse a YAML document holding either one scenario or a suite
///
/// # Errors
///
/// Returns error if the YAML is malformed or any scenario is invalid
pub fn parse_scenarios(yaml: &str) -> Result<Vec<Scenario>, ScenarioError> {
    let value: serde_yaml_ng::Value =
        serde_yaml_ng::from_str(yaml).map_err(|e| ScenarioError::ParseError(e.to_string()))?;
    let scenarios = if value.get("scenarios").is_some() {
        let suite: Suite =
            serde_yaml_ng::from_value(value).map_err(|e| ScenarioError::ParseError(e.to_string()))?;
        suite.scenarios
    } else {
        let scenario: Scenario =
            serde_yaml_ng::from_value(value).map_err(|e| ScenarioError::ParseError(e.to_string()))?;
        vec![scenario]
    };
    for scenario in &scenarios {
        scenario.validate()?;
    }
    check_unique_slugs(&scenarios)?;
    Ok(scenarios)
}

/// Reject scenarios whose names map to the same artifact directory
///
/// # Errors
///
/// Returns `DuplicateSlug` naming the first colliding pair
pub fn check_unique_slugs(scenarios: &[Scenario]) -> Result<(), ScenarioError> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(scenarios.len());
    for scenario in scenarios {
        let slug = scenario.slug();
        if let Some(first) = seen.get(&slug) {
            return Err(ScenarioError::DuplicateSlug {
                first: (*first).to_string(),
                second: scenario.name.clone(),
                slug,
            });
        }
        seen.insert(slug, &scenario.name);
    }
    Ok(())
}

/// Load scenarios from a YAML file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>, ComprobarError> {
    let yaml = std::fs::read_to_string(path)?;
    parse_scenarios(&yaml)
        .map_err(|e| ComprobarError::invalid_scenario(format!("{}: {e}", path.display())))
}

fn placeholder_pattern() -> Result<&'static Regex, ScenarioError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ScenarioError::ParseError(e.to_string()))?;
    Ok(PATTERN.get_or_init(|| pattern))
}

/// Values for `${NAME}` placeholders.
///
/// Explicit values win over the process environment.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, String>,
    use_env: bool,
}

impl Variables {
    /// Explicit values only
    #[must_use]
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values,
            use_env: false,
        }
    }

    /// Fall back to environment variables for names without a value
    #[must_use]
    pub const fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Value for a name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .cloned()
            .or_else(|| self.use_env.then(|| std::env::var(name).ok()).flatten())
    }

    /// Replace every `${NAME}` in `input`
    ///
    /// # Errors
    ///
    /// Returns `UndefinedVariable` for names with no value
    pub fn substitute(&self, input: &str) -> Result<String, ScenarioError> {
        let pattern = placeholder_pattern()?;
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in pattern.captures_iter(input) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = self
                .get(name.as_str())
                .ok_or_else(|| ScenarioError::UndefinedVariable(name.as_str().to_string()))?;
            out.push_str(&input[last..whole.start()]);
            out.push_str(&value);
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }
}

/// Errors that can occur during scenario parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error("Failed to parse YAML: {0}")]
    ParseError(String),

    #[error("Scenario name cannot be empty")]
    EmptyName,

    #[error("Scenario '{scenario}' has no steps")]
    NoSteps { scenario: String },

    #[error("Scenario '{scenario}' step {index}: {reason}")]
    InvalidStep {
        scenario: String,
        index: usize,
        reason: String,
    },

    #[error("Undefined variable ${{{0}}}")]
    UndefinedVariable(String),

    #[error("Scenarios '{first}' and '{second}' share the artifact directory '{slug}'")]
    DuplicateSlug {
        first: String,
        second: String,
        slug: String,
    },
}

impl From<ScenarioError> for ComprobarError {
    fn from(err: ScenarioError) -> Self {
        Self::invalid_scenario(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPERADMIN_SCENARIO: &str = r#"
name: superadmin dashboard
description: SuperAdmin reaches the admin panel
expect: superadmin
steps:
  - kind: navigate
    url: /
  - kind: authenticate_as
    role: superadmin
    username: superadmin
    password: ${ADMIN_PASSWORD}
  - kind: assert_visible
    ref: admin-panel-heading
    timeout_ms: 8000
  - kind: interact
    ref: history-tab
    action: { type: click }
  - kind: interact
    ref: history-search
    action: { type: fill, text: nonexistentbook12345 }
  - kind: pause
    ms: 500
  - kind: capture
    label: history
"#;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_single() {
            let scenario = Scenario::from_yaml(SUPERADMIN_SCENARIO).unwrap();
            assert_eq!(scenario.name, "superadmin dashboard");
            assert_eq!(scenario.expect, Some(Role::SuperAdmin));
            assert_eq!(scenario.steps.len(), 7);
            assert!(!scenario.shared_fixtures);
            assert_eq!(
                scenario.steps[1],
                Step::AuthenticateAs {
                    role: Role::SuperAdmin,
                    method: AuthMethod::Manual,
                    username: Some("superadmin".to_string()),
                    password: Some("${ADMIN_PASSWORD}".to_string()),
                }
            );
            assert_eq!(
                scenario.steps[4],
                Step::Interact {
                    target: UiRef::new("history-search"),
                    action: Interaction::Fill {
                        text: "nonexistentbook12345".to_string()
                    },
                }
            );
        }

        #[test]
        fn test_parse_suite() {
            let yaml = r#"
scenarios:
  - name: landing
    expect: anonymous
    steps:
      - kind: navigate
        url: /
      - kind: assert_visible
        ref: teacher-entry
  - name: sso only
    steps:
      - kind: navigate
        url: /
      - kind: authenticate_as
        role: teacher
        method: sso
"#;
            let scenarios = parse_scenarios(yaml).unwrap();
            assert_eq!(scenarios.len(), 2);
            assert_eq!(scenarios[1].expect, None);
        }

        #[test]
        fn test_parse_single_through_document_parser() {
            let scenarios = parse_scenarios(SUPERADMIN_SCENARIO).unwrap();
            assert_eq!(scenarios.len(), 1);
        }

        #[test]
        fn test_super_admin_alias() {
            let role: Role = serde_yaml_ng::from_str("super_admin").unwrap();
            assert_eq!(role, Role::SuperAdmin);
            assert_eq!(Role::SuperAdmin.to_string(), "superadmin");
        }

        #[test]
        fn test_unknown_kind_rejected() {
            let yaml = "name: x\nsteps:\n  - kind: hover\n    ref: logout\n";
            assert!(matches!(
                Scenario::from_yaml(yaml),
                Err(ScenarioError::ParseError(_))
            ));
        }
    }

    mod validation_tests {
        use super::*;

        fn with_step(step: Step) -> Scenario {
            Scenario::new("check").step(step)
        }

        #[test]
        fn test_empty_name() {
            let scenario = Scenario::new("  ").step(Step::Pause { ms: 1 });
            assert_eq!(scenario.validate(), Err(ScenarioError::EmptyName));
        }

        #[test]
        fn test_no_steps() {
            assert!(matches!(
                Scenario::new("empty").validate(),
                Err(ScenarioError::NoSteps { .. })
            ));
        }

        #[test]
        fn test_zero_timeout() {
            let scenario = with_step(Step::AssertVisible {
                target: UiRef::new("logout"),
                timeout_ms: Some(0),
            });
            assert!(matches!(
                scenario.validate(),
                Err(ScenarioError::InvalidStep { index: 0, .. })
            ));
        }

        #[test]
        fn test_empty_capture_label() {
            let scenario = with_step(Step::Capture {
                label: String::new(),
            });
            assert!(scenario.validate().is_err());
        }

        #[test]
        fn test_raw_selector_as_ref() {
            let scenario = with_step(Step::AssertVisible {
                target: UiRef::new("text=Entrar"),
                timeout_ms: None,
            });
            assert!(scenario.validate().is_err());
        }

        #[test]
        fn test_pause_bound() {
            assert!(with_step(Step::Pause { ms: MAX_PAUSE_MS }).validate().is_ok());
            assert!(with_step(Step::Pause { ms: MAX_PAUSE_MS + 1 })
                .validate()
                .is_err());
        }

        #[test]
        fn test_credentials_required() {
            let manual = with_step(Step::AuthenticateAs {
                role: Role::Teacher,
                method: AuthMethod::Manual,
                username: Some("profe.juan".to_string()),
                password: None,
            });
            assert!(manual.validate().is_err());

            let sso = with_step(Step::AuthenticateAs {
                role: Role::Teacher,
                method: AuthMethod::Sso,
                username: None,
                password: None,
            });
            assert!(sso.validate().is_ok());

            let student = with_step(Step::AuthenticateAs {
                role: Role::Student,
                method: AuthMethod::Sso,
                username: None,
                password: None,
            });
            assert!(student.validate().is_err());
        }

        #[test]
        fn test_unknown_refs() {
            let scenario = Scenario::new("refs")
                .step(Step::AssertVisible {
                    target: UiRef::new("logout"),
                    timeout_ms: None,
                })
                .step(Step::AssertVisible {
                    target: UiRef::new("loan-table"),
                    timeout_ms: None,
                });
            let missing = scenario.unknown_refs(&SelectorTable::library_defaults());
            assert_eq!(missing, vec![UiRef::new("loan-table")]);
        }
    }

    mod step_tests {
        use super::*;

        #[test]
        fn test_labels_hide_secrets() {
            let step = Step::AuthenticateAs {
                role: Role::SuperAdmin,
                method: AuthMethod::Manual,
                username: Some("superadmin".to_string()),
                password: Some("admin123".to_string()),
            };
            assert_eq!(step.label(), "authenticate_as superadmin");

            let fill = Step::Interact {
                target: UiRef::new("manual-password"),
                action: Interaction::Fill {
                    text: "admin123".to_string(),
                },
            };
            assert_eq!(fill.label(), "fill manual-password");
        }

        #[test]
        fn test_colliding_slugs_rejected() {
            let yaml = r"
scenarios:
  - name: Acceso profesor
    steps:
      - kind: navigate
        url: /
  - name: acceso-profesor
    steps:
      - kind: pause
        ms: 1
";
            let err = parse_scenarios(yaml).unwrap_err();
            assert_eq!(
                err,
                ScenarioError::DuplicateSlug {
                    first: "Acceso profesor".to_string(),
                    second: "acceso-profesor".to_string(),
                    slug: "acceso-profesor".to_string(),
                }
            );
        }

        #[test]
        fn test_duplicate_names_rejected() {
            let dup = Scenario::new("dup").step(Step::Pause { ms: 1 });
            assert!(check_unique_slugs(&[dup.clone(), dup]).is_err());

            let accented = Scenario::new("sesión").step(Step::Pause { ms: 1 });
            let plain = Scenario::new("sesi-n").step(Step::Pause { ms: 1 });
            assert!(check_unique_slugs(&[accented, plain]).is_err());

            let distinct = [
                Scenario::new("teacher").step(Step::Pause { ms: 1 }),
                Scenario::new("student").step(Step::Pause { ms: 1 }),
            ];
            assert!(check_unique_slugs(&distinct).is_ok());
        }

        #[test]
        fn test_slugify() {
            assert_eq!(slugify("SuperAdmin sees History!"), "superadmin-sees-history");
            assert_eq!(slugify("  --  "), "unnamed");
            assert_eq!(slugify("Panel de Administración"), "panel-de-administraci-n");
        }
    }

    mod variable_tests {
        use super::*;

        #[test]
        fn test_substitute() {
            let vars = Variables::new(HashMap::from([(
                "ADMIN_PASSWORD".to_string(),
                "admin123".to_string(),
            )]));
            assert_eq!(vars.substitute("${ADMIN_PASSWORD}").unwrap(), "admin123");
            assert_eq!(
                vars.substitute("pre-${ADMIN_PASSWORD}-post").unwrap(),
                "pre-admin123-post"
            );
            assert_eq!(vars.substitute("plain").unwrap(), "plain");
        }

        #[test]
        fn test_pattern_compiled_once() {
            let first = placeholder_pattern().unwrap();
            let second = placeholder_pattern().unwrap();
            assert!(std::ptr::eq(first, second));
            assert!(first.is_match("${TEACHER_USER}"));
            assert!(!first.is_match("$TEACHER_USER"));
        }

        #[test]
        fn test_undefined_variable() {
            let vars = Variables::default();
            assert_eq!(
                vars.substitute("${COMPROBAR_TEST_SURELY_UNSET_VAR}"),
                Err(ScenarioError::UndefinedVariable(
                    "COMPROBAR_TEST_SURELY_UNSET_VAR".to_string()
                ))
            );
        }

        #[test]
        fn test_env_fallback() {
            let vars = Variables::default().with_env();
            let path = std::env::var("PATH").unwrap_or_default();
            assert_eq!(vars.substitute("${PATH}").unwrap(), path);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn ui_ref() -> impl Strategy<Value = UiRef> {
            "[a-z][a-z0-9]{0,6}(-[a-z0-9]{1,6}){0,2}".prop_map(UiRef::new)
        }

        fn role() -> impl Strategy<Value = Role> {
            prop_oneof![
                Just(Role::Anonymous),
                Just(Role::Student),
                Just(Role::Teacher),
                Just(Role::SuperAdmin),
            ]
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                "/[a-z]{0,8}".prop_map(|url| Step::Navigate { url }),
                (role(), "[a-z.]{1,10}", "[A-Za-z0-9]{1,10}").prop_map(|(role, u, p)| {
                    Step::AuthenticateAs {
                        role,
                        method: AuthMethod::Manual,
                        username: Some(u),
                        password: Some(p),
                    }
                }),
                (ui_ref(), proptest::option::of(1u64..60_000)).prop_map(|(target, timeout_ms)| {
                    Step::AssertVisible { target, timeout_ms }
                }),
                (ui_ref(), proptest::option::of(1u64..60_000)).prop_map(|(target, timeout_ms)| {
                    Step::AssertNotVisible { target, timeout_ms }
                }),
                ui_ref().prop_map(|target| Step::Interact {
                    target,
                    action: Interaction::Click
                }),
                (ui_ref(), "[a-z0-9 ]{0,12}").prop_map(|(target, text)| Step::Interact {
                    target,
                    action: Interaction::Fill { text }
                }),
                "[a-z][a-z0-9-]{0,10}".prop_map(|label| Step::Capture { label }),
                (0u64..=MAX_PAUSE_MS).prop_map(|ms| Step::Pause { ms }),
            ]
        }

        fn scenario() -> impl Strategy<Value = Scenario> {
            (
                "[a-z][a-z0-9 ]{0,20}[a-z]",
                proptest::option::of("[a-z ]{1,20}"),
                proptest::option::of(role()),
                proptest::collection::vec(step(), 1..8),
                any::<bool>(),
            )
                .prop_map(|(name, description, expect, steps, shared_fixtures)| Scenario {
                    name,
                    description,
                    expect,
                    steps,
                    shared_fixtures,
                })
        }

        proptest! {
            #[test]
            fn prop_yaml_round_trip(scenario in scenario()) {
                let yaml = scenario.to_yaml().unwrap();
                let parsed = Scenario::from_yaml(&yaml).unwrap();
                prop_assert_eq!(parsed, scenario);
            }

            #[test]
            fn prop_slug_is_safe(name in ".{0,40}") {
                let slug = slugify(&name);
                prop_assert!(!slug.is_empty());
                prop_assert!(slug.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'));
                prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            }
        }
    }
}
