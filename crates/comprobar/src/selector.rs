//! Selector resolution: semantic UI references to concrete selectors.
//!
//! Scenarios name UI elements by [`UiRef`] (`teacher-entry`, `manual-submit`,
//! ...). A [`SelectorTable`] maps each ref to an ordered list of fallback
//! [`Selector`] strategies; the [`SelectorResolver`] turns a ref into an
//! element on the live page by probing those strategies in order.
//!
//! The table is data. The built-in defaults describe the school library
//! application; YAML override tables are merged over them.

use crate::driver::{Driver, ElementSnapshot, WaitCondition};
use crate::result::{ComprobarError, ComprobarResult, FailureKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Default per-strategy existence probe (500ms)
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;

/// Semantic identifier for a UI element.
///
/// Always a name from the selector table, never a raw selector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiRef(String);

impl UiRef {
    /// Create a reference
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Reference name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase kebab-case: `[a-z0-9]+(-[a-z0-9]+)*`
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .split('-')
                .all(|part| {
                    !part.is_empty()
                        && part
                            .bytes()
                            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
                })
    }
}

impl fmt::Display for UiRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UiRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Concrete strategy for locating an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Selector {
    /// Innermost element whose text contains (or equals) `text`
    Text {
        /// Text to match
        text: String,
        /// Require the trimmed text to equal `text`
        #[serde(default)]
        exact: bool,
    },
    /// Input whose placeholder equals `text`
    Placeholder {
        /// Placeholder text
        text: String,
    },
    /// Element with an ARIA role and accessible name
    Role {
        /// ARIA role (`button`, `heading`, `link`, ...)
        role: String,
        /// Accessible name (aria-label or text)
        name: String,
    },
    /// CSS selector (e.g., "button.primary")
    Css {
        /// CSS selector
        css: String,
    },
    /// CSS selector filtered by text content
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
    /// Test ID selector (data-testid attribute)
    TestId {
        /// Test id
        id: String,
    },
    /// Anchor with an exact `href`
    Link {
        /// Link target
        href: String,
    },
}

impl Selector {
    /// Create a substring text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: false,
        }
    }

    /// Create an exact text selector
    #[must_use]
    pub fn exact_text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: true,
        }
    }

    /// Create a placeholder selector
    #[must_use]
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::Placeholder { text: text.into() }
    }

    /// Create a role selector
    #[must_use]
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    /// Create a CSS selector
    #[must_use]
    pub fn css(css: impl Into<String>) -> Self {
        Self::Css { css: css.into() }
    }

    /// Create a CSS selector with a text filter
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId { id: id.into() }
    }

    /// Create a link selector
    #[must_use]
    pub fn link(href: impl Into<String>) -> Self {
        Self::Link { href: href.into() }
    }

    /// CSS matching the elements that carry an ARIA role implicitly or explicitly
    #[must_use]
    pub fn role_css(role: &str) -> String {
        match role {
            "button" => "button, [role=\"button\"], input[type=\"submit\"]".to_string(),
            "link" => "a[href], [role=\"link\"]".to_string(),
            "heading" => "h1, h2, h3, h4, h5, h6, [role=\"heading\"]".to_string(),
            "textbox" => "input:not([type]), input[type=\"text\"], textarea, [role=\"textbox\"]".to_string(),
            other => format!("[role={other:?}]"),
        }
    }

    /// Convert to a JavaScript expression evaluating to the element or `undefined`
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::Text { text, exact: false } => format!(
                "Array.from(document.querySelectorAll('body *')).find(el => el.textContent.includes({text:?}) && !Array.from(el.children).some(c => c.textContent.includes({text:?})))"
            ),
            Self::Text { text, exact: true } => format!(
                "Array.from(document.querySelectorAll('body *')).find(el => el.textContent.trim() === {text:?} && !Array.from(el.children).some(c => c.textContent.trim() === {text:?}))"
            ),
            Self::Placeholder { text } => format!(
                "Array.from(document.querySelectorAll('[placeholder]')).find(el => el.getAttribute('placeholder') === {text:?})"
            ),
            Self::Role { role, name } => {
                let css = Self::role_css(role);
                format!(
                    "Array.from(document.querySelectorAll({css:?})).find(el => (el.getAttribute('aria-label') || el.textContent || el.value || '').trim().includes({name:?}))"
                )
            }
            Self::Css { css } => format!("document.querySelector({css:?})"),
            Self::CssWithText { css, text } => format!(
                "Array.from(document.querySelectorAll({css:?})).find(el => el.textContent.includes({text:?}))"
            ),
            Self::TestId { id } => {
                let css = format!("[data-testid={id:?}]");
                format!("document.querySelector({css:?})")
            }
            Self::Link { href } => format!(
                "Array.from(document.querySelectorAll('a[href]')).find(el => el.getAttribute('href') === {href:?})"
            ),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text, exact: false } => write!(f, "text={text}"),
            Self::Text { text, exact: true } => write!(f, "text=\"{text}\""),
            Self::Placeholder { text } => write!(f, "placeholder={text}"),
            Self::Role { role, name } => write!(f, "role={role}[name={name}]"),
            Self::Css { css } => write!(f, "css={css}"),
            Self::CssWithText { css, text } => write!(f, "css={css}:has-text({text})"),
            Self::TestId { id } => write!(f, "testid={id}"),
            Self::Link { href } => write!(f, "link={href}"),
        }
    }
}

/// Ordered fallback strategies for each known UI reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorTable {
    refs: BTreeMap<UiRef, Vec<Selector>>,
}

impl SelectorTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in table for the school library application
    #[must_use]
    pub fn library_defaults() -> Self {
        let mut table = Self::new();
        table
            .with("teacher-entry", [
                Selector::text("ACCESO PROFESORES"),
                Selector::role("button", "PROFESORES"),
            ])
            .with("student-entry", [
                Selector::text("ACCESO ALUMNOS"),
                Selector::role("button", "ALUMNOS"),
            ])
            .with("manual-login-toggle", [
                Selector::text("Usar Contraseña Manual"),
                Selector::css_with_text("button", "Contraseña Manual"),
            ])
            .with("sso-button", [
                Selector::css("iframe[src*='accounts.google.com']"),
                Selector::css("div[role='button'][aria-labelledby]"),
            ])
            .with("manual-username", [
                Selector::placeholder("Usuario"),
                Selector::css("form input[type='text']"),
            ])
            .with("manual-password", [
                Selector::placeholder("••••••••"),
                Selector::css("form input[type='password']"),
            ])
            .with("manual-submit", [
                Selector::role("button", "Entrar"),
                Selector::css("form button[type='submit']"),
            ])
            .with("student-username", [
                Selector::placeholder("juan.garcia"),
                Selector::css("form input[type='text']"),
            ])
            .with("student-submit", [
                Selector::role("button", "Entrar"),
                Selector::css("form button[type='submit']"),
            ])
            .with("login-error", [Selector::text("Credenciales incorrectas")])
            .with("admin-panel-heading", [
                Selector::role("heading", "Panel de Administración"),
                Selector::text("Panel de Administración"),
            ])
            .with("superadmin-marker", [Selector::exact_text("SuperAdmin")])
            .with("teacher-marker", [Selector::exact_text("Profesor")])
            .with("student-marker", [
                Selector::role("button", "Mis Libros"),
                Selector::text("Mis Libros"),
            ])
            .with("logout", [
                Selector::role("button", "Cerrar Sesión"),
                Selector::role("button", "Salir"),
            ])
            .with("back-to-prisma", [
                Selector::link("https://prisma.bibliohispa.es/"),
                Selector::css("a[title='Volver a Prisma']"),
            ])
            .with("history-tab", [
                Selector::role("button", "Historial"),
                Selector::text("Historial"),
            ])
            .with("stats-tab", [
                Selector::role("button", "Estadísticas"),
                Selector::text("Estadísticas"),
            ])
            .with("global-toggle", [
                Selector::role("button", "Global"),
                Selector::exact_text("Global"),
            ])
            .with("my-class-toggle", [
                Selector::role("button", "Mi Clase"),
                Selector::exact_text("Mi Clase"),
            ])
            .with("history-search", [
                Selector::placeholder("Buscar por libro o alumno..."),
                Selector::placeholder("Buscar por alumno o libro..."),
            ]);
        table
    }

    fn with<const N: usize>(&mut self, name: &str, strategies: [Selector; N]) -> &mut Self {
        self.insert(UiRef::new(name), strategies.to_vec());
        self
    }

    /// Insert or replace the strategies for a reference
    pub fn insert(&mut self, ui_ref: UiRef, strategies: Vec<Selector>) {
        self.refs.insert(ui_ref, strategies);
    }

    /// Strategies for a reference
    #[must_use]
    pub fn get(&self, ui_ref: &UiRef) -> Option<&[Selector]> {
        self.refs.get(ui_ref).map(Vec::as_slice)
    }

    /// Whether the table knows a reference
    #[must_use]
    pub fn contains(&self, ui_ref: &UiRef) -> bool {
        self.refs.contains_key(ui_ref)
    }

    /// Number of references
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Iterate references in name order
    pub fn iter(&self) -> impl Iterator<Item = (&UiRef, &[Selector])> {
        self.refs.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Merge `overrides` over this table; an override replaces the whole entry
    pub fn merge(&mut self, overrides: Self) {
        for (ui_ref, strategies) in overrides.refs {
            self.refs.insert(ui_ref, strategies);
        }
    }

    /// Parse an override table (`refs: { name: [strategy, ...] }`)
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed, a name is not kebab-case, or
    /// an entry has no strategies.
    pub fn from_yaml(yaml: &str) -> ComprobarResult<Self> {
        let table: Self = serde_yaml_ng::from_str(yaml)?;
        table.validate()?;
        Ok(table)
    }

    /// Load an override table from a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_yaml_file(path: &Path) -> ComprobarResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Serialize the table to YAML
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_yaml(&self) -> ComprobarResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    fn validate(&self) -> ComprobarResult<()> {
        for (ui_ref, strategies) in &self.refs {
            if !ui_ref.is_well_formed() {
                return Err(ComprobarError::config(format!(
                    "selector table ref '{ui_ref}' is not kebab-case"
                )));
            }
            if strategies.is_empty() {
                return Err(ComprobarError::config(format!(
                    "selector table ref '{ui_ref}' has no strategies"
                )));
            }
        }
        Ok(())
    }
}

/// Why a reference could not be turned into an element
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every strategy was tried (or the ref is unknown) without a match
    #[error("element not resolved for '{ui_ref}' ({attempts} strategies tried)")]
    NotResolved {
        /// The reference
        ui_ref: UiRef,
        /// Strategies probed before giving up
        attempts: usize,
    },
    /// Driver failed while probing
    #[error(transparent)]
    Driver(#[from] ComprobarError),
}

impl ResolveError {
    /// Step-level failure kind for this error
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NotResolved { .. } => FailureKind::ElementNotResolved,
            Self::Driver(err) => err.failure_kind(),
        }
    }
}

/// A reference resolved to an attached element
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    /// Strategy that matched
    pub selector: Selector,
    /// Position of that strategy in the table entry
    pub strategy_index: usize,
    /// Element as the driver saw it
    pub element: ElementSnapshot,
}

/// Resolves semantic references against a selector table
#[derive(Debug, Clone)]
pub struct SelectorResolver {
    table: SelectorTable,
    probe_timeout: Duration,
}

impl Default for SelectorResolver {
    fn default() -> Self {
        Self::new(SelectorTable::library_defaults())
    }
}

impl SelectorResolver {
    /// Create a resolver over a table
    #[must_use]
    pub const fn new(table: SelectorTable) -> Self {
        Self {
            table,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        }
    }

    /// Set the per-strategy probe timeout
    #[must_use]
    pub const fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// The underlying table
    #[must_use]
    pub const fn table(&self) -> &SelectorTable {
        &self.table
    }

    /// Table lookup without touching the driver
    ///
    /// # Errors
    ///
    /// Returns `NotResolved` for references missing from the table
    pub fn resolve(&self, ui_ref: &UiRef) -> Result<&[Selector], ResolveError> {
        self.table.get(ui_ref).ok_or_else(|| ResolveError::NotResolved {
            ui_ref: ui_ref.clone(),
            attempts: 0,
        })
    }

    /// Find an attached element for `ui_ref`.
    ///
    /// Strategies are probed in table order, each for at most the probe
    /// timeout, and the whole search never exceeds `budget`.
    ///
    /// # Errors
    ///
    /// `NotResolved` when no strategy matches within the budget, `Driver`
    /// when the driver faults while probing.
    pub async fn locate(
        &self,
        driver: &dyn Driver,
        ui_ref: &UiRef,
        budget: Duration,
    ) -> Result<Located, ResolveError> {
        let strategies = self.resolve(ui_ref)?;
        let start = tokio::time::Instant::now();
        let mut attempts = 0;

        for (strategy_index, selector) in strategies.iter().enumerate() {
            let remaining = budget.saturating_sub(start.elapsed());
            if attempts > 0 && remaining.is_zero() {
                break;
            }
            attempts += 1;
            let probe = self.probe_timeout.min(remaining);
            trace!(%ui_ref, %selector, probe_ms = probe.as_millis() as u64, "probing strategy");

            if driver
                .wait_for(selector, WaitCondition::Attached, probe)
                .await?
            {
                if let Some(element) = driver.query(selector).await? {
                    debug!(%ui_ref, %selector, strategy_index, "resolved");
                    return Ok(Located {
                        selector: selector.clone(),
                        strategy_index,
                        element,
                    });
                }
            }
        }

        debug!(%ui_ref, attempts, "not resolved");
        Err(ResolveError::NotResolved {
            ui_ref: ui_ref.clone(),
            attempts,
        })
    }
}
