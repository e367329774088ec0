//! Scripted in-memory driver.
//!
//! [`MockDriver`] models a single-page application as a set of named views,
//! each a flat list of [`MockElement`]s. Clicking an element can switch the
//! view or submit a credential form; submissions are checked against a list
//! of [`MockAccount`]s. Faults and latency can be injected per driver method.
//!
//! [`MockDriver::school_library`] scripts the library application the
//! default selector table describes.

use crate::driver::{ArtifactRef, BoundingBox, Driver, ElementSnapshot};
use crate::result::{ComprobarError, ComprobarResult};
use crate::selector::Selector;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// PNG signature written at the start of mock screenshots
pub const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// What happens when a mock element is clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    /// Switch to another view
    ShowView(String),
    /// Check credentials typed into the current view
    Submit {
        /// Field holding the username
        username_field: String,
        /// Field holding the password, if the form has one
        password_field: Option<String>,
        /// View shown when no account matches
        on_reject: String,
    },
}

/// One element of a mock view
#[derive(Debug, Clone, PartialEq)]
pub struct MockElement {
    /// Tag name
    pub tag: String,
    /// Text content
    pub text: String,
    /// Placeholder attribute
    pub placeholder: Option<String>,
    /// Explicit ARIA role
    pub role: Option<String>,
    /// aria-label / title
    pub label: Option<String>,
    /// data-testid attribute
    pub test_id: Option<String>,
    /// href attribute
    pub href: Option<String>,
    /// Extra CSS selectors this element answers to
    pub css: Vec<String>,
    /// Input name for `fill`
    pub field: Option<String>,
    /// False for `display:none`
    pub displayed: bool,
    /// Rendered size
    pub size: (f32, f32),
    /// Only attached once the view has been shown this long
    pub appear_after: Option<Duration>,
    /// Click behavior
    pub on_click: Option<ClickEffect>,
}

impl MockElement {
    /// Create an element with text
    #[must_use]
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
            placeholder: None,
            role: None,
            label: None,
            test_id: None,
            href: None,
            css: Vec::new(),
            field: None,
            displayed: true,
            size: (120.0, 32.0),
            appear_after: None,
            on_click: None,
        }
    }

    /// A `<button>`
    #[must_use]
    pub fn button(text: impl Into<String>) -> Self {
        Self::new("button", text)
    }

    /// A submit `<button>` inside a form
    #[must_use]
    pub fn submit(text: impl Into<String>) -> Self {
        Self::new("button", text).with_css("form button[type='submit']")
    }

    /// An `<h1>`
    #[must_use]
    pub fn heading(text: impl Into<String>) -> Self {
        Self::new("h1", text)
    }

    /// A text `<input>`
    #[must_use]
    pub fn input(field: impl Into<String>, placeholder: impl Into<String>) -> Self {
        let mut element = Self::new("input", "").with_css("form input[type='text']");
        element.field = Some(field.into());
        element.placeholder = Some(placeholder.into());
        element
    }

    /// A password `<input>`
    #[must_use]
    pub fn password(field: impl Into<String>, placeholder: impl Into<String>) -> Self {
        let mut element = Self::new("input", "").with_css("form input[type='password']");
        element.field = Some(field.into());
        element.placeholder = Some(placeholder.into());
        element
    }

    /// An `<a href>` with a title
    #[must_use]
    pub fn link(href: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        let mut element = Self::new("a", "").with_css(format!("a[title='{title}']"));
        element.href = Some(href.into());
        element.label = Some(title);
        element.size = (40.0, 40.0);
        element
    }

    /// Answer to an extra CSS selector
    #[must_use]
    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css.push(css.into());
        self
    }

    /// Set an explicit ARIA role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set data-testid
    #[must_use]
    pub fn with_test_id(mut self, id: impl Into<String>) -> Self {
        self.test_id = Some(id.into());
        self
    }

    /// Attach a click effect
    #[must_use]
    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = Some(effect);
        self
    }

    /// Switch to `view` when clicked
    #[must_use]
    pub fn shows(self, view: impl Into<String>) -> Self {
        self.on_click(ClickEffect::ShowView(view.into()))
    }

    /// Attached but not displayed
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Attached with a zero-size box
    #[must_use]
    pub const fn collapsed(mut self) -> Self {
        self.size = (0.0, 0.0);
        self
    }

    /// Attach only after the view has been shown for `delay`
    #[must_use]
    pub const fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = Some(delay);
        self
    }

    fn implicit_role(&self) -> Option<&str> {
        if let Some(role) = &self.role {
            return Some(role);
        }
        match self.tag.as_str() {
            "button" => Some("button"),
            "a" if self.href.is_some() => Some("link"),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some("heading"),
            "input" | "textarea" => Some("textbox"),
            _ => None,
        }
    }

    fn accessible_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.text)
    }

    fn matches_css(&self, css: &str) -> bool {
        self.tag == css || self.css.iter().any(|c| c == css)
    }

    /// Whether `selector` matches this element
    #[must_use]
    pub fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Text { text, exact: false } => self.text.contains(text.as_str()),
            Selector::Text { text, exact: true } => self.text.trim() == text,
            Selector::Placeholder { text } => self.placeholder.as_deref() == Some(text.as_str()),
            Selector::Role { role, name } => {
                self.implicit_role() == Some(role.as_str())
                    && self.accessible_name().trim().contains(name.as_str())
            }
            Selector::Css { css } => self.matches_css(css),
            Selector::CssWithText { css, text } => {
                self.matches_css(css) && self.text.contains(text.as_str())
            }
            Selector::TestId { id } => self.test_id.as_deref() == Some(id.as_str()),
            Selector::Link { href } => {
                self.tag == "a" && self.href.as_deref() == Some(href.as_str())
            }
        }
    }

    fn snapshot(&self) -> ElementSnapshot {
        let mut snapshot = ElementSnapshot::new(&self.tag)
            .with_bounding_box(BoundingBox::new(0.0, 0.0, self.size.0, self.size.1))
            .with_displayed(self.displayed);
        if !self.text.is_empty() {
            snapshot = snapshot.with_text(&self.text);
        }
        snapshot
    }

    fn to_html(&self, value: Option<&str>) -> String {
        let mut attrs = String::new();
        if let Some(placeholder) = &self.placeholder {
            let _ = write!(attrs, " placeholder=\"{}\"", escape(placeholder));
        }
        if let Some(href) = &self.href {
            let _ = write!(attrs, " href=\"{}\"", escape(href));
        }
        if let Some(label) = &self.label {
            let _ = write!(attrs, " title=\"{}\"", escape(label));
        }
        if let Some(id) = &self.test_id {
            let _ = write!(attrs, " data-testid=\"{}\"", escape(id));
        }
        if let Some(value) = value {
            let _ = write!(attrs, " value=\"{}\"", escape(value));
        }
        if !self.displayed {
            attrs.push_str(" style=\"display:none\"");
        }
        format!("<{tag}{attrs}>{text}</{tag}>", tag = self.tag, text = escape(&self.text))
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Account accepted by a mock `Submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockAccount {
    /// Username
    pub username: String,
    /// Password; `None` for password-less (student) accounts
    pub password: Option<String>,
    /// View shown after a successful login
    pub view: String,
}

impl MockAccount {
    /// Account with a password
    #[must_use]
    pub fn with_password(
        username: impl Into<String>,
        password: impl Into<String>,
        view: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            view: view.into(),
        }
    }

    /// Password-less account
    #[must_use]
    pub fn name_only(username: impl Into<String>, view: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            view: view.into(),
        }
    }
}

/// Mock driver for unit testing
#[derive(Debug)]
pub struct MockDriver {
    views: HashMap<String, Vec<MockElement>>,
    routes: HashMap<String, String>,
    landing: String,
    current_view: String,
    view_entered: Instant,
    current_url: String,
    values: HashMap<String, String>,
    accounts: Vec<MockAccount>,
    faults: HashSet<String>,
    latency: HashMap<String, Duration>,
    closed: Arc<AtomicUsize>,
    /// Call history for verification
    pub call_history: Vec<String>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a driver with a single empty `landing` view
    #[must_use]
    pub fn new() -> Self {
        let mut views = HashMap::new();
        views.insert("landing".to_string(), Vec::new());
        Self {
            views,
            routes: HashMap::new(),
            landing: "landing".to_string(),
            current_view: "landing".to_string(),
            view_entered: Instant::now(),
            current_url: "about:blank".to_string(),
            values: HashMap::new(),
            accounts: Vec::new(),
            faults: HashSet::new(),
            latency: HashMap::new(),
            closed: Arc::new(AtomicUsize::new(0)),
            call_history: Vec::new(),
        }
    }

    /// Add or replace a view
    #[must_use]
    pub fn with_view(mut self, name: impl Into<String>, elements: Vec<MockElement>) -> Self {
        self.views.insert(name.into(), elements);
        self
    }

    /// View shown after navigating to an unrouted URL
    #[must_use]
    pub fn with_landing(mut self, view: impl Into<String>) -> Self {
        self.landing = view.into();
        self.current_view.clone_from(&self.landing);
        self
    }

    /// View shown after navigating to a URL whose path ends with `suffix`
    #[must_use]
    pub fn with_route(mut self, suffix: impl Into<String>, view: impl Into<String>) -> Self {
        self.routes.insert(suffix.into(), view.into());
        self
    }

    /// Accept an account on submit
    #[must_use]
    pub fn with_account(mut self, account: MockAccount) -> Self {
        self.accounts.push(account);
        self
    }

    /// Fail every call to `method` (`"*"` for all methods) with a transport fault
    #[must_use]
    pub fn with_fault(mut self, method: impl Into<String>) -> Self {
        self.faults.insert(method.into());
        self
    }

    /// Delay every call to `method` (`"*"` for all methods)
    #[must_use]
    pub fn with_latency(mut self, method: impl Into<String>, delay: Duration) -> Self {
        self.latency.insert(method.into(), delay);
        self
    }

    /// Start failing calls to `method` from now on
    pub fn inject_fault(&mut self, method: impl Into<String>) {
        self.faults.insert(method.into());
    }

    /// Name of the view currently shown
    #[must_use]
    pub fn current_view(&self) -> &str {
        &self.current_view
    }

    /// Value typed into a field
    #[must_use]
    pub fn field_value(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Shared counter of `close` calls, observable after the driver is moved
    #[must_use]
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closed)
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.call_history
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history.iter().any(|c| c.starts_with(method))
    }

    async fn enter(&self, method: &str) -> ComprobarResult<()> {
        let delay = self
            .latency
            .get(method)
            .or_else(|| self.latency.get("*"))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.contains(method) || self.faults.contains("*") {
            return Err(ComprobarError::transport(format!(
                "mock {method} fault injected"
            )));
        }
        Ok(())
    }

    fn show(&mut self, view: &str) {
        self.current_view = view.to_string();
        self.view_entered = Instant::now();
    }

    fn present(&self) -> impl Iterator<Item = &MockElement> {
        let shown_for = self.view_entered.elapsed();
        self.views
            .get(&self.current_view)
            .into_iter()
            .flatten()
            .filter(move |el| el.appear_after.map_or(true, |delay| shown_for >= delay))
    }

    fn find(&self, selector: &Selector) -> Option<&MockElement> {
        self.present().find(|el| el.matches(selector))
    }

    fn submit(
        &mut self,
        username_field: &str,
        password_field: Option<&str>,
        on_reject: &str,
    ) {
        let username = self.values.get(username_field).cloned().unwrap_or_default();
        let password = password_field.and_then(|field| self.values.get(field).cloned());
        let target = self
            .accounts
            .iter()
            .find(|account| account.username == username && account.password == password)
            .map_or_else(|| on_reject.to_string(), |account| account.view.clone());
        self.show(&target);
    }

    /// The school library application.
    ///
    /// Accounts: `superadmin` / `admin123`, `profe.juan` / `profe123`, and the
    /// student `juan.garcia`.
    #[must_use]
    pub fn school_library() -> Self {
        let prisma = || MockElement::link("https://prisma.bibliohispa.es/", "Volver a Prisma");
        let entries = || {
            vec![
                prisma(),
                MockElement::heading("Biblioteca"),
                MockElement::button("ACCESO ALUMNOS").shows("student-form"),
                MockElement::button("ACCESO PROFESORES").shows("role-picker"),
            ]
        };
        let student_form = || {
            let mut view = entries();
            view.push(MockElement::input("student", "juan.garcia"));
            view.push(MockElement::submit("Entrar").on_click(ClickEffect::Submit {
                username_field: "student".to_string(),
                password_field: None,
                on_reject: "student-form-rejected".to_string(),
            }));
            view
        };
        let manual_form = || {
            let mut view = entries();
            view.push(MockElement::input("username", "Usuario"));
            view.push(MockElement::password("password", "••••••••"));
            view.push(MockElement::submit("Entrar").on_click(ClickEffect::Submit {
                username_field: "username".to_string(),
                password_field: Some("password".to_string()),
                on_reject: "manual-form-rejected".to_string(),
            }));
            view.push(MockElement::button("Volver a Google Login").shows("role-picker"));
            view
        };
        let rejected = |mut view: Vec<MockElement>| {
            view.push(MockElement::new("div", "Credenciales incorrectas"));
            view
        };
        let dashboard = |badge: &str, superadmin: bool, tab: Option<&str>| {
            let (dashboard, history, stats) = if superadmin {
                ("superadmin-dashboard", "superadmin-history", "superadmin-stats")
            } else {
                ("teacher-dashboard", "teacher-history", "teacher-stats")
            };
            let mut view = vec![
                MockElement::heading("Panel de Administración"),
                MockElement::new("span", badge),
            ];
            if superadmin {
                view.push(MockElement::button("Profesores").shows(dashboard));
            }
            view.push(MockElement::button("Historial").shows(history));
            view.push(MockElement::button("Estadísticas").shows(stats));
            view.push(MockElement::button("Cerrar Sesión").shows("landing"));
            match tab {
                Some("history") => {
                    view.push(MockElement::button("Global"));
                    view.push(MockElement::button("Mi Clase"));
                    view.push(MockElement::input("history-search", "Buscar por libro o alumno..."));
                }
                Some("stats") => {
                    view.push(MockElement::button("Global"));
                    view.push(MockElement::button("Mi Clase"));
                }
                _ => {}
            }
            view
        };
        let student_home = vec![
            prisma(),
            MockElement::button("Catálogo"),
            MockElement::button("Mis Libros"),
            MockElement::button("Historial"),
            MockElement::button("Salir").shows("landing"),
        ];

        Self::new()
            .with_view("landing", entries())
            .with_view("student-form", student_form())
            .with_view("student-form-rejected", rejected(student_form()))
            .with_view(
                "role-picker",
                {
                    let mut view = entries();
                    view.push(
                        MockElement::new("iframe", "")
                            .with_css("iframe[src*='accounts.google.com']"),
                    );
                    view.push(MockElement::button("Usar Contraseña Manual").shows("manual-form"));
                    view
                },
            )
            .with_view("manual-form", manual_form())
            .with_view("manual-form-rejected", rejected(manual_form()))
            .with_view("superadmin-dashboard", dashboard("SuperAdmin", true, None))
            .with_view("superadmin-history", dashboard("SuperAdmin", true, Some("history")))
            .with_view("superadmin-stats", dashboard("SuperAdmin", true, Some("stats")))
            .with_view("teacher-dashboard", dashboard("Profesor", false, None))
            .with_view("teacher-history", dashboard("Profesor", false, Some("history")))
            .with_view("teacher-stats", dashboard("Profesor", false, Some("stats")))
            .with_view("student-home", student_home)
            .with_account(MockAccount::with_password(
                "superadmin",
                "admin123",
                "superadmin-dashboard",
            ))
            .with_account(MockAccount::with_password(
                "profe.juan",
                "profe123",
                "teacher-dashboard",
            ))
            .with_account(MockAccount::name_only("juan.garcia", "student-home"))
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn navigate(&mut self, url: &str) -> ComprobarResult<()> {
        self.call_history.push(format!("navigate:{url}"));
        self.enter("navigate").await?;
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let view = self
            .routes
            .iter()
            .find(|(suffix, _)| path.ends_with(suffix.as_str()))
            .map_or_else(|| self.landing.clone(), |(_, view)| view.clone());
        self.current_url = url.to_string();
        self.values.clear();
        self.show(&view);
        Ok(())
    }

    async fn click(&mut self, selector: &Selector) -> ComprobarResult<()> {
        self.call_history.push(format!("click:{selector}"));
        self.enter("click").await?;
        let effect = match self.find(selector) {
            Some(el) if el.displayed => el.on_click.clone(),
            _ => {
                return Err(ComprobarError::ElementNotFound {
                    selector: selector.to_string(),
                })
            }
        };
        match effect {
            Some(ClickEffect::ShowView(view)) => self.show(&view),
            Some(ClickEffect::Submit {
                username_field,
                password_field,
                on_reject,
            }) => self.submit(&username_field, password_field.as_deref(), &on_reject),
            None => {}
        }
        Ok(())
    }

    async fn fill(&mut self, selector: &Selector, text: &str) -> ComprobarResult<()> {
        self.call_history.push(format!("fill:{selector}"));
        self.enter("fill").await?;
        let field = match self.find(selector) {
            Some(el) => el.field.clone(),
            None => {
                return Err(ComprobarError::ElementNotFound {
                    selector: selector.to_string(),
                })
            }
        };
        let field = field.ok_or_else(|| ComprobarError::InvalidState {
            message: format!("{selector} is not an input"),
        })?;
        self.values.insert(field, text.to_string());
        Ok(())
    }

    async fn query(&self, selector: &Selector) -> ComprobarResult<Option<ElementSnapshot>> {
        self.enter("query").await?;
        Ok(self.find(selector).map(MockElement::snapshot))
    }

    async fn screenshot(&mut self, path: &Path) -> ComprobarResult<ArtifactRef> {
        self.call_history.push(format!("screenshot:{}", path.display()));
        self.enter("screenshot").await?;
        let mut data = PNG_MAGIC.to_vec();
        data.extend_from_slice(self.current_view.as_bytes());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(ArtifactRef::screenshot(path))
    }

    async fn content(&self) -> ComprobarResult<String> {
        self.enter("content").await?;
        let mut body = String::new();
        for el in self.present() {
            let value = el
                .field
                .as_deref()
                .and_then(|field| self.values.get(field))
                .map(String::as_str);
            body.push_str(&el.to_html(value));
            body.push('\n');
        }
        Ok(format!(
            "<html><body data-view=\"{}\">\n{body}</body></html>",
            escape(&self.current_view)
        ))
    }

    async fn current_url(&self) -> ComprobarResult<String> {
        self.enter("current_url").await?;
        Ok(self.current_url.clone())
    }

    async fn close(&mut self) -> ComprobarResult<()> {
        self.call_history.push("close".to_string());
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.enter("close").await
    }
}
