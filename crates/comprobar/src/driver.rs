//! Driver boundary for browser automation.
//!
//! Everything above this module talks to a browser through the [`Driver`]
//! trait: navigation, clicks, typing, element queries, screenshots and page
//! content. Implementations:
//!
//! - [`crate::MockDriver`] - scripted in-memory DOM, used by tests and demos
//! - `ChromiumDriver` - real Chromium over CDP (feature `browser`)
//!
//! Selectors passed to a driver are always concrete [`Selector`]s. Semantic
//! references are turned into selectors by the resolver before they get here.

use crate::result::ComprobarResult;
use crate::selector::Selector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default polling interval for driver-level waits (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Bounding box for an element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the box covers any pixels
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// What a driver reports about an element matched by a selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Element tag name (lowercase)
    pub tag_name: String,
    /// Element text content
    pub text_content: Option<String>,
    /// Layout box, `None` when the element generates no box
    pub bounding_box: Option<BoundingBox>,
    /// False when `display:none` or `visibility:hidden` applies
    pub displayed: bool,
}

impl ElementSnapshot {
    /// Create a displayed element snapshot without layout information
    #[must_use]
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            text_content: None,
            bounding_box: None,
            displayed: true,
        }
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Set bounding box
    #[must_use]
    pub const fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }

    /// Set displayed flag
    #[must_use]
    pub const fn with_displayed(mut self, displayed: bool) -> Self {
        self.displayed = displayed;
        self
    }

    /// Attached and rendered: displayed, with a non-empty layout box
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.displayed && self.bounding_box.is_some_and(|b| b.has_area())
    }
}

/// Condition for [`Driver::wait_for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitCondition {
    /// Element is present in the DOM
    Attached,
    /// Element is present and rendered
    Visible,
    /// Element is absent or present but not rendered
    Hidden,
    /// Element is absent from the DOM
    Detached,
}

impl WaitCondition {
    /// Check the condition against a query result
    #[must_use]
    pub fn is_met(self, element: Option<&ElementSnapshot>) -> bool {
        match self {
            Self::Attached => element.is_some(),
            Self::Visible => element.is_some_and(ElementSnapshot::is_rendered),
            Self::Hidden => !element.is_some_and(ElementSnapshot::is_rendered),
            Self::Detached => element.is_none(),
        }
    }
}

/// Kind of captured artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// PNG screenshot
    Screenshot,
    /// Serialized page HTML
    HtmlSnapshot,
}

/// Reference to an artifact written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact kind
    pub kind: ArtifactKind,
    /// File path
    pub path: PathBuf,
}

impl ArtifactRef {
    /// Reference a screenshot file
    #[must_use]
    pub fn screenshot(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ArtifactKind::Screenshot,
            path: path.into(),
        }
    }

    /// Reference an HTML snapshot file
    #[must_use]
    pub fn html(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ArtifactKind::HtmlSnapshot,
            path: path.into(),
        }
    }
}

/// Browser configuration for driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,
    /// Executable path override
    pub executable_path: Option<PathBuf>,
    /// Run Chromium with its sandbox enabled
    pub sandbox: bool,
    /// User agent string
    pub user_agent: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            navigation_timeout_ms: 30_000,
            executable_path: None,
            sandbox: true,
            user_agent: None,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set browser executable path
    #[must_use]
    pub fn with_executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Enable or disable the Chromium sandbox
    #[must_use]
    pub const fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Navigation timeout as a duration
    #[must_use]
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Abstract driver trait for browser automation.
///
/// One driver instance is one browser session. The harness never shares a
/// driver between concurrently running scenarios.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short implementation name used in logs
    fn name(&self) -> &'static str;

    /// Navigate to URL
    async fn navigate(&mut self, url: &str) -> ComprobarResult<()>;

    /// Click the first element matching the selector
    async fn click(&mut self, selector: &Selector) -> ComprobarResult<()>;

    /// Replace the value of an input matching the selector
    async fn fill(&mut self, selector: &Selector, text: &str) -> ComprobarResult<()>;

    /// Query the first element matching the selector
    async fn query(&self, selector: &Selector) -> ComprobarResult<Option<ElementSnapshot>>;

    /// Whether the first matching element is attached and rendered
    async fn is_visible(&self, selector: &Selector) -> ComprobarResult<bool> {
        Ok(self
            .query(selector)
            .await?
            .is_some_and(|element| element.is_rendered()))
    }

    /// Poll until `condition` holds or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout; errors are driver faults only.
    async fn wait_for(
        &self,
        selector: &Selector,
        condition: WaitCondition,
        timeout: Duration,
    ) -> ComprobarResult<bool> {
        let start = tokio::time::Instant::now();
        loop {
            let element = self.query(selector).await?;
            if condition.is_met(element.as_ref()) {
                return Ok(true);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            let remaining = timeout.saturating_sub(elapsed);
            tokio::time::sleep(remaining.min(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)))
                .await;
        }
    }

    /// Write a PNG screenshot of the viewport to `path`
    async fn screenshot(&mut self, path: &Path) -> ComprobarResult<ArtifactRef>;

    /// Serialized HTML of the current page
    async fn content(&self) -> ComprobarResult<String>;

    /// Current page URL
    async fn current_url(&self) -> ComprobarResult<String>;

    /// Release the browser session
    async fn close(&mut self) -> ComprobarResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod element_snapshot_tests {
        use super::*;

        #[test]
        fn test_rendered_requires_area_and_display() {
            let elem = ElementSnapshot::new("button");
            assert!(!elem.is_rendered());

            let boxed = elem.with_bounding_box(BoundingBox::new(0.0, 0.0, 120.0, 32.0));
            assert!(boxed.is_rendered());

            let hidden = boxed.clone().with_displayed(false);
            assert!(!hidden.is_rendered());

            let collapsed = ElementSnapshot::new("div")
                .with_bounding_box(BoundingBox::new(10.0, 10.0, 0.0, 20.0));
            assert!(!collapsed.is_rendered());
        }

        #[test]
        fn test_with_text() {
            let elem = ElementSnapshot::new("h1").with_text("Panel de Administración");
            assert_eq!(
                elem.text_content.as_deref(),
                Some("Panel de Administración")
            );
        }
    }

    mod wait_condition_tests {
        use super::*;

        fn rendered() -> ElementSnapshot {
            ElementSnapshot::new("div").with_bounding_box(BoundingBox::new(0.0, 0.0, 1.0, 1.0))
        }

        #[test]
        fn test_absent_element() {
            assert!(!WaitCondition::Attached.is_met(None));
            assert!(!WaitCondition::Visible.is_met(None));
            assert!(WaitCondition::Hidden.is_met(None));
            assert!(WaitCondition::Detached.is_met(None));
        }

        #[test]
        fn test_rendered_element() {
            let elem = rendered();
            assert!(WaitCondition::Attached.is_met(Some(&elem)));
            assert!(WaitCondition::Visible.is_met(Some(&elem)));
            assert!(!WaitCondition::Hidden.is_met(Some(&elem)));
            assert!(!WaitCondition::Detached.is_met(Some(&elem)));
        }

        #[test]
        fn test_hidden_element() {
            let elem = rendered().with_displayed(false);
            assert!(WaitCondition::Attached.is_met(Some(&elem)));
            assert!(!WaitCondition::Visible.is_met(Some(&elem)));
            assert!(WaitCondition::Hidden.is_met(Some(&elem)));
            assert!(!WaitCondition::Detached.is_met(Some(&elem)));
        }
    }

    mod driver_config_tests {
        use super::*;

        #[test]
        fn test_config_default() {
            let config = DriverConfig::default();
            assert!(config.headless);
            assert!(config.sandbox);
            assert_eq!(config.viewport_width, 1280);
            assert_eq!(config.navigation_timeout(), Duration::from_secs(30));
        }

        #[test]
        fn test_config_builder() {
            let config = DriverConfig::new()
                .with_headless(false)
                .with_viewport(800, 600)
                .with_sandbox(false)
                .with_navigation_timeout(Duration::from_secs(5))
                .with_executable_path("/usr/bin/chromium")
                .with_user_agent("comprobar-test");

            assert!(!config.headless);
            assert!(!config.sandbox);
            assert_eq!(config.viewport_width, 800);
            assert_eq!(config.viewport_height, 600);
            assert_eq!(config.navigation_timeout_ms, 5000);
            assert_eq!(
                config.executable_path,
                Some(PathBuf::from("/usr/bin/chromium"))
            );
            assert_eq!(config.user_agent.as_deref(), Some("comprobar-test"));
        }

        #[test]
        fn test_config_partial_yaml() {
            let config: DriverConfig = serde_yaml_ng::from_str("headless: false\n").unwrap();
            assert!(!config.headless);
            assert_eq!(config.viewport_height, 720);
        }
    }

    mod artifact_ref_tests {
        use super::*;

        #[test]
        fn test_artifact_constructors() {
            let png = ArtifactRef::screenshot("out/01-landing.png");
            assert_eq!(png.kind, ArtifactKind::Screenshot);
            let html = ArtifactRef::html("out/01-landing.html");
            assert_eq!(html.kind, ArtifactKind::HtmlSnapshot);
            assert_eq!(html.path, PathBuf::from("out/01-landing.html"));
        }

        #[test]
        fn test_artifact_kind_serde() {
            let json = serde_json::to_string(&ArtifactKind::HtmlSnapshot).unwrap();
            assert_eq!(json, "\"html_snapshot\"");
        }
    }
}
