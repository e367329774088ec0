//! Chromium driver over the Chrome `DevTools` Protocol.
//!
//! Element lookups run as page scripts built from [`Selector::to_query`], so
//! the same strategy table drives both this adapter and the mock.

use crate::batch::DriverFactory;
use crate::driver::{ArtifactRef, Driver, DriverConfig, ElementSnapshot};
use crate::result::{ComprobarError, ComprobarResult};
use crate::selector::Selector;
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Script returning an [`ElementSnapshot`] as JSON text, `"null"` when absent
#[must_use]
pub fn snapshot_script(selector: &Selector) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return 'null'; \
         const r = el.getBoundingClientRect(); const s = window.getComputedStyle(el); \
         return JSON.stringify({{ tag_name: el.tagName.toLowerCase(), text_content: el.textContent, \
         bounding_box: {{ x: r.x, y: r.y, width: r.width, height: r.height }}, \
         displayed: s.display !== 'none' && s.visibility !== 'hidden' }}); }})()",
        selector.to_query()
    )
}

/// Script clicking the element; evaluates to whether it was found
#[must_use]
pub fn click_script(selector: &Selector) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return false; \
         el.scrollIntoView({{ block: 'center' }}); el.click(); return true; }})()",
        selector.to_query()
    )
}

/// Script setting an input's value the way a typing user would, so that
/// framework-controlled inputs observe the change.
#[must_use]
pub fn fill_script(selector: &Selector, text: &str) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return 'missing'; if (!('value' in el)) return 'not-input'; \
         el.focus(); const d = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value'); \
         if (d && d.set) {{ d.set.call(el, {text:?}); }} else {{ el.value = {text:?}; }} \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return 'ok'; }})()",
        selector.to_query()
    )
}

fn transport(e: impl std::fmt::Display) -> ComprobarError {
    ComprobarError::transport(e.to_string())
}

/// A Chromium browser with one page
#[derive(Debug)]
pub struct ChromiumDriver {
    config: DriverConfig,
    browser: Arc<Mutex<CdpBrowser>>,
    page: Mutex<CdpPage>,
    handle: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page
    ///
    /// # Errors
    ///
    /// Returns error if the browser cannot be launched
    pub async fn launch(config: DriverConfig) -> ComprobarResult<Self> {
        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.navigation_timeout());
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.executable_path {
            builder = builder.chrome_executable(path);
        }
        if let Some(ref ua) = config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }
        let cdp_config = builder
            .build()
            .map_err(|message| ComprobarError::BrowserLaunchError { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| ComprobarError::BrowserLaunchError {
                    message: e.to_string(),
                })?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ComprobarError::BrowserLaunchError {
                message: e.to_string(),
            })?;
        debug!(headless = config.headless, "chromium launched");

        Ok(Self {
            config,
            browser: Arc::new(Mutex::new(browser)),
            page: Mutex::new(page),
            handle,
            closed: false,
        })
    }

    /// Launch settings
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> ComprobarResult<T> {
        let page = self.page.lock().await;
        page.evaluate(script.as_str())
            .await
            .map_err(transport)?
            .into_value()
            .map_err(transport)
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn navigate(&mut self, url: &str) -> ComprobarResult<()> {
        let page = self.page.lock().await;
        let goto = page.goto(url);
        match tokio::time::timeout(self.config.navigation_timeout(), goto).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ComprobarError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(ComprobarError::NavigationError {
                url: url.to_string(),
                message: format!("timed out after {}ms", self.config.navigation_timeout_ms),
            }),
        }
    }

    async fn click(&mut self, selector: &Selector) -> ComprobarResult<()> {
        if self.eval::<bool>(click_script(selector)).await? {
            Ok(())
        } else {
            Err(ComprobarError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    }

    async fn fill(&mut self, selector: &Selector, text: &str) -> ComprobarResult<()> {
        match self.eval::<String>(fill_script(selector, text)).await?.as_str() {
            "ok" => Ok(()),
            "not-input" => Err(ComprobarError::InvalidState {
                message: format!("{selector} is not an input"),
            }),
            _ => Err(ComprobarError::ElementNotFound {
                selector: selector.to_string(),
            }),
        }
    }

    async fn query(&self, selector: &Selector) -> ComprobarResult<Option<ElementSnapshot>> {
        let json: String = self.eval(snapshot_script(selector)).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn screenshot(&mut self, path: &Path) -> ComprobarResult<ArtifactRef> {
        let data = {
            let page = self.page.lock().await;
            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            let shot = page
                .execute(params)
                .await
                .map_err(|e| ComprobarError::ScreenshotError {
                    message: e.to_string(),
                })?;
            base64::engine::general_purpose::STANDARD
                .decode(&shot.data)
                .map_err(|e| ComprobarError::ScreenshotError {
                    message: e.to_string(),
                })?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(ArtifactRef::screenshot(path))
    }

    async fn content(&self) -> ComprobarResult<String> {
        let page = self.page.lock().await;
        page.content().await.map_err(transport)
    }

    async fn current_url(&self) -> ComprobarResult<String> {
        let page = self.page.lock().await;
        Ok(page.url().await.map_err(transport)?.unwrap_or_default())
    }

    async fn close(&mut self) -> ComprobarResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = {
            let mut browser = self.browser.lock().await;
            browser.close().await
        };
        self.handle.abort();
        result.map(|_| ()).map_err(transport)
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if !self.closed {
            warn!("chromium driver dropped without close");
            self.handle.abort();
        }
    }
}

/// Launches one Chromium per scenario
#[derive(Debug, Clone, Default)]
pub struct ChromiumFactory {
    config: DriverConfig,
}

impl ChromiumFactory {
    /// Factory with launch settings
    #[must_use]
    pub const fn new(config: DriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    async fn create(&self) -> ComprobarResult<Box<dyn Driver>> {
        Ok(Box::new(ChromiumDriver::launch(self.config.clone()).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_script_wraps_query() {
        let selector = Selector::placeholder("Usuario");
        let script = snapshot_script(&selector);
        assert!(script.contains(&selector.to_query()));
        assert!(script.contains("getBoundingClientRect"));
        assert!(script.contains("JSON.stringify"));
        assert!(script.starts_with("(() =>"));
    }

    #[test]
    fn test_fill_script_escapes_text() {
        let script = fill_script(&Selector::placeholder("Usuario"), "o'brien \"x\"");
        assert!(script.contains(r#""o'brien \"x\"""#));
        assert!(script.contains("'input'"));
    }

    #[test]
    fn test_click_script() {
        let script = click_script(&Selector::role("button", "Entrar"));
        assert!(script.contains("el.click()"));
    }
}
