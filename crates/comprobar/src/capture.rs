//! Artifact directory layout.
//!
//! `<root>/<scenario-slug>/<NN>-<label>.png` and `.html`

use crate::driver::{ArtifactRef, Driver};
use crate::result::ComprobarResult;
use crate::scenario::slugify;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Owns where screenshots and HTML snapshots land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one scenario
    #[must_use]
    pub fn scenario_dir(&self, scenario: &str) -> PathBuf {
        self.root.join(slugify(scenario))
    }

    /// Screenshot and HTML paths for a step
    #[must_use]
    pub fn paths(&self, scenario: &str, index: usize, label: &str) -> (PathBuf, PathBuf) {
        let stem = format!("{index:02}-{}", slugify(label));
        let dir = self.scenario_dir(scenario);
        (
            dir.join(format!("{stem}.png")),
            dir.join(format!("{stem}.html")),
        )
    }

    /// Screenshot the page, then save its HTML.
    ///
    /// # Errors
    ///
    /// Returns error if the screenshot cannot be taken. An HTML snapshot
    /// failure only drops the snapshot.
    pub async fn capture(
        &self,
        driver: &mut dyn Driver,
        scenario: &str,
        index: usize,
        label: &str,
    ) -> ComprobarResult<Vec<ArtifactRef>> {
        let (png, html) = self.paths(scenario, index, label);
        if let Some(parent) = png.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut artifacts = vec![driver.screenshot(&png).await?];

        match driver.content().await {
            Ok(content) => match tokio::fs::write(&html, content).await {
                Ok(()) => artifacts.push(ArtifactRef::html(&html)),
                Err(err) => {
                    warn!(path = %html.display(), error = %err, "html snapshot not written");
                }
            },
            Err(err) => warn!(scenario, error = %err, "page content unavailable"),
        }
        debug!(scenario, index, label, count = artifacts.len(), "artifacts captured");
        Ok(artifacts)
    }
}
