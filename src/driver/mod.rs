//! Browser driver capability.
//!
//! Everything above this module talks to the dashboard through
//! [`BrowserDriver`]; selectors and page scripts live in [`selectors`]. The
//! driver is not reentrant: callers issue one operation at a time.

#[cfg(feature = "chromium")]
mod chromium;
pub mod selectors;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumDriver;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Page navigation, element lookup and keystroke injection.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate and wait for the page to load.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Current document title, empty when the page has none.
    async fn title(&self) -> Result<String>;

    /// Whether an element matching `selector` is in the document.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Wait until `selector` is present (and rendered when `visible`).
    async fn wait_for(&self, selector: &str, visible: bool) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Focus the field and empty its value.
    async fn clear(&self, selector: &str) -> Result<()>;

    /// Focus the field and type `text` keystroke by keystroke.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Send a single key (e.g. `"Enter"`) to the focused field.
    async fn press_key(&self, selector: &str, key: &str) -> Result<()>;

    /// Attribute of the first matching element, `None` if absent.
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Run a page script and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Direct subsequent downloads into `dir`.
    async fn set_download_dir(&self, dir: &Path) -> Result<()>;

    /// Tear the browser session down.
    async fn close(&self) -> Result<()>;
}

/// Suspend for a pacing delay. Zero skips the timer entirely.
pub async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
