//! [`BrowserDriver`] backed by Chrome/Chromium over the DevTools protocol.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{pause, BrowserDriver};
use crate::config::BrowserOptions;

const READY_POLL: Duration = Duration::from_millis(250);

/// A single Chromium page driven sequentially.
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    options: BrowserOptions,
}

impl ChromiumDriver {
    /// Launch a browser with its profile in `profile_dir` and open a blank page.
    pub async fn launch(options: &BrowserOptions, profile_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(profile_dir)
            .await
            .with_context(|| format!("Failed to create profile dir: {}", profile_dir.display()))?;

        let chrome_path = match &options.chrome_executable {
            Some(path) => path.clone(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install it or set browser.chrome_executable.",
            )?,
        };

        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(None)
            .window_size(width, height)
            .user_data_dir(profile_dir)
            .request_timeout(options.default_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser.new_page("about:blank").await?;
        tracing::debug!(headless = options.headless, "Browser launched");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task,
            options: options.clone(),
        })
    }

    async fn element(&self, selector: &str) -> Result<Element> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("Element not found: {selector}"))
    }

    async fn eval_bool(&self, script: String) -> Result<bool> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    fn keystroke_delay(&self) -> Duration {
        let (min, max) = self.options.keystroke_delay_ms;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// JSON-quote a selector for embedding in a page script.
fn quoted(selector: &str) -> Result<String> {
    serde_json::to_string(selector).context("Failed to quote selector")
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        self.eval_bool(format!("document.querySelector({}) !== null", quoted(selector)?))
            .await
    }

    async fn wait_for(&self, selector: &str, visible: bool) -> Result<()> {
        let check = if visible {
            format!(
                "(() => {{ const e = document.querySelector({}); \
                 return !!e && !!(e.offsetWidth || e.offsetHeight || e.getClientRects().length); }})()",
                quoted(selector)?
            )
        } else {
            format!("document.querySelector({}) !== null", quoted(selector)?)
        };

        let start = Instant::now();
        loop {
            if self.eval_bool(check.clone()).await? {
                return Ok(());
            }
            if start.elapsed() > self.options.default_timeout {
                anyhow::bail!(
                    "Timed out after {:?} waiting for {selector} (visible: {visible})",
                    self.options.default_timeout
                );
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.element(selector).await?.click().await?;
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const e = document.querySelector({}); \
             if (!e) return false; e.focus(); e.value = ''; return true; }})()",
            quoted(selector)?
        );
        if !self.eval_bool(script).await? {
            anyhow::bail!("Element not found: {selector}");
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.element(selector).await?;
        element.click().await?;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element.type_str(ch.encode_utf8(&mut buf)).await?;
            pause(self.keystroke_delay()).await;
        }
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        self.element(selector).await?.press_key(key).await?;
        Ok(())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.attribute(name).await?),
            Err(_) => Ok(None),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;

        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.display().to_string())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build download params: {e}"))?;

        self.page.execute(params).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        self.handler_task.abort();
        closed.context("Failed to close browser")?;
        Ok(())
    }
}

/// Find Chrome/Chromium on PATH or in well-known install locations.
fn find_chrome() -> Option<PathBuf> {
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        let Ok(output) = std::process::Command::new("which").arg(name).output() else {
            continue;
        };
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }

    [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|candidate| candidate.exists())
}
