//! `PortalPage` over the Chrome DevTools Protocol.
//!
//! Every primitive is one `Runtime.evaluate` of a small self-contained
//! script. Selectors and values are embedded as JSON string literals.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::future::BoxFuture;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use probate_core::config::{BrowserConfig, PortalConfig};
use probate_core::error::{ProbateError, Result};
use probate_core::traits::PortalPage;

fn browser_err(e: CdpError) -> ProbateError {
    ProbateError::Browser(e.to_string())
}

/// JS string literal for `s`.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[derive(Deserialize)]
struct TableScan {
    found: bool,
    rows: Vec<Vec<String>>,
}

/// A browser tab showing the portal.
pub struct CdpPage {
    page: Page,
    settle: Duration,
    ready_poll: Duration,
}

impl CdpPage {
    pub fn new(page: Page, config: &PortalConfig) -> Self {
        Self {
            page,
            settle: Duration::from_millis(config.page_settle_ms),
            ready_poll: Duration::from_millis(config.ready_poll_ms.max(1)),
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self.page.evaluate(script).await.map_err(browser_err)?;
        result
            .into_value::<T>()
            .map_err(|e| ProbateError::Script(e.to_string()))
    }
}

impl PortalPage for CdpPage {
    fn current_url(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.eval("window.location.href".to_string()))
    }

    fn wait_for_settle(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            loop {
                // Evaluation fails while a navigation swaps the document.
                match self.eval::<String>("document.readyState".to_string()).await {
                    Ok(state) if state == "complete" => break,
                    Ok(state) => debug!(state = %state, "Waiting for page load"),
                    Err(e) => debug!(error = %e, "Page not ready for evaluation"),
                }
                tokio::time::sleep(self.ready_poll).await;
            }
            tokio::time::sleep(self.settle).await;
            Ok(())
        })
    }

    fn exists<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.eval(format!(
            "document.querySelector({}) !== null",
            js_str(selector)
        )))
    }

    fn set_value<'a>(&'a self, selector: &'a str, value: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.eval(format!(
            "(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()",
            sel = js_str(selector),
            val = js_str(value),
        )))
    }

    fn click<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.eval(format!(
            "(() => {{
                const el = document.querySelector({});
                if (!el) return false;
                el.click();
                return true;
            }})()",
            js_str(selector)
        )))
    }

    fn count<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<usize>> {
        Box::pin(self.eval(format!(
            "document.querySelectorAll({}).length",
            js_str(selector)
        )))
    }

    fn click_nth<'a>(&'a self, selector: &'a str, index: usize) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.eval(format!(
            "(() => {{
                const el = document.querySelectorAll({})[{index}];
                if (!el) return false;
                el.click();
                return true;
            }})()",
            js_str(selector)
        )))
    }

    fn table_rows<'a>(
        &'a self,
        selector: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<Vec<String>>>>> {
        Box::pin(async move {
            let scan: TableScan = self
                .eval(format!(
                    "(() => {{
                        const table = document.querySelector({});
                        if (!table) return {{ found: false, rows: [] }};
                        const rows = Array.from(table.querySelectorAll('tbody tr')).map(row =>
                            Array.from(row.querySelectorAll('td')).map(td => (td.innerText || '').trim()));
                        return {{ found: true, rows }};
                    }})()",
                    js_str(selector)
                ))
                .await?;
            Ok(scan.found.then_some(scan.rows))
        })
    }

    fn click_button_matching<'a>(
        &'a self,
        text: &'a str,
        hint: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.eval(format!(
            "(() => {{
                const text = {text};
                const hint = {hint}.toLowerCase();
                const button = Array.from(document.querySelectorAll('button')).find(btn =>
                    (btn.textContent || '').includes(text) ||
                    (btn.id || '').toLowerCase().includes(hint) ||
                    (btn.className || '').toLowerCase().includes(hint));
                if (!button) return false;
                button.click();
                return true;
            }})()",
            text = js_str(text),
            hint = js_str(hint),
        )))
    }
}

/// Connection to the browser hosting the portal tab.
///
/// Connects to a running Chrome when `cdp_url` is set (the usual setup: a
/// human clears the CAPTCHA in that window), otherwise launches one.
pub struct PortalBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    launched: bool,
}

impl PortalBrowser {
    pub async fn open(config: &BrowserConfig) -> Result<Self> {
        let (browser, mut handler, launched) = match &config.cdp_url {
            Some(url) => {
                info!(url = %url, "Connecting to running browser");
                let (browser, handler) = Browser::connect(url.as_str()).await.map_err(browser_err)?;
                (browser, handler, false)
            }
            None => {
                let mut builder = ChromeConfig::builder();
                if !config.headless {
                    builder = builder.with_head();
                }
                let chrome = builder.build().map_err(ProbateError::Browser)?;
                info!(headless = config.headless, "Launching browser");
                let (browser, handler) = Browser::launch(chrome).await.map_err(browser_err)?;
                (browser, handler, true)
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler error");
                }
            }
            debug!("CDP connection closed");
        });

        Ok(Self {
            browser,
            handler,
            launched,
        })
    }

    /// The tab already showing the portal, or a new tab opened on it.
    pub async fn portal_page(&self, portal: &PortalConfig) -> Result<CdpPage> {
        let pages = self.browser.pages().await.map_err(browser_err)?;
        for page in pages {
            match page.url().await {
                Ok(Some(url)) if url.starts_with(&portal.base_url) => {
                    info!(url = %url, "Using open portal tab");
                    return Ok(CdpPage::new(page, portal));
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Skipping unreadable tab"),
            }
        }

        info!(url = %portal.base_url, "No portal tab found; opening one");
        let page = self
            .browser
            .new_page(portal.base_url.as_str())
            .await
            .map_err(browser_err)?;
        Ok(CdpPage::new(page, portal))
    }

    /// Close a launched browser; leave a connected one running.
    pub async fn shutdown(mut self) {
        if self.launched {
            if let Err(e) = self.browser.close().await {
                warn!(error = %e, "Failed to close browser");
            }
        }
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_become_safe_js_literals() {
        assert_eq!(js_str("#CourtSelect"), "\"#CourtSelect\"");
        assert_eq!(
            js_str("button.ButtonAsLink[type=\"submit\"]"),
            r#""button.ButtonAsLink[type=\"submit\"]""#
        );
        assert_eq!(js_str("Surrogate's"), "\"Surrogate's\"");
    }

    #[test]
    fn table_scan_shape() {
        let scan: TableScan =
            serde_json::from_str(r#"{"found":true,"rows":[["1","2"]]}"#).unwrap();
        assert!(scan.found);
        assert_eq!(scan.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }
}
