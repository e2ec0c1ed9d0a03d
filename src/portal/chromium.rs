//! [`PurchasePage`] backed by a real Chrome instance over the DevTools protocol.

use crate::config::Config;
use crate::portal::page::PurchasePage;
use crate::portal::selectors::dom;
use crate::portal::session::{SessionState, StoredCookie};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, EnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A4 in inches.
const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;
/// 10 mm in inches.
const MARGIN_IN: f64 = 10.0 / 25.4;

/// Network counts as idle once no request has been in flight this long.
const IDLE_WINDOW: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const ROW_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One browser window showing the purchase-history portal.
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    network: JoinHandle<()>,
    in_flight: Arc<InFlight>,
    portal_url: String,
    timeout: Duration,
    slow_mo: Duration,
}

impl ChromiumPage {
    /// Launches Chrome and restores the saved session, if there is one.
    pub async fn launch(config: &Config) -> Result<Self> {
        // Read before launching so a broken file never leaves Chrome running.
        let session = SessionState::load(&config.session_file)?;

        let mut builder = BrowserConfig::builder()
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                ..Default::default()
            })
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.timeout())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(chrome) = &config.chrome_path {
            builder = builder.chrome_executable(chrome);
        }

        let browser_config =
            builder.build().map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser. Is Chrome or Chromium installed?")?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let in_flight = Arc::new(InFlight::new());
        let (page, network) = match open_page(&browser, in_flight.clone()).await {
            Ok(opened) => opened,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    debug!("Failed to close browser: {}", close_err);
                }
                let _ = browser.wait().await;
                handler.abort();
                return Err(e);
            }
        };

        let this = Self {
            browser,
            page,
            handler,
            network,
            in_flight,
            portal_url: config.portal_url.clone(),
            timeout: config.timeout(),
            slow_mo: Duration::from_millis(config.slow_mo_ms),
        };

        if let Some(session) = session {
            let restored = this.restore_session(&session).await;
            if let Err(e) = restored {
                if let Err(close_err) = this.close().await {
                    debug!("Failed to close browser: {:#}", close_err);
                }
                return Err(e);
            }
            info!("Restored session from {}", config.session_file.display());
        }

        Ok(this)
    }

    /// Closes the browser and stops the protocol handler.
    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await.context("Failed to close browser");
        let _ = self.browser.wait().await;
        self.network.abort();
        self.handler.abort();
        closed.map(|_| ())
    }

    async fn restore_session(&self, session: &SessionState) -> Result<()> {
        let cookies: Vec<CookieParam> = session.cookies.iter().map(cookie_param).collect();
        if cookies.is_empty() {
            return Ok(());
        }

        debug!("Restoring {} cookies", cookies.len());
        self.page.set_cookies(cookies).await.context("Failed to restore session cookies")?;
        Ok(())
    }

    /// Pause applied before every interaction.
    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }

    /// Evaluates `body` (a JS function body) and decodes its JSON-serialized result.
    async fn eval_json<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        let expression = format!("JSON.stringify((() => {{ {body} }})())");
        let raw: String = self
            .page
            .evaluate(expression)
            .await
            .context("Script evaluation failed")?
            .into_value()?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<bool> {
        let elements = self.page.find_elements(selector).await?;
        let Some(element) = elements.get(index) else {
            return Ok(false);
        };

        self.pace().await;
        element.click().await?;
        Ok(true)
    }
}

/// Opens the working tab and starts counting its in-flight requests.
async fn open_page(browser: &Browser, in_flight: Arc<InFlight>) -> Result<(Page, JoinHandle<()>)> {
    let page = browser.new_page("about:blank").await.context("Failed to open a page")?;
    page.execute(EnableParams::default())
        .await
        .context("Failed to enable network events")?;

    let started = page
        .event_listener::<EventRequestWillBeSent>()
        .await?
        .map(|e| NetworkEvent::Started(e.request_id.inner().clone()));
    let finished = page
        .event_listener::<EventLoadingFinished>()
        .await?
        .map(|e| NetworkEvent::Done(e.request_id.inner().clone()));
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await?
        .map(|e| NetworkEvent::Done(e.request_id.inner().clone()));

    let mut events = futures::stream::select_all([started.boxed(), finished.boxed(), failed.boxed()]);
    let network = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                NetworkEvent::Started(id) => in_flight.started(id),
                NetworkEvent::Done(id) => in_flight.finished(&id),
            }
        }
    });

    Ok((page, network))
}

enum NetworkEvent {
    Started(String),
    Done(String),
}

/// Requests the page has sent but not yet finished or failed.
#[derive(Debug)]
struct InFlight {
    state: Mutex<InFlightState>,
}

#[derive(Debug)]
struct InFlightState {
    pending: HashSet<String>,
    last_change: Instant,
}

impl InFlight {
    fn new() -> Self {
        Self {
            state: Mutex::new(InFlightState { pending: HashSet::new(), last_change: Instant::now() }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InFlightState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Redirects reuse the request id, so a repeated start is one request.
    fn started(&self, id: String) {
        let mut state = self.lock();
        state.pending.insert(id);
        state.last_change = Instant::now();
    }

    fn finished(&self, id: &str) {
        let mut state = self.lock();
        if state.pending.remove(id) {
            state.last_change = Instant::now();
        }
    }

    fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// How long nothing has been in flight as of `now`, or `None` while requests are pending.
    fn quiet_for(&self, now: Instant) -> Option<Duration> {
        let state = self.lock();
        state
            .pending
            .is_empty()
            .then(|| now.saturating_duration_since(state.last_change))
    }
}

/// JS string literal for `s`.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn cookie_param(cookie: &StoredCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.url = Some(format!("https://{}{}", cookie.domain.trim_start_matches('.'), cookie.path));
    param.domain = Some(cookie.domain.clone());
    param.path = Some(cookie.path.clone());
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param.expires = cookie.expires.map(TimeSinceEpoch::new);
    param
}

fn stored_cookie(cookie: Cookie) -> StoredCookie {
    let expires = (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires);
    StoredCookie {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        expires,
        http_only: cookie.http_only,
        secure: cookie.secure,
    }
}

#[async_trait]
impl PurchasePage for ChromiumPage {
    async fn open_list(&self) -> Result<()> {
        debug!("GET {}", self.portal_url);
        self.pace().await;
        self.page
            .goto(self.portal_url.as_str())
            .await
            .with_context(|| format!("Failed to open {}", self.portal_url))?;
        self.wait_for_network_idle(self.timeout).await
    }

    async fn wait_for_rows(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.row_count().await.unwrap_or(0) > 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("Timed out after {:?} waiting for the purchase list", timeout);
            }
            tokio::time::sleep(ROW_POLL_INTERVAL).await;
        }
    }

    async fn select_family_member(&self, label: &str) -> Result<bool> {
        self.pace().await;
        let body = format!(
            "const select = document.querySelector({sel});
             if (!select) return false;
             const option = Array.from(select.options).find(o => o.label.trim() === {label});
             if (!option) return false;
             select.value = option.value;
             select.dispatchEvent(new Event('change', {{ bubbles: true }}));
             return true;",
            sel = js_str(dom::FAMILY_MEMBER),
            label = js_str(label),
        );
        self.eval_json(&body).await
    }

    async fn row_count(&self) -> Result<usize> {
        let body = format!("return document.querySelectorAll({}).length;", js_str(dom::ROW_TOGGLE));
        self.eval_json(&body).await
    }

    async fn row_texts(&self) -> Result<Vec<String>> {
        let body = format!(
            "return Array.from(document.querySelectorAll({})).map(b => b.textContent || '');",
            js_str(dom::ROW_TOGGLE)
        );
        self.eval_json(&body).await
    }

    async fn row_text(&self, index: usize) -> Result<Option<String>> {
        let body = format!(
            "const b = document.querySelectorAll({})[{index}]; return b ? (b.textContent || '') : null;",
            js_str(dom::ROW_TOGGLE)
        );
        self.eval_json(&body).await
    }

    async fn row_expanded(&self, index: usize) -> Result<bool> {
        let body = format!(
            "const b = document.querySelectorAll({})[{index}]; return !!b && b.getAttribute('aria-expanded') === 'true';",
            js_str(dom::ROW_TOGGLE)
        );
        self.eval_json(&body).await
    }

    async fn toggle_row(&self, index: usize) -> Result<()> {
        if !self.click_nth(dom::ROW_TOGGLE, index).await? {
            anyhow::bail!("Row {} is no longer rendered", index);
        }
        Ok(())
    }

    async fn has_no_invoice_marker(&self) -> Result<bool> {
        let body = format!("return document.querySelectorAll({}).length > 0;", js_str(dom::NO_INVOICE));
        self.eval_json(&body).await
    }

    async fn purchase_containers(&self) -> Result<Vec<String>> {
        let body = format!(
            "return Array.from(document.querySelectorAll({})).map(e => e.outerHTML);",
            js_str(dom::PURCHASE)
        );
        self.eval_json(&body).await
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.pace().await;
        self.page.evaluate("window.scrollTo(0, document.body.scrollHeight)").await?;
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<()> {
        self.pace().await;
        self.page.evaluate("window.scrollTo(0, 0)").await?;
        Ok(())
    }

    async fn open_receipt(&self) -> Result<bool> {
        self.click_nth(dom::VIEW_RECEIPT, 0).await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            // Evaluation fails while a navigation swaps the document; that is not idle.
            let ready: Option<String> = self.eval_json("return document.readyState;").await.ok();
            let quiet = self.in_flight.quiet_for(Instant::now());

            if ready.as_deref() == Some("complete") && quiet.is_some_and(|q| q >= IDLE_WINDOW) {
                return Ok(());
            }

            if Instant::now() >= deadline {
                anyhow::bail!(
                    "Timed out after {:?} waiting for network idle ({} requests in flight)",
                    timeout,
                    self.in_flight.pending()
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn save_pdf(&self, path: &Path) -> Result<()> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(A4_WIDTH_IN),
            paper_height: Some(A4_HEIGHT_IN),
            margin_top: Some(MARGIN_IN),
            margin_bottom: Some(MARGIN_IN),
            margin_left: Some(MARGIN_IN),
            margin_right: Some(MARGIN_IN),
            ..Default::default()
        };

        let pdf = self.page.pdf(params).await.context("Failed to render PDF")?;
        tokio::fs::write(path, pdf)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    async fn save_session(&self, path: &Path) -> Result<()> {
        let cookies = self.page.get_cookies().await.context("Failed to read cookies")?;
        let session = SessionState::capture(cookies.into_iter().map(stored_cookie).collect());
        session.save(path)
    }
}
