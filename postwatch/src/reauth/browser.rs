//! Browser-driven SSO login.
//!
//! Replays the interactive login in a private Chromium window: credentials, the
//! "verification code" second-factor option, the OATH code, then reads the
//! portal cookie. Every step waits for an expected element with its own timeout.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use super::Reauthenticator;
use super::otp::YkmanOtp;
use crate::session::{RefreshError, SessionCredential};

/// First input of the SSO login form.
const LOGIN_INPUT: &str = "input";
/// Container of the alternative second-factor methods.
const MFA_LINKS: &str = "#linksDiv";
/// Input for the verification code.
const CODE_INPUT: &str = "#verificationCodeInput";
/// Chromium renders the portal's JSON response inside a `<pre>`.
const LANDED: &str = "pre";

/// Tab presses from the top of the MFA page to the "code from app or token" link.
const MFA_OPTION_TABS: usize = 4;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Login replay settings.
#[derive(Debug, Clone)]
pub struct BrowserLoginConfig {
    /// Portal page that redirects to the SSO login when unauthenticated.
    pub login_url: String,
    pub email: String,
    pub password: String,
    /// Cookie to extract once logged in.
    pub cookie_name: String,
    /// Chromium binary; autodetected when `None`.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    /// Wait for the login form.
    pub form_timeout: Duration,
    /// Wait for each second-factor page.
    pub step_timeout: Duration,
    /// Wait for the portal to answer after the code is submitted.
    pub landing_timeout: Duration,
}

impl BrowserLoginConfig {
    pub fn new(login_url: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            email: email.into(),
            password: password.into(),
            cookie_name: crate::session::DEFAULT_COOKIE_NAME.to_string(),
            chrome_path: None,
            headless: true,
            form_timeout: Duration::from_secs(5),
            step_timeout: Duration::from_secs(10),
            landing_timeout: Duration::from_secs(20),
        }
    }
}

/// Obtains a new portal cookie by driving a headless Chromium through the SSO flow.
pub struct BrowserReauthenticator {
    config: BrowserLoginConfig,
    otp: YkmanOtp,
}

impl BrowserReauthenticator {
    pub fn new(config: BrowserLoginConfig, otp: YkmanOtp) -> Self {
        Self { config, otp }
    }

    fn browser_config(&self) -> Result<BrowserConfig, RefreshError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--incognito")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer");

        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }

        builder.build().map_err(RefreshError::Browser)
    }

    /// Walk the login pages and return the portal cookie.
    async fn login(&self, page: &Page) -> Result<SessionCredential, RefreshError> {
        wait_for_visible(page, LOGIN_INPUT, self.config.form_timeout).await?;
        debug!("Login form ready");

        page.find_element(LOGIN_INPUT).await?.click().await?;
        insert_text(page, &self.config.email).await?;
        press_key(page, Key::Tab).await?;
        insert_text(page, &self.config.password).await?;
        press_key(page, Key::Enter).await?;

        wait_for_visible(page, MFA_LINKS, self.config.step_timeout).await?;
        debug!("Choosing verification code method");
        for _ in 0..MFA_OPTION_TABS {
            press_key(page, Key::Tab).await?;
        }
        press_key(page, Key::Enter).await?;

        let code = self.otp.code().await?;

        wait_for_visible(page, CODE_INPUT, self.config.step_timeout).await?;
        insert_text(page, &code).await?;
        press_key(page, Key::Enter).await?;

        wait_for_visible(page, LANDED, self.config.landing_timeout).await?;
        debug!("Landed on portal");

        let cookies = page.get_cookies().await?;
        cookies
            .into_iter()
            .find(|c| c.name == self.config.cookie_name)
            .map(|c| SessionCredential::new(c.name, c.value))
            .ok_or_else(|| RefreshError::MissingCookie(self.config.cookie_name.clone()))
    }
}

#[async_trait]
impl Reauthenticator for BrowserReauthenticator {
    #[instrument(skip(self), fields(url = %self.config.login_url))]
    async fn obtain_credential(&self) -> Result<SessionCredential, RefreshError> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        let result = async {
            let page = browser.new_page(self.config.login_url.as_str()).await?;
            self.login(&page).await
        }
        .await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "Browser process did not exit cleanly");
        }
        handler_task.abort();

        if result.is_ok() {
            info!("Obtained new session cookie from browser login");
        }
        result
    }
}

/// Poll until `selector` matches a rendered element.
async fn wait_for_visible(
    page: &Page,
    selector: &'static str,
    timeout: Duration,
) -> Result<(), RefreshError> {
    let quoted = serde_json::to_string(selector).map_err(|e| RefreshError::Browser(e.to_string()))?;
    let script = format!(
        "(() => {{ const el = document.querySelector({quoted}); \
         return !!el && (el.offsetParent !== null || el.getClientRects().length > 0); }})()"
    );

    let poll = async {
        loop {
            let visible = match page.evaluate(script.as_str()).await {
                Ok(result) => result.into_value::<bool>().unwrap_or(false),
                // Navigations tear down the execution context; keep polling.
                Err(e) => {
                    debug!(selector, error = %e, "Visibility probe failed");
                    false
                }
            };
            if visible {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| RefreshError::ElementTimeout { selector, timeout })
}

#[derive(Debug, Clone, Copy)]
enum Key {
    Tab,
    Enter,
}

impl Key {
    fn name(self) -> &'static str {
        match self {
            Key::Tab => "Tab",
            Key::Enter => "Enter",
        }
    }

    fn key_code(self) -> i64 {
        match self {
            Key::Tab => 9,
            Key::Enter => 13,
        }
    }

    fn text(self) -> Option<&'static str> {
        match self {
            Key::Tab => None,
            Key::Enter => Some("\r"),
        }
    }
}

/// Send a key press to whatever element has focus.
async fn press_key(page: &Page, key: Key) -> Result<(), RefreshError> {
    for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key.name())
            .code(key.name())
            .windows_virtual_key_code(key.key_code())
            .native_virtual_key_code(key.key_code());
        if matches!(kind, DispatchKeyEventType::KeyDown)
            && let Some(text) = key.text()
        {
            builder = builder.text(text);
        }
        let params = builder.build().map_err(RefreshError::Browser)?;
        page.execute(params).await?;
    }
    Ok(())
}

/// Type text into the focused element.
async fn insert_text(page: &Page, text: &str) -> Result<(), RefreshError> {
    page.execute(InsertTextParams::new(text)).await?;
    Ok(())
}
