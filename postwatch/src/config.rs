//! Environment configuration.
//!
//! Everything is read from environment variables (a `.env` file is loaded by
//! `main` first). Missing or malformed values are fatal at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::logging::ConsoleFormat;
use crate::monitor::MonitorConfig;
use crate::notification::{DiscordConfig, TelegramConfig};
use crate::portal::{DEFAULT_BASE_URL, PortalConfig};
use crate::reauth::BrowserLoginConfig;
use crate::scoring::OpenAiConfig;
use crate::session::{RefreshConfig, SessionCredential};
use crate::{Error, Result};

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub seed_credential: SessionCredential,
    pub portal: PortalConfig,
    pub browser: BrowserLoginConfig,
    pub ykman_path: String,
    pub otp_account: String,
    pub refresh: RefreshConfig,
    pub monitor: MonitorConfig,
    pub store_path: PathBuf,
    pub openai: Option<OpenAiConfig>,
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    /// Write refreshed cookies back to `env_file`.
    pub persist_cookie: bool,
    pub env_file: PathBuf,
    pub log_dir: PathBuf,
    pub log_format: ConsoleFormat,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup` (variable name to value).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let cookie = env.required("COOKIE")?;
        let seed_credential = SessionCredential::parse(&cookie)
            .ok_or_else(|| Error::config("COOKIE is empty or malformed"))?;
        let email = env.required("EMAIL")?;
        let password = env.required("PASSWORD")?;

        let base_url = match env.optional("PORTAL_BASE_URL") {
            Some(url) => env.url("PORTAL_BASE_URL", url)?,
            None => DEFAULT_BASE_URL.to_string(),
        };
        let base_url = base_url.trim_end_matches('/').to_string();

        let portal = PortalConfig {
            base_url: base_url.clone(),
            apply_password: password.clone(),
            request_timeout: Duration::from_secs(env.parsed("REQUEST_TIMEOUT_SECS", 10u64)?),
        };

        let mut browser = BrowserLoginConfig::new(format!("{base_url}/"), email, password);
        browser.cookie_name = seed_credential.name().to_string();
        browser.chrome_path = env.optional("CHROME_PATH").map(PathBuf::from);
        browser.headless = env.flag("BROWSER_HEADLESS", true)?;

        let refresh = RefreshConfig {
            cooldown: Duration::from_secs(env.parsed("REFRESH_COOLDOWN_SECS", 120u64)?),
            reauth_timeout: Duration::from_secs(env.parsed("REAUTH_TIMEOUT_SECS", 120u64)?),
            credential_lifetime: Duration::from_secs(env.parsed("COOKIE_LIFETIME_SECS", 18_000u64)?),
        };

        let backoff_factor: f64 = env.parsed("POLL_BACKOFF_FACTOR", 1.0)?;
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(Error::config("POLL_BACKOFF_FACTOR must be at least 1.0"));
        }
        let poll_interval_secs: u64 = env.parsed("POLL_INTERVAL_SECS", 600)?;
        if poll_interval_secs == 0 {
            return Err(Error::config("POLL_INTERVAL_SECS must be positive"));
        }
        let monitor = MonitorConfig {
            poll_interval: Duration::from_secs(poll_interval_secs),
            backoff_factor,
            max_backoff: env.parsed("POLL_MAX_BACKOFF", 6u32)?,
            notify_unfit: env.flag("NOTIFY_UNFIT", true)?,
        };

        let openai = match env.optional("OPENAI_API_KEY") {
            Some(key) => {
                let mut openai = OpenAiConfig::new(key);
                if let Some(model) = env.optional("OPENAI_MODEL") {
                    openai.model = model;
                }
                if let Some(url) = env.optional("OPENAI_BASE_URL") {
                    openai.base_url = env.url("OPENAI_BASE_URL", url)?;
                }
                openai.profile = env.optional("CV_JSON");
                openai.travel_note = env.optional("TRAVEL_NOTE");
                Some(openai)
            }
            None => None,
        };

        let telegram = match (env.optional("TELEGRAM_BOT_TOKEN"), env.optional("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig::new(token, chat_id)),
            (None, None) => None,
            _ => {
                return Err(Error::config(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together",
                ));
            }
        };

        let discord = match env.optional("DISCORD_WEBHOOK_URL") {
            Some(url) => Some(DiscordConfig::new(env.url("DISCORD_WEBHOOK_URL", url)?)),
            None => None,
        };

        if telegram.is_none() && discord.is_none() {
            return Err(Error::config(
                "no notification channel: set TELEGRAM_BOT_TOKEN + TELEGRAM_CHAT_ID or DISCORD_WEBHOOK_URL",
            ));
        }

        Ok(Self {
            seed_credential,
            portal,
            browser,
            ykman_path: env.optional("YKMAN_PATH").unwrap_or_else(|| "ykman".to_string()),
            otp_account: env.optional("OTP_ACCOUNT").unwrap_or_else(|| "ets".to_string()),
            refresh,
            monitor,
            store_path: env.path("POSTES_PATH", "postes.txt"),
            openai,
            telegram,
            discord,
            persist_cookie: env.flag("PERSIST_COOKIE", false)?,
            env_file: env.path("ENV_FILE", ".env"),
            log_dir: env.path("LOG_DIR", "logs"),
            log_format: env
                .optional("LOG_FORMAT")
                .map(|v| ConsoleFormat::parse(&v))
                .unwrap_or_default(),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty trimmed value.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| Error::config(format!("{key} is not set")))
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.optional(key) {
            Some(v) => v
                .parse()
                .map_err(|_| Error::config(format!("{key} has an invalid value: {v}"))),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        let Some(v) = self.optional(key) else {
            return Ok(default);
        };
        match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::config(format!("{key} must be a boolean, got {v}"))),
        }
    }

    fn path(&self, key: &str, default: &str) -> PathBuf {
        PathBuf::from(self.optional(key).unwrap_or_else(|| default.to_string()))
    }

    fn url(&self, key: &str, value: String) -> Result<String> {
        let parsed = url::Url::parse(&value)
            .map_err(|e| Error::config(format!("{key} is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!("{key} must be an http(s) URL")));
        }
        Ok(value)
    }
}
