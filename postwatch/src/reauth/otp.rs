//! One-time passwords from a YubiKey OATH slot.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::session::RefreshError;

/// Time allowed for `ykman` to answer (touch-required slots need a human).
const YKMAN_TIMEOUT: Duration = Duration::from_secs(20);

/// Generates TOTP codes by shelling out to `ykman oath accounts code`.
#[derive(Debug, Clone)]
pub struct YkmanOtp {
    ykman_path: String,
    account: String,
}

impl YkmanOtp {
    pub fn new(ykman_path: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            ykman_path: ykman_path.into(),
            account: account.into(),
        }
    }

    /// Produce the current code for the configured account.
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn code(&self) -> Result<String, RefreshError> {
        let mut cmd = tokio::process::Command::new(&self.ykman_path);
        cmd.args(["oath", "accounts", "code", &self.account, "-s"])
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(YKMAN_TIMEOUT, cmd.output())
            .await
            .map_err(|_| RefreshError::Otp(format!("ykman timed out after {YKMAN_TIMEOUT:?}")))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RefreshError::Otp(format!(
                "ykman exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let code = parse_code(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Generated one-time code");
        Ok(code)
    }
}

/// Extract the numeric code from `ykman ... -s` output.
fn parse_code(stdout: &str) -> Result<String, RefreshError> {
    let code = stdout.trim();
    if code.len() >= 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code.to_string())
    } else {
        Err(RefreshError::Otp(format!("unexpected ykman output: {code:?}")))
    }
}
