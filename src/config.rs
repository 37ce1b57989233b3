use std::time::Duration;

use crate::{
    error::{AcmeError, Result},
    key_pair::KeyPair,
    signature::JwsAlgorithm,
};

/// Let's Encrypt 正式環境的 v01 目錄 URL。
pub const LETS_ENCRYPT_DIRECTORY_URL: &str = "https://acme-v01.api.letsencrypt.org/directory";
/// Let's Encrypt 測試環境的 v01 目錄 URL。
pub const LETS_ENCRYPT_STAGING_DIRECTORY_URL: &str =
    "https://acme-staging.api.letsencrypt.org/directory";

/// HTTP 請求的預設逾時。
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 輪詢的上限設定。
///
/// 伺服器以 `Retry-After` 控制輪詢節奏，但客戶端必須自行限制次數與總時間。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// 包含第一次請求在內的最大送出次數。
    pub max_attempts: u32,
    /// 從第一次請求起算的總時間上限。
    pub timeout: Duration,
    /// 重試回應沒有可用的 `Retry-After` 時的等待時間。
    pub default_delay: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, timeout: Duration, default_delay: Duration) -> Self {
        Self {
            max_attempts,
            timeout,
            default_delay,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AcmeError::Config(
                "poll.max_attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 客戶端設定。
#[derive(Debug, Clone)]
pub struct Config {
    /// 伺服器目錄 URL。
    pub server: String,
    /// 帳戶金鑰對。
    pub key_pair: KeyPair,
    /// 覆寫簽名演算法；未設定時依金鑰家族選擇。
    pub algorithm: Option<JwsAlgorithm>,
    pub poll: PollPolicy,
    /// HTTP 逾時，未設定時使用 [`DEFAULT_TIMEOUT`]。
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Config {
    pub fn new(server: impl Into<String>, key_pair: KeyPair, poll: PollPolicy) -> Self {
        Self {
            server: server.into(),
            key_pair,
            algorithm: None,
            poll,
            timeout: None,
            user_agent: default_user_agent(),
        }
    }

    pub fn lets_encrypt(key_pair: KeyPair, poll: PollPolicy) -> Self {
        Self::new(LETS_ENCRYPT_DIRECTORY_URL, key_pair, poll)
    }

    pub fn lets_encrypt_staging(key_pair: KeyPair, poll: PollPolicy) -> Self {
        Self::new(LETS_ENCRYPT_STAGING_DIRECTORY_URL, key_pair, poll)
    }

    /// 實際使用的簽名演算法。
    pub fn algorithm(&self) -> JwsAlgorithm {
        self.algorithm
            .unwrap_or_else(|| JwsAlgorithm::for_key(self.key_pair.kind))
    }

    pub fn http_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    /// 檢查設定是否完整。演算法與金鑰是否相符由 [`Signer`](crate::signature::Signer) 檢查。
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(AcmeError::Config("server is required".to_owned()));
        }
        self.poll.validate()
    }
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll() -> PollPolicy {
        PollPolicy::new(5, Duration::from_secs(60), Duration::from_secs(1))
    }

    #[test]
    fn test_defaults() {
        let config = Config::new("https://example.com/directory", KeyPair::generate_ec().unwrap(), poll());
        assert_eq!(config.algorithm(), JwsAlgorithm::ES256);
        assert_eq!(config.http_timeout(), DEFAULT_TIMEOUT);
        assert!(config.user_agent.starts_with("racme-draft/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let key = KeyPair::generate_ec().unwrap();
        assert_eq!(
            Config::lets_encrypt(key.clone(), poll()).server,
            LETS_ENCRYPT_DIRECTORY_URL
        );
        assert_eq!(
            Config::lets_encrypt_staging(key, poll()).server,
            LETS_ENCRYPT_STAGING_DIRECTORY_URL
        );
    }

    #[test]
    fn test_validation() {
        let key = KeyPair::generate_ec().unwrap();
        assert!(matches!(
            Config::new("  ", key.clone(), poll()).validate(),
            Err(AcmeError::Config(_))
        ));

        let mut config = Config::new("https://example.com/directory", key, poll());
        config.poll.max_attempts = 0;
        assert!(matches!(config.validate(), Err(AcmeError::Config(_))));
    }
}
