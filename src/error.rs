//! 函式庫統一的錯誤型別。
//!
//! 網路、JSON 與加密相關的底層錯誤都會在請求引擎的邊界轉換成 [`AcmeError`]，
//! 呼叫端不會看到 `reqwest` 或 `serde_json` 的原始錯誤。

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::{directory::ResourceType, key_pair::KeyError};

/// ACME 錯誤類型的 URN 前綴。
pub const URN_ACME_ERROR_PREFIX: &str = "urn:acme:error:";

/// 與 ACME 伺服器互動時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum AcmeError {
    /// 伺服器回應違反協議，例如缺少 `Replay-Nonce` 或缺少必要欄位。
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    /// 伺服器回傳了不在預期集合內的狀態碼。
    #[error("Server error {status}: {detail}")]
    Server {
        status: u16,
        error_type: Option<String>,
        title: Option<String>,
        detail: String,
        instance: Option<String>,
    },
    #[error("Signing error: {0}")]
    Signing(String),
    /// 目錄中沒有對應的資源 URL。
    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceType),
    #[error("Unknown challenge type: {0}")]
    UnknownChallengeType(String),
    /// 連線或 I/O 失敗；不會自動重試。
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Configuration error: {0}")]
    Config(String),
    /// 輪詢超過 [`PollPolicy`](crate::config::PollPolicy) 的上限。
    #[error("Polling gave up after {attempts} attempts ({elapsed:?})")]
    PollLimitExceeded { attempts: u32, elapsed: Duration },
    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AcmeError>;

impl AcmeError {
    /// 若為伺服器錯誤，回傳其 HTTP 狀態碼。
    pub fn status(&self) -> Option<u16> {
        match self {
            AcmeError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 若為伺服器錯誤，回傳其問題文件的 `type`。
    pub fn error_type(&self) -> Option<&str> {
        match self {
            AcmeError::Server { error_type, .. } => error_type.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        AcmeError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for AcmeError {
    fn from(e: serde_json::Error) -> Self {
        AcmeError::decode(e)
    }
}

/// 伺服器回傳的問題文件（problem document）。
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Problem {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub title: Option<String>,
    pub detail: Option<String>,
    pub instance: Option<String>,
}

impl Problem {
    /// 將問題文件轉換為 [`AcmeError::Server`]。
    ///
    /// `detail` 缺少時依序改用：已知錯誤類型的描述、`title`、HTTP 狀態說明。
    pub fn into_error(self, status: u16, reason: Option<&str>) -> AcmeError {
        let detail = self
            .detail
            .clone()
            .or_else(|| {
                self.error_type
                    .as_deref()
                    .and_then(describe_error_type)
                    .map(str::to_owned)
            })
            .or_else(|| self.title.clone())
            .or_else(|| reason.map(str::to_owned))
            .unwrap_or_default();

        AcmeError::Server {
            status,
            error_type: self.error_type,
            title: self.title,
            detail,
            instance: self.instance,
        }
    }
}

/// 回傳 `urn:acme:error:*` 類型的預設描述。
pub fn describe_error_type(error_type: &str) -> Option<&'static str> {
    let name = error_type.strip_prefix(URN_ACME_ERROR_PREFIX)?;
    let description = match name {
        "badCSR" => "The CSR is unacceptable (e.g., due to a short key)",
        "badNonce" => "The client sent an unacceptable anti-replay nonce",
        "connection" => "The server could not connect to the client for DV",
        "dnssec" => "The server could not validate a DNSSEC signed domain",
        "malformed" => "The request message was malformed",
        "serverInternal" => "The server experienced an internal error",
        "tls" => "The server experienced a TLS error during DV",
        "unauthorized" => "The client lacks sufficient authorization",
        "unknownHost" => "The server could not resolve a domain name",
        "rateLimited" => "The request exceeds a rate limit",
        _ => return None,
    };
    Some(description)
}
