//! 請求引擎：所有操作存取網路的唯一路徑。
//!
//! 負責簽名、送出、檢查狀態碼、補充 nonce，以及依 `Retry-After` 輪詢。

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::{
    config::PollPolicy,
    error::{AcmeError, Problem, Result},
    jwk::Jwk,
    jws::Jws,
    key_pair::KeyPair,
    nonce::NonceManager,
    payload::PayloadT,
    protection::Protection,
    signature::{JwsAlgorithm, Signer},
    transport::{HttpClient, HttpRequest, HttpResponse},
};

/// 輪詢處理函式的結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// 已取得最終結果。
    Ready(T),
    /// 伺服器尚未完成，等待指定時間後重送。
    RetryAfter(Duration),
}

/// 可跨執行緒觸發的取消信號，用於中斷輪詢等待。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 觸發取消並喚醒所有等待中的輪詢。
    pub fn cancel(&self) {
        let (cancelled, condvar) = &*self.inner;
        *cancelled.lock() = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// 阻塞目前執行緒 `duration`，期間若被取消則回傳 [`AcmeError::Cancelled`]。
    ///
    /// 在期限前被喚醒但未取消時只記錄警告，並繼續等待剩餘時間。
    /// 期限超出 `Instant` 可表示的範圍時，只有取消能結束等待。
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(duration);
        let (cancelled, condvar) = &*self.inner;
        let mut guard = cancelled.lock();

        loop {
            if *guard {
                return Err(AcmeError::Cancelled);
            }
            let Some(deadline) = deadline else {
                condvar.wait(&mut guard);
                continue;
            };
            if Instant::now() >= deadline {
                return Ok(());
            }
            let result = condvar.wait_until(&mut guard, deadline);
            if !result.timed_out() && !*guard {
                log::warn!("Poll sleep interrupted before its deadline, resuming");
            }
        }
    }
}

/// 解析 `Retry-After` 標頭：HTTP 日期或秒數。
///
/// 日期早於 `now` 時回傳零；無法解析時回傳 `None`。
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    match DateTime::parse_from_rfc2822(value) {
        Ok(date) => Some(
            date.with_timezone(&Utc)
                .signed_duration_since(now)
                .to_std()
                .unwrap_or(Duration::ZERO),
        ),
        Err(e) => {
            log::warn!("Ignoring unparseable Retry-After {value:?}: {e}");
            None
        }
    }
}

/// 讀取回應中的 `Retry-After`。
pub fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("Retry-After")
        .and_then(|value| parse_retry_after(value, Utc::now()))
}

/// 將非預期狀態碼的回應轉換為 [`AcmeError::Server`]。
///
/// 主體可解析為問題文件時使用其欄位，否則以原始主體文字或狀態說明作為描述。
pub fn server_error(response: &HttpResponse) -> AcmeError {
    let reason = response.reason();
    match serde_json::from_slice::<Problem>(&response.body) {
        Ok(problem) => problem.into_error(response.status, reason),
        Err(_) => {
            let text = response.text();
            let detail = if text.trim().is_empty() {
                reason
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("HTTP {}", response.status))
            } else {
                text
            };
            AcmeError::Server {
                status: response.status,
                error_type: None,
                title: None,
                detail,
                instance: None,
            }
        }
    }
}

/// 簽名並送出 ACME 請求的引擎。
///
/// 引擎持有帳戶的簽名器與 nonce 槽位，可在多個操作之間共用。
pub struct RequestEngine {
    http: Arc<dyn HttpClient>,
    nonces: NonceManager,
    signer: Signer,
    jwk: Jwk,
    directory_url: String,
    poll: PollPolicy,
    cancellation: CancellationToken,
}

impl RequestEngine {
    /// 建立請求引擎。
    ///
    /// `directory_url` 同時是 nonce 探測請求的目標。
    pub fn new(
        http: Arc<dyn HttpClient>,
        key_pair: &KeyPair,
        algorithm: JwsAlgorithm,
        directory_url: impl Into<String>,
        poll: PollPolicy,
    ) -> Result<Self> {
        Ok(Self {
            http,
            nonces: NonceManager::new(),
            signer: Signer::with_algorithm(key_pair, algorithm)?,
            jwk: key_pair.jwk()?,
            directory_url: directory_url.into(),
            poll,
            cancellation: CancellationToken::new(),
        })
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// 帳戶公鑰的 JWK。
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// 取得可從其他執行緒中斷輪詢的取消信號。
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub(crate) fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    /// 以帳戶金鑰簽名 `payload`，每次呼叫都取用新的 nonce。
    pub fn sign<P: PayloadT>(&self, payload: &P) -> Result<Jws> {
        payload.validate()?;
        let nonce = self.nonces.take(self.http(), &self.directory_url)?;
        let header = Protection::with_jwk(self.signer.algorithm(), self.jwk.clone())
            .create_header(Some(nonce));
        Jws::sign(&header, payload, &self.signer)
    }

    /// 簽名並 POST 到 `url`，狀態碼須在 `expected` 內，成功時交給 `handler` 解碼。
    pub fn send<P, T, F>(&self, url: &str, payload: &P, expected: &[u16], handler: F) -> Result<T>
    where
        P: PayloadT,
        F: FnOnce(HttpResponse) -> Result<T>,
    {
        let response = self.post(url, payload, expected)?;
        handler(response)
    }

    /// 不簽名的 GET 請求。
    pub fn get<T, F>(&self, url: &str, expected: &[u16], handler: F) -> Result<T>
    where
        F: FnOnce(HttpResponse) -> Result<T>,
    {
        log::debug!("GET {url}");
        let response = self.dispatch(HttpRequest::get(url), expected)?;
        handler(response)
    }

    /// 以輪詢方式送出請求，直到處理函式回傳 [`Outcome::Ready`]。
    ///
    /// 每次重送都會重新簽名並使用新的 nonce。次數或總時間超過
    /// [`PollPolicy`] 時回傳 [`AcmeError::PollLimitExceeded`]；會超出時間上限的等待不會開始。
    pub fn poll<P, T, F>(&self, url: &str, payload: &P, expected: &[u16], mut handler: F) -> Result<T>
    where
        P: PayloadT,
        F: FnMut(HttpResponse) -> Result<Outcome<T>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(AcmeError::Cancelled);
            }

            attempts += 1;
            let response = self.post(url, payload, expected)?;
            let delay = match handler(response)? {
                Outcome::Ready(value) => return Ok(value),
                Outcome::RetryAfter(delay) => delay,
            };

            let elapsed = started.elapsed();
            if attempts >= self.poll.max_attempts
                || delay > self.poll.timeout.saturating_sub(elapsed)
            {
                return Err(AcmeError::PollLimitExceeded { attempts, elapsed });
            }

            log::debug!("{url} not ready after attempt {attempts}, retrying in {delay:?}");
            self.cancellation.sleep(delay)?;
        }
    }

    /// [`poll`](RequestEngine::poll) 的常用形式：`success` 交給 `handler`，
    /// `retry` 內的狀態碼依 `Retry-After` 等待後重送，其餘狀態碼為錯誤。
    pub fn send_with_polling<P, T, F>(
        &self,
        url: &str,
        payload: &P,
        success: u16,
        retry: &[u16],
        mut handler: F,
    ) -> Result<T>
    where
        P: PayloadT,
        F: FnMut(HttpResponse) -> Result<T>,
    {
        let mut expected = vec![success];
        expected.extend_from_slice(retry);
        let default_delay = self.poll.default_delay;

        self.poll(url, payload, &expected, |response| {
            if response.status == success {
                handler(response).map(Outcome::Ready)
            } else {
                Ok(Outcome::RetryAfter(
                    retry_after(&response).unwrap_or(default_delay),
                ))
            }
        })
    }

    fn post<P: PayloadT>(&self, url: &str, payload: &P, expected: &[u16]) -> Result<HttpResponse> {
        let jws = self.sign(payload)?;
        log::debug!("POST {url} ({})", payload.resource());
        self.dispatch(HttpRequest::post_jose(url, jws.to_compact()), expected)
    }

    fn dispatch(&self, request: HttpRequest, expected: &[u16]) -> Result<HttpResponse> {
        let response = self.http.execute(request)?;
        log::debug!("{} responded {}", response.url, response.status);

        if !expected.contains(&response.status) {
            self.nonces.restock(&response);
            return Err(server_error(&response));
        }

        self.nonces.observe(&response)?;
        Ok(response)
    }
}
