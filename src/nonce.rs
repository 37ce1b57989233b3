use parking_lot::Mutex;

use crate::{
    base64::is_base64_url,
    error::{AcmeError, Result},
    transport::{HttpClient, HttpRequest, HttpResponse},
};

/// 回應中攜帶 nonce 的標頭名稱。
pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// 管理單一槽位的防重放 nonce。
///
/// 每個簽名請求透過 [`take`](NonceManager::take) 取出並清空槽位，
/// 每個回應再透過 [`observe`](NonceManager::observe) 補入新值，
/// 因此同一個 nonce 最多只會被用在一個請求上。
#[derive(Debug, Default)]
pub struct NonceManager {
    slot: Mutex<Option<String>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出目前的 nonce 並清空槽位。
    ///
    /// 槽位為空時，對 `probe_url`（目錄 URL）送出 HEAD 請求，
    /// 直接回傳探測回應中的 nonce，不會存入槽位。
    pub fn take(&self, http: &dyn HttpClient, probe_url: &str) -> Result<String> {
        if let Some(nonce) = self.slot.lock().take() {
            log::trace!("Using cached nonce {nonce}");
            return Ok(nonce);
        }

        log::debug!("Nonce cache empty, probing {probe_url}");
        let response = http.execute(HttpRequest::head(probe_url))?;
        extract(&response)
    }

    /// 從回應擷取 `Replay-Nonce` 並覆寫槽位。
    ///
    /// # 錯誤
    ///
    /// 標頭缺少或不是合法 base64url 時回傳 [`AcmeError::ProtocolViolation`]，
    /// 槽位維持原狀。
    pub fn observe(&self, response: &HttpResponse) -> Result<()> {
        let nonce = extract(response)?;
        log::trace!("Restocked nonce {nonce}");
        *self.slot.lock() = Some(nonce);
        Ok(())
    }

    /// 寬鬆版本的 [`observe`](NonceManager::observe)，用於錯誤回應：
    /// 有合法 nonce 就存入，否則忽略。回傳是否成功補入。
    pub fn restock(&self, response: &HttpResponse) -> bool {
        match extract(response) {
            Ok(nonce) => {
                *self.slot.lock() = Some(nonce);
                true
            }
            Err(_) => false,
        }
    }

    /// 目前是否有可用的 nonce。
    pub fn is_stocked(&self) -> bool {
        self.slot.lock().is_some()
    }
}

fn extract(response: &HttpResponse) -> Result<String> {
    let nonce = response.header(REPLAY_NONCE).ok_or_else(|| {
        AcmeError::ProtocolViolation(format!(
            "response from {} doesn't contain a Replay-Nonce header",
            response.url
        ))
    })?;

    if !is_base64_url(nonce) {
        return Err(AcmeError::ProtocolViolation(format!(
            "invalid Replay-Nonce value {nonce:?}"
        )));
    }
    Ok(nonce.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{
        mock::{reply, MockHttp},
        Method,
    };

    const DIRECTORY: &str = "https://example.com/directory";

    #[test]
    fn test_take_clears_slot() {
        let http = MockHttp::new();
        let nonces = NonceManager::new();
        nonces.observe(&reply(200, "bm9uY2UtMQ")).unwrap();

        assert!(nonces.is_stocked());
        assert_eq!(nonces.take(&http, DIRECTORY).unwrap(), "bm9uY2UtMQ");
        assert!(!nonces.is_stocked());
        assert!(http.requests().is_empty());
    }

    #[test]
    fn test_empty_slot_probes_directory() {
        let http = MockHttp::new();
        http.push(reply(200, "cHJvYmU"));
        let nonces = NonceManager::new();

        assert_eq!(nonces.take(&http, DIRECTORY).unwrap(), "cHJvYmU");
        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Head);
        assert_eq!(requests[0].url, DIRECTORY);
        assert!(!nonces.is_stocked());
    }

    #[test]
    fn test_observe_rejects_missing_or_invalid_nonce() {
        let nonces = NonceManager::new();
        assert!(matches!(
            nonces.observe(&HttpResponse::new(200, DIRECTORY)),
            Err(AcmeError::ProtocolViolation(_))
        ));
        assert!(matches!(
            nonces.observe(&reply(200, "not base64!")),
            Err(AcmeError::ProtocolViolation(_))
        ));
        assert!(!nonces.is_stocked());
    }

    #[test]
    fn test_observe_requires_canonical_unpadded_nonce() {
        let nonces = NonceManager::new();
        for nonce in ["bm9uY2U=", "bm9uY2V"] {
            assert!(matches!(
                nonces.observe(&reply(200, nonce)),
                Err(AcmeError::ProtocolViolation(_))
            ));
        }
        nonces.observe(&reply(200, "bm9uY2U")).unwrap();
        assert!(nonces.is_stocked());
    }

    #[test]
    fn test_observe_overwrites_previous_value() {
        let http = MockHttp::new();
        let nonces = NonceManager::new();
        nonces.observe(&reply(200, "b2xk")).unwrap();
        nonces.observe(&reply(200, "bmV3")).unwrap();
        assert_eq!(nonces.take(&http, DIRECTORY).unwrap(), "bmV3");
    }

    #[test]
    fn test_restock_ignores_bad_headers() {
        let nonces = NonceManager::new();
        assert!(!nonces.restock(&HttpResponse::new(400, DIRECTORY)));
        assert!(nonces.restock(&reply(400, "ZXJy")));
        assert!(nonces.is_stocked());
    }

    #[test]
    fn test_probe_without_nonce_fails() {
        let http = MockHttp::new();
        http.push(HttpResponse::new(200, ""));
        let nonces = NonceManager::new();
        assert!(matches!(
            nonces.take(&http, DIRECTORY),
            Err(AcmeError::ProtocolViolation(_))
        ));
    }
}
