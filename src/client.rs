//! 客戶端入口：讀取設定、探索目錄，並提供各資源的操作。

use std::sync::Arc;

use crate::{
    authorization::AuthorizationOps,
    challenge::ChallengeOps,
    config::Config,
    directory::Directory,
    error::Result,
    registration::RegistrationOps,
    request::{CancellationToken, RequestEngine},
    transport::{HttpClient, ReqwestClient},
};

/// ACME v01 客戶端。
///
/// 建立時會 GET 目錄 URL，回應中的 nonce 供第一個簽名請求使用。
/// 同一個客戶端的請求共用單一 nonce，因此請依序送出。
pub struct AcmeClient {
    config: Config,
    engine: RequestEngine,
    directory: Directory,
}

impl AcmeClient {
    /// 以預設的 HTTP 傳輸建立客戶端。
    ///
    /// # 錯誤
    ///
    /// 設定不完整時回傳 [`AcmeError::Config`](crate::error::AcmeError::Config)；
    /// 目錄無法取得或解析時回傳對應的傳輸或解碼錯誤。
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let http = ReqwestClient::new(config.http_timeout(), &config.user_agent)?;
        Self::with_http_client(config, Arc::new(http))
    }

    /// 以自訂的 HTTP 傳輸建立客戶端。
    pub fn with_http_client(config: Config, http: Arc<dyn HttpClient>) -> Result<Self> {
        config.validate()?;
        let engine = RequestEngine::new(
            http,
            &config.key_pair,
            config.algorithm(),
            config.server.clone(),
            config.poll,
        )?;

        let directory = engine.get(&config.server, &[200], |response| {
            Directory::from_json(&response.body)
        })?;
        log::info!("Loaded directory from {}", config.server);

        Ok(Self {
            config,
            engine,
            directory,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn engine(&self) -> &RequestEngine {
        &self.engine
    }

    pub fn registration(&self) -> RegistrationOps<'_> {
        RegistrationOps::new(&self.engine, &self.directory)
    }

    pub fn authorization(&self) -> AuthorizationOps<'_> {
        AuthorizationOps::new(&self.engine, &self.directory)
    }

    pub fn challenges(&self) -> ChallengeOps<'_> {
        ChallengeOps::new(&self.engine)
    }

    /// 取消進行中與之後的輪詢。
    pub fn cancellation_token(&self) -> CancellationToken {
        self.engine.cancellation_token()
    }
}
