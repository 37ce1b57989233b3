use serde::{Deserialize, Serialize};

use crate::{
    base64::Base64,
    error::{AcmeError, Result},
    jwk::Jwk,
    signature::JwsAlgorithm,
};

/// 保護頭中識別簽名金鑰的方式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyReference {
    /// 內嵌完整公鑰，用於尚無帳戶參照的請求。
    Jwk(Jwk),
    /// 以帳戶 URL 作為金鑰識別符。
    KeyId(String),
}

/// 用於生成保護頭（Protected Header）的結構體。
pub struct Protection {
    alg: JwsAlgorithm,
    key: KeyReference,
}

/// JWS 保護頭的資料結構，可序列化為 JSON 並轉換為 base64url。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    /// 簽章演算法
    pub alg: String,
    /// 防止重放攻擊的一次性 nonce；金鑰輪替的內層 JWS 不帶 nonce
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl ProtectedHeader {
    /// 將保護頭序列化後轉換為 [`Base64`]。
    pub fn to_base64(&self) -> Result<Base64> {
        let json = serde_json::to_string(self)?;
        Ok(Base64::new(json.as_bytes()))
    }

    /// 解析保護頭中的演算法。
    pub fn algorithm(&self) -> Result<JwsAlgorithm> {
        JwsAlgorithm::from_name(&self.alg)
            .ok_or_else(|| AcmeError::Signing(format!("unsupported alg {}", self.alg)))
    }
}

impl Protection {
    pub fn new(alg: JwsAlgorithm, key: KeyReference) -> Self {
        Self { alg, key }
    }

    /// 以內嵌 JWK 的方式建立保護頭產生器。
    pub fn with_jwk(alg: JwsAlgorithm, jwk: Jwk) -> Self {
        Self::new(alg, KeyReference::Jwk(jwk))
    }

    /// 根據目前設定產生 [`ProtectedHeader`]，`nonce` 由呼叫端提供。
    pub fn create_header(&self, nonce: Option<String>) -> ProtectedHeader {
        let (jwk, kid) = match &self.key {
            KeyReference::Jwk(jwk) => (Some(jwk.clone()), None),
            KeyReference::KeyId(kid) => (None, Some(kid.clone())),
        };

        ProtectedHeader {
            alg: self.alg.as_str().to_owned(),
            nonce,
            jwk,
            kid,
        }
    }
}
