use openssl::{
    bn::{BigNum, BigNumContext},
    ec::{EcGroup, EcKey},
    nid::Nid,
    pkey::{PKey, Public},
    rsa::Rsa,
    sha::sha256,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    base64::Base64,
    key_pair::{KeyKind, KeyPair},
};

/// JWK 相關操作的錯誤類型。
#[derive(Debug, Error)]
pub enum JwkError {
    /// 不支援的金鑰類型或曲線。
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// 金鑰轉換失敗。
    #[error("Failed to convert key: {0}")]
    KeyConversionError(String),
    /// 序列化錯誤。
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<openssl::error::ErrorStack> for JwkError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        JwkError::KeyConversionError(e.to_string())
    }
}

/// P-256 座標的位元組長度。
const P256_COORDINATE_LEN: i32 = 32;

/// JSON Web Key (JWK) 的封裝，支援 RSA 與 EC (P-256) 公鑰。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum Jwk {
    #[serde(rename = "RSA")]
    Rsa(RsaJwk),
    #[serde(rename = "EC")]
    Ec(EcJwk),
}

/// RSA 格式的 JWK，包含必要的公開參數。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaJwk {
    n: String,
    e: String,
}

/// EC 格式的 JWK。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcJwk {
    crv: String,
    x: String,
    y: String,
}

impl RsaJwk {
    fn from_key_pair(key_pair: &KeyPair) -> Result<Self, JwkError> {
        let rsa = key_pair.pub_key.rsa()?;

        Ok(RsaJwk {
            n: Base64::new(rsa.n().to_vec()).base64_url(),
            e: Base64::new(rsa.e().to_vec()).base64_url(),
        })
    }

    fn to_public_key(&self) -> Result<PKey<Public>, JwkError> {
        let n = BigNum::from_slice(&decode_param(&self.n)?)?;
        let e = BigNum::from_slice(&decode_param(&self.e)?)?;
        Ok(PKey::from_rsa(Rsa::from_public_components(n, e)?)?)
    }
}

impl EcJwk {
    fn from_key_pair(key_pair: &KeyPair) -> Result<Self, JwkError> {
        let ec = key_pair.pub_key.ec_key()?;
        let group = ec.group();
        if group.curve_name() != Some(Nid::X9_62_PRIME256V1) {
            return Err(JwkError::UnsupportedAlgorithm(
                "only the P-256 curve is supported".to_owned(),
            ));
        }

        let mut ctx = BigNumContext::new()?;
        let mut x = BigNum::new()?;
        let mut y = BigNum::new()?;
        ec.public_key()
            .affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)?;

        Ok(EcJwk {
            crv: "P-256".to_owned(),
            x: Base64::new(x.to_vec_padded(P256_COORDINATE_LEN)?).base64_url(),
            y: Base64::new(y.to_vec_padded(P256_COORDINATE_LEN)?).base64_url(),
        })
    }

    fn to_public_key(&self) -> Result<PKey<Public>, JwkError> {
        if self.crv != "P-256" {
            return Err(JwkError::UnsupportedAlgorithm(self.crv.clone()));
        }
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let x = BigNum::from_slice(&decode_param(&self.x)?)?;
        let y = BigNum::from_slice(&decode_param(&self.y)?)?;
        let ec = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
        Ok(PKey::from_ec_key(ec)?)
    }
}

fn decode_param(value: &str) -> Result<Vec<u8>, JwkError> {
    Base64::from_url(value)
        .map(Base64::into_bytes)
        .map_err(|e| JwkError::KeyConversionError(e.to_string()))
}

impl Jwk {
    /// 根據給定的金鑰對建立對應的 JWK。
    pub fn new(key_pair: &KeyPair) -> Result<Self, JwkError> {
        match key_pair.kind {
            KeyKind::Rsa => Ok(Jwk::Rsa(RsaJwk::from_key_pair(key_pair)?)),
            KeyKind::Ec => Ok(Jwk::Ec(EcJwk::from_key_pair(key_pair)?)),
        }
    }

    /// 從 JSON 值解析 JWK，例如帳戶回應中的 `key` 欄位。
    pub fn from_value(value: &Value) -> Result<Self, JwkError> {
        Ok(Jwk::deserialize(value)?)
    }

    /// 將 JWK 轉換成 JSON 值，用於放入保護頭。
    pub fn to_value(&self) -> Result<Value, JwkError> {
        Ok(serde_json::to_value(self)?)
    }

    /// 產生 RFC 7638 縮影所需的正規化 JSON：僅含必要成員、依字典序排列、無空白。
    pub fn to_acme_json(&self) -> Result<String, JwkError> {
        let mut map = Map::new();
        match self {
            Jwk::Rsa(jwk) => {
                map.insert("e".to_string(), Value::String(jwk.e.clone()));
                map.insert("kty".to_string(), Value::String("RSA".to_string()));
                map.insert("n".to_string(), Value::String(jwk.n.clone()));
            }
            Jwk::Ec(jwk) => {
                map.insert("crv".to_string(), Value::String(jwk.crv.clone()));
                map.insert("kty".to_string(), Value::String("EC".to_string()));
                map.insert("x".to_string(), Value::String(jwk.x.clone()));
                map.insert("y".to_string(), Value::String(jwk.y.clone()));
            }
        }

        serde_json::to_string(&Value::Object(map)).map_err(JwkError::from)
    }

    /// 計算 JWK 縮影：base64url(SHA-256(正規化 JSON))。
    pub fn thumbprint(&self) -> Result<String, JwkError> {
        let hash = sha256(self.to_acme_json()?.as_bytes());
        Ok(Base64::new(hash).base64_url())
    }

    /// 將 JWK 還原為 OpenSSL 公鑰，用於驗證簽名。
    pub fn to_public_key(&self) -> Result<PKey<Public>, JwkError> {
        match self {
            Jwk::Rsa(jwk) => jwk.to_public_key(),
            Jwk::Ec(jwk) => jwk.to_public_key(),
        }
    }

    /// 回傳 JWK 的金鑰家族。
    pub fn kind(&self) -> KeyKind {
        match self {
            Jwk::Rsa(_) => KeyKind::Rsa,
            Jwk::Ec(_) => KeyKind::Ec,
        }
    }
}
