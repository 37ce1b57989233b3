use openssl::{
    ec::{EcGroup, EcKey},
    error::ErrorStack,
    nid::Nid,
    pkey::{Id, PKey, Private, Public},
    rsa::Rsa,
};
use thiserror::Error;

use crate::jwk::{Jwk, JwkError};

/// 鍵相關操作的錯誤列舉，涵蓋 OpenSSL 與 JWK 轉換錯誤。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("OpenSSL error: {0}")]
    OpenSSL(#[from] ErrorStack),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("JWK error: {0}")]
    JwkError(#[from] JwkError),
}

type Result<T> = std::result::Result<T, KeyError>;

/// 金鑰家族，決定簽名演算法與 JWK 格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Rsa,
    Ec,
}

/// 表示一組非對稱加密的金鑰對。
///
/// 此結構包含金鑰家族、私鑰與對應的公鑰，並提供產生、轉換與相關操作的方法。
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// 金鑰家族（RSA 或 EC）。
    pub kind: KeyKind,
    /// 私鑰，使用 OpenSSL 的 `PKey` 封裝。
    pub pri_key: PKey<Private>,
    /// 公鑰，從私鑰派生而來。
    pub pub_key: PKey<Public>,
}

impl KeyPair {
    /// 預設的 RSA 金鑰長度。
    pub const DEFAULT_RSA_BITS: u32 = 2048;

    /// 根據演算法名稱產生新的金鑰對。
    ///
    /// # 參數
    ///
    /// - `alg_name`: 演算法名稱（不分大小寫），支援 "RSA"、"RS256"、"EC"、"ECDSA"、"ES256"。
    /// - `bits`: 可選的金鑰長度，僅適用於 RSA，預設為 2048 位元。
    pub fn new(alg_name: &str, bits: Option<u32>) -> Result<Self> {
        match Self::normalize_algorithm_name(alg_name)? {
            KeyKind::Rsa => Self::generate_rsa(bits.unwrap_or(Self::DEFAULT_RSA_BITS)),
            KeyKind::Ec => Self::generate_ec(),
        }
    }

    /// 產生 RSA 金鑰對。
    pub fn generate_rsa(bits: u32) -> Result<Self> {
        let pri_key = PKey::from_rsa(Rsa::generate(bits)?)?;
        Self::from_private_key(pri_key)
    }

    /// 產生 P-256 曲線上的 EC 金鑰對。
    pub fn generate_ec() -> Result<Self> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let pri_key = PKey::from_ec_key(EcKey::generate(&group)?)?;
        Self::from_private_key(pri_key)
    }

    /// 根據 PEM 格式的私鑰資料建立一組金鑰對。
    pub fn from_pem(pri_key_pem: &[u8]) -> Result<Self> {
        let pri_key = PKey::private_key_from_pem(pri_key_pem)?;
        Self::from_private_key(pri_key)
    }

    /// 以既有的私鑰建立金鑰對，公鑰由私鑰派生。
    pub fn from_private_key(pri_key: PKey<Private>) -> Result<Self> {
        let (kind, pub_key) = Self::derive_public_key(&pri_key)?;
        Ok(Self {
            kind,
            pri_key,
            pub_key,
        })
    }

    /// 以 PKCS#8 PEM 格式匯出私鑰。
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        Ok(self.pri_key.private_key_to_pem_pkcs8()?)
    }

    /// 回傳公鑰的 JWK 表示。
    pub fn jwk(&self) -> Result<Jwk> {
        Ok(Jwk::new(self)?)
    }

    /// 計算並回傳公鑰的 JWK 縮影（RFC 7638），以 base64url 字串表示。
    pub fn thumbprint(&self) -> Result<String> {
        Ok(self.jwk()?.thumbprint()?)
    }

    /// 取得金鑰的位元長度，例如 RSA 2048 或 EC 256。
    pub fn key_parameters(&self) -> u32 {
        self.pri_key.bits()
    }

    fn normalize_algorithm_name(name: &str) -> Result<KeyKind> {
        match name.to_uppercase().as_str() {
            "RSA" | "RS256" => Ok(KeyKind::Rsa),
            "EC" | "ECDSA" | "ES256" => Ok(KeyKind::Ec),
            _ => Err(KeyError::UnsupportedAlgorithm(name.to_owned())),
        }
    }

    fn derive_public_key(pri_key: &PKey<Private>) -> Result<(KeyKind, PKey<Public>)> {
        match pri_key.id() {
            Id::RSA => {
                let rsa = pri_key.rsa()?;
                let pub_rsa =
                    Rsa::from_public_components(rsa.n().to_owned()?, rsa.e().to_owned()?)?;
                Ok((KeyKind::Rsa, PKey::from_rsa(pub_rsa)?))
            }
            Id::EC => {
                let ec = pri_key.ec_key()?;
                let pub_ec = EcKey::from_public_key(ec.group(), ec.public_key())?;
                Ok((KeyKind::Ec, PKey::from_ec_key(pub_ec)?))
            }
            other => Err(KeyError::UnsupportedAlgorithm(format!(
                "key type {}",
                other.as_raw()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_by_name() {
        let key = KeyPair::new("ecdsa", None).unwrap();
        assert_eq!(key.kind, KeyKind::Ec);
        assert_eq!(key.key_parameters(), 256);

        assert!(matches!(
            KeyPair::new("dsa", None),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_rsa_bits() {
        let key = KeyPair::generate_rsa(2048).unwrap();
        assert_eq!(key.kind, KeyKind::Rsa);
        assert_eq!(key.key_parameters(), 2048);
    }

    #[test]
    fn test_pem_round_trip_keeps_thumbprint() {
        let key = KeyPair::generate_ec().unwrap();
        let pem = key.to_pem().unwrap();
        let restored = KeyPair::from_pem(&pem).unwrap();
        assert_eq!(restored.kind, KeyKind::Ec);
        assert_eq!(key.thumbprint().unwrap(), restored.thumbprint().unwrap());
    }

    #[test]
    fn test_unsupported_key_family() {
        let ed = PKey::generate_ed25519().unwrap();
        assert!(matches!(
            KeyPair::from_private_key(ed),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
    }
}
