use std::fmt;

use openssl::{
    bn::BigNum,
    ecdsa::EcdsaSig,
    error::ErrorStack,
    hash::MessageDigest,
    nid::Nid,
    pkey::{Id, PKey, PKeyRef, Private, Public},
    sign::{Signer as OpenSslSigner, Verifier},
};

use crate::{
    error::{AcmeError, Result},
    key_pair::{KeyKind, KeyPair},
};

/// ES256 簽名中 r 與 s 各自的位元組長度。
const ES256_COMPONENT_LEN: usize = 32;

/// JWS 簽名演算法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 搭配 SHA-256。
    RS256,
    /// ECDSA P-256 搭配 SHA-256。
    ES256,
}

impl JwsAlgorithm {
    /// 依金鑰家族選擇演算法。
    pub fn for_key(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Rsa => JwsAlgorithm::RS256,
            KeyKind::Ec => JwsAlgorithm::ES256,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JwsAlgorithm::RS256 => "RS256",
            JwsAlgorithm::ES256 => "ES256",
        }
    }

    /// 根據 JWS 保護頭中的 `alg` 字串取得演算法。
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(JwsAlgorithm::RS256),
            "ES256" => Some(JwsAlgorithm::ES256),
            _ => None,
        }
    }

    fn key_kind(&self) -> KeyKind {
        match self {
            JwsAlgorithm::RS256 => KeyKind::Rsa,
            JwsAlgorithm::ES256 => KeyKind::Ec,
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn signing_error(e: ErrorStack) -> AcmeError {
    AcmeError::Signing(e.to_string())
}

/// 綁定單一私鑰的簽名器。
///
/// 演算法在建立時依金鑰家族決定（RSA → RS256、EC P-256 → ES256），
/// 之後的 [`sign`](Signer::sign) 是純函式，不持有任何可變狀態。
#[derive(Debug, Clone)]
pub struct Signer {
    algorithm: JwsAlgorithm,
    key: PKey<Private>,
}

impl Signer {
    /// 以金鑰對建立簽名器，演算法依金鑰家族自動選擇。
    ///
    /// # 錯誤
    ///
    /// 金鑰為不支援的家族（例如非 P-256 的 EC 金鑰）時回傳 [`AcmeError::Signing`]。
    pub fn new(key_pair: &KeyPair) -> Result<Self> {
        Self::with_algorithm(key_pair, JwsAlgorithm::for_key(key_pair.kind))
    }

    /// 以指定演算法建立簽名器；演算法必須與金鑰家族相符。
    pub fn with_algorithm(key_pair: &KeyPair, algorithm: JwsAlgorithm) -> Result<Self> {
        if algorithm.key_kind() != key_pair.kind {
            return Err(AcmeError::Signing(format!(
                "{algorithm} cannot be used with a {:?} key",
                key_pair.kind
            )));
        }

        match key_pair.pri_key.id() {
            Id::RSA => {}
            Id::EC => {
                let curve = key_pair
                    .pri_key
                    .ec_key()
                    .map_err(signing_error)?
                    .group()
                    .curve_name();
                if curve != Some(Nid::X9_62_PRIME256V1) {
                    return Err(AcmeError::Signing(
                        "ES256 requires a P-256 key".to_owned(),
                    ));
                }
            }
            _ => return Err(AcmeError::Signing("unsupported key type".to_owned())),
        }

        Ok(Self {
            algorithm,
            key: key_pair.pri_key.clone(),
        })
    }

    pub fn algorithm(&self) -> JwsAlgorithm {
        self.algorithm
    }

    /// 對簽名輸入產生分離式簽名。
    ///
    /// ES256 的結果是 JWS 規定的 r || s 固定長度格式，而非 DER。
    pub fn sign(&self, signing_input: &[u8]) -> Result<Vec<u8>> {
        let mut signer =
            OpenSslSigner::new(MessageDigest::sha256(), &self.key).map_err(signing_error)?;
        signer.update(signing_input).map_err(signing_error)?;
        let signature = signer.sign_to_vec().map_err(signing_error)?;

        match self.algorithm {
            JwsAlgorithm::RS256 => Ok(signature),
            JwsAlgorithm::ES256 => der_to_raw(&signature).map_err(signing_error),
        }
    }
}

fn der_to_raw(der: &[u8]) -> std::result::Result<Vec<u8>, ErrorStack> {
    let sig = EcdsaSig::from_der(der)?;
    let mut raw = sig.r().to_vec_padded(ES256_COMPONENT_LEN as i32)?;
    raw.extend(sig.s().to_vec_padded(ES256_COMPONENT_LEN as i32)?);
    Ok(raw)
}

fn raw_to_der(raw: &[u8]) -> std::result::Result<Vec<u8>, ErrorStack> {
    let (r, s) = raw.split_at(ES256_COMPONENT_LEN);
    let sig = EcdsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;
    sig.to_der()
}

/// 以公鑰驗證分離式簽名。
///
/// 簽名格式不符時回傳 `Ok(false)`；僅在 OpenSSL 本身失敗時回傳錯誤。
pub fn verify(
    algorithm: JwsAlgorithm,
    pub_key: &PKeyRef<Public>,
    signing_input: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let signature = match algorithm {
        JwsAlgorithm::RS256 => signature.to_vec(),
        JwsAlgorithm::ES256 => {
            if signature.len() != ES256_COMPONENT_LEN * 2 {
                return Ok(false);
            }
            raw_to_der(signature).map_err(signing_error)?
        }
    };

    let mut verifier = Verifier::new(MessageDigest::sha256(), pub_key).map_err(signing_error)?;
    verifier.update(signing_input).map_err(signing_error)?;
    Ok(verifier.verify(&signature).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use openssl::{
        ec::{EcGroup, EcKey},
        nid::Nid,
    };

    use super::*;

    #[test]
    fn test_rsa_selects_rs256_and_verifies() {
        let key = KeyPair::generate_rsa(2048).unwrap();
        let signer = Signer::new(&key).unwrap();
        assert_eq!(signer.algorithm(), JwsAlgorithm::RS256);

        let signature = signer.sign(b"header.payload").unwrap();
        assert!(verify(JwsAlgorithm::RS256, &key.pub_key, b"header.payload", &signature).unwrap());
        assert!(!verify(JwsAlgorithm::RS256, &key.pub_key, b"header.other", &signature).unwrap());
    }

    #[test]
    fn test_ec_selects_es256_with_raw_signature() {
        let key = KeyPair::generate_ec().unwrap();
        let signer = Signer::new(&key).unwrap();
        assert_eq!(signer.algorithm(), JwsAlgorithm::ES256);

        let signature = signer.sign(b"header.payload").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(JwsAlgorithm::ES256, &key.pub_key, b"header.payload", &signature).unwrap());

        let other = KeyPair::generate_ec().unwrap();
        assert!(!verify(JwsAlgorithm::ES256, &other.pub_key, b"header.payload", &signature).unwrap());
    }

    #[test]
    fn test_algorithm_must_match_key() {
        let key = KeyPair::generate_ec().unwrap();
        assert!(matches!(
            Signer::with_algorithm(&key, JwsAlgorithm::RS256),
            Err(AcmeError::Signing(_))
        ));
    }

    #[test]
    fn test_rejects_other_curves() {
        let group = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();
        let pri_key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let key = KeyPair::from_private_key(pri_key).unwrap();
        assert!(matches!(Signer::new(&key), Err(AcmeError::Signing(_))));
    }

    #[test]
    fn test_truncated_es256_signature_is_rejected() {
        let key = KeyPair::generate_ec().unwrap();
        assert!(!verify(JwsAlgorithm::ES256, &key.pub_key, b"x", &[0u8; 10]).unwrap());
    }
}
