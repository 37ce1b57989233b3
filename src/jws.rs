//! JSON Web Signature (JWS) 的緊湊序列化：建立、解析與驗證。

use serde::{de::DeserializeOwned, Serialize};
use openssl::pkey::{PKeyRef, Public};

use crate::{
    base64::Base64,
    error::{AcmeError, Result},
    protection::ProtectedHeader,
    signature::{self, Signer},
};

/// 表示一個已簽名的 JWS 物件。
///
/// 三個部分皆已經過 base64url 編碼，緊湊序列化為 `header.payload.signature`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    header: String,
    payload: String,
    signature: String,
}

impl Jws {
    /// 以保護頭與負載建立並簽名 JWS。
    ///
    /// 簽名輸入為 `base64url(header) + "." + base64url(payload)`。
    pub fn sign<P: Serialize + ?Sized>(
        header: &ProtectedHeader,
        payload: &P,
        signer: &Signer,
    ) -> Result<Self> {
        let header_b64 = header.to_base64()?.base64_url();
        let payload_b64 = Base64::new(serde_json::to_vec(payload)?).base64_url();

        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = signer.sign(signing_input.as_bytes())?;

        Ok(Jws {
            header: header_b64,
            payload: payload_b64,
            signature: Base64::new(signature).base64_url(),
        })
    }

    /// 解析緊湊序列化的 JWS。
    pub fn parse(compact: &str) -> Result<Self> {
        let mut parts = compact.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AcmeError::Decode(
                "JWS compact serialization must have three parts".to_owned(),
            ));
        };

        for part in [header, payload, signature] {
            Base64::from_url(part).map_err(AcmeError::decode)?;
        }

        Ok(Jws {
            header: header.to_owned(),
            payload: payload.to_owned(),
            signature: signature.to_owned(),
        })
    }

    /// 回傳緊湊序列化字串。
    pub fn to_compact(&self) -> String {
        format!("{}.{}.{}", self.header, self.payload, self.signature)
    }

    /// 解碼保護頭。
    pub fn header(&self) -> Result<ProtectedHeader> {
        decode_json(&self.header)
    }

    /// 將負載解碼為指定型別。
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        decode_json(&self.payload)
    }

    /// 以指定公鑰驗證簽名，演算法取自保護頭。
    pub fn verify(&self, pub_key: &PKeyRef<Public>) -> Result<bool> {
        let algorithm = self.header()?.algorithm()?;
        let signature = Base64::from_url(&self.signature).map_err(AcmeError::decode)?;
        let signing_input = format!("{}.{}", self.header, self.payload);
        signature::verify(
            algorithm,
            pub_key,
            signing_input.as_bytes(),
            signature.as_bytes(),
        )
    }

    /// 以保護頭內嵌的 `jwk` 驗證簽名；沒有內嵌金鑰時回傳錯誤。
    pub fn verify_embedded(&self) -> Result<bool> {
        let jwk = self
            .header()?
            .jwk
            .ok_or_else(|| AcmeError::Signing("JWS header carries no jwk".to_owned()))?;
        let pub_key = jwk
            .to_public_key()
            .map_err(|e| AcmeError::Signing(e.to_string()))?;
        self.verify(&pub_key)
    }
}

fn decode_json<T: DeserializeOwned>(part: &str) -> Result<T> {
    let bytes = Base64::from_url(part).map_err(AcmeError::decode)?;
    Ok(serde_json::from_slice(bytes.as_bytes())?)
}
