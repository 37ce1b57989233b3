use base64::prelude::*;
use thiserror::Error;

/// Base64url 解碼失敗時的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// 輸入不是合法的 base64url（無填充）字串。
    #[error("Invalid base64url input: {0}")]
    Invalid(#[from] base64::DecodeError),
}

/// 以 base64url（RFC 4648 §5，無填充）表示的位元組資料。
///
/// JWS 的三個部分、JWK 的參數、nonce 與金鑰縮影都使用這種編碼，
/// 因此整個函式庫都透過此型別進行轉換，而不直接操作字串。
///
/// # 示例
///
/// ```
/// # use racme_draft::base64::Base64;
/// let b64 = Base64::new("Hello, World!");
/// assert_eq!(b64.base64_url(), "SGVsbG8sIFdvcmxkIQ");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64 {
    bytes: Vec<u8>,
}

impl Base64 {
    /// 以原始位元組建立 `Base64` 實例。
    pub fn new<T: AsRef<[u8]>>(input: T) -> Self {
        Self {
            bytes: input.as_ref().to_vec(),
        }
    }

    /// 從 base64url 字串建立 `Base64` 實例，並驗證其編碼。
    ///
    /// # 錯誤
    ///
    /// 含有非 base64url 字元、含有填充或長度不合法時回傳 [`DecodeError`]。
    pub fn from_url(url_encoded: &str) -> Result<Self, DecodeError> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(url_encoded)?;
        Ok(Self { bytes })
    }

    /// 取得原始位元組。
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 取出原始位元組。
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// 回傳 base64url（無填充）字串。
    pub fn base64_url(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(&self.bytes)
    }
}

/// 判斷字串是否為非空且合法的 base64url 值。
pub fn is_base64_url(value: &str) -> bool {
    !value.is_empty() && Base64::from_url(value).is_ok()
}
