use std::{collections::HashMap, fmt, sync::OnceLock};

use openssl::sha::sha256;
use serde::{Deserialize, Serialize};

use crate::{
    authorization::Status,
    base64::Base64,
    error::{AcmeError, Result},
    jwk::Jwk,
    key_pair::KeyError,
    payload::ChallengeResponsePayload,
    request::RequestEngine,
    transport::HttpResponse,
};

/// HTTP-01 驗證檔案所在的路徑前綴。
pub const HTTP01_PATH_PREFIX: &str = "/.well-known/acme-challenge/";
/// DNS-01 TXT 記錄名稱的前綴。
pub const DNS01_RECORD_PREFIX: &str = "_acme-challenge";
/// TLS-SNI-01 驗證名稱的後綴。
pub const TLS_SNI01_SUFFIX: &str = "acme.invalid";

/// 表示 ACME 挑戰的類型，可用於選擇相應的驗證策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    Dns01,
    Http01,
    TlsSni01,
}

impl ChallengeType {
    /// 根據線上格式的字串返回對應的挑戰類型，若不支援則返回 `None`。
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dns-01" => Some(Self::Dns01),
            "http-01" => Some(Self::Http01),
            "tls-sni-01" => Some(Self::TlsSni01),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dns01 => "dns-01",
            Self::Http01 => "http-01",
            Self::TlsSni01 => "tls-sni-01",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 帶有 token 的挑戰共用欄位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChallenge {
    pub status: Status,
    pub uri: String,
    pub token: String,
    /// 挑戰就緒後才會出現；可能來自伺服器，也可能由客戶端計算。
    pub key_authorization: Option<String>,
}

/// 表示一個 ACME 驗證挑戰，依 `type` 區分。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Dns01(TokenChallenge),
    Http01(TokenChallenge),
    TlsSni01(TokenChallenge),
}

/// 挑戰的線上格式。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawChallenge {
    #[serde(rename = "type")]
    challenge_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<Status>,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    token: String,
    #[serde(
        rename = "keyAuthorization",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    key_authorization: Option<String>,
}

impl TryFrom<RawChallenge> for Challenge {
    type Error = AcmeError;

    fn try_from(raw: RawChallenge) -> Result<Self> {
        let challenge_type = ChallengeType::from_name(&raw.challenge_type)
            .ok_or_else(|| AcmeError::UnknownChallengeType(raw.challenge_type.clone()))?;

        let inner = TokenChallenge {
            status: raw.status.unwrap_or_default(),
            uri: raw.uri,
            token: raw.token,
            key_authorization: raw.key_authorization,
        };

        Ok(match challenge_type {
            ChallengeType::Dns01 => Challenge::Dns01(inner),
            ChallengeType::Http01 => Challenge::Http01(inner),
            ChallengeType::TlsSni01 => Challenge::TlsSni01(inner),
        })
    }
}

impl From<&Challenge> for RawChallenge {
    fn from(challenge: &Challenge) -> Self {
        let inner = challenge.inner();
        RawChallenge {
            challenge_type: challenge.challenge_type().as_str().to_owned(),
            status: Some(inner.status),
            uri: inner.uri.clone(),
            token: inner.token.clone(),
            key_authorization: inner.key_authorization.clone(),
        }
    }
}

/// 計算 key authorization：`token + "." + JWK 縮影`。
pub fn key_authorization(token: &str, jwk: &Jwk) -> Result<String> {
    let thumbprint = jwk
        .thumbprint()
        .map_err(|e| AcmeError::Key(KeyError::from(e)))?;
    Ok(format!("{token}.{thumbprint}"))
}

/// DNS-01 的 TXT 記錄名稱。
pub fn dns_record_name(domain: &str) -> String {
    format!("{DNS01_RECORD_PREFIX}.{}", domain.trim_end_matches('.'))
}

/// DNS-01 的 TXT 記錄值：base64url(SHA-256(key authorization))。
pub fn dns_txt_value(key_authorization: &str) -> String {
    Base64::new(sha256(key_authorization.as_bytes())).base64_url()
}

/// TLS-SNI-01 的 SAN：`z[0..32].z[32..64].acme.invalid`，z 為小寫十六進位的 SHA-256。
pub fn tls_sni_name(key_authorization: &str) -> String {
    let z: String = sha256(key_authorization.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{}.{}.{TLS_SNI01_SUFFIX}", &z[..32], &z[32..])
}

impl Challenge {
    /// 從 JSON 主體解碼挑戰。
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawChallenge = serde_json::from_slice(body)?;
        Challenge::try_from(raw)
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(RawChallenge::from(self))?)
    }

    pub fn challenge_type(&self) -> ChallengeType {
        match self {
            Challenge::Dns01(_) => ChallengeType::Dns01,
            Challenge::Http01(_) => ChallengeType::Http01,
            Challenge::TlsSni01(_) => ChallengeType::TlsSni01,
        }
    }

    pub fn inner(&self) -> &TokenChallenge {
        match self {
            Challenge::Dns01(inner) | Challenge::Http01(inner) | Challenge::TlsSni01(inner) => {
                inner
            }
        }
    }

    fn inner_mut(&mut self) -> &mut TokenChallenge {
        match self {
            Challenge::Dns01(inner) | Challenge::Http01(inner) | Challenge::TlsSni01(inner) => {
                inner
            }
        }
    }

    pub fn status(&self) -> Status {
        self.inner().status
    }

    pub fn uri(&self) -> &str {
        &self.inner().uri
    }

    pub fn token(&self) -> &str {
        &self.inner().token
    }

    pub fn key_authorization(&self) -> Option<&str> {
        self.inner().key_authorization.as_deref()
    }

    /// HTTP-01 驗證檔案的路徑。
    pub fn http_resource_path(&self) -> Option<String> {
        match self {
            Challenge::Http01(inner) => Some(format!("{HTTP01_PATH_PREFIX}{}", inner.token)),
            _ => None,
        }
    }

    /// HTTP-01 驗證檔案的內容，即 key authorization。
    pub fn http_content(&self) -> Option<&str> {
        match self {
            Challenge::Http01(inner) => inner.key_authorization.as_deref(),
            _ => None,
        }
    }

    pub fn dns_txt_value(&self) -> Option<String> {
        match self {
            Challenge::Dns01(inner) => inner.key_authorization.as_deref().map(dns_txt_value),
            _ => None,
        }
    }

    pub fn tls_sni_name(&self) -> Option<String> {
        match self {
            Challenge::TlsSni01(inner) => inner.key_authorization.as_deref().map(tls_sni_name),
            _ => None,
        }
    }

    /// 根據挑戰類型及語言取得驗證指引；挑戰尚未準備時回傳 `None`。
    ///
    /// 不支援的語言會改用繁體中文。
    pub fn instructions(&self, domain: &str, lang: &str) -> Option<String> {
        let key_auth = self.key_authorization()?;
        let instructions = INSTRUCTIONS.get_or_init(init_instructions);
        let lang_instructions = instructions
            .get(lang)
            .or_else(|| instructions.get("zh-tw"))?;

        Some(match self {
            Challenge::Http01(inner) => lang_instructions
                .http01
                .replace("{token}", &inner.token)
                .replace("{key_auth}", key_auth),
            Challenge::Dns01(_) => lang_instructions
                .dns01
                .replace("{dns_name}", &dns_record_name(domain))
                .replace("{dns_value}", &dns_txt_value(key_auth)),
            Challenge::TlsSni01(_) => lang_instructions
                .tls_sni01
                .replace("{sni_name}", &tls_sni_name(key_auth)),
        })
    }
}

/// 靜態儲存各語言的驗證指引，僅初始化一次。
static INSTRUCTIONS: OnceLock<HashMap<&'static str, Instructions>> = OnceLock::new();

struct Instructions {
    http01: &'static str,
    dns01: &'static str,
    tls_sni01: &'static str,
}

fn init_instructions() -> HashMap<&'static str, Instructions> {
    let mut m = HashMap::new();

    m.insert(
        "zh-tw",
        Instructions {
            http01: "HTTP-01 驗證步驟：\n\
                1. 建立文件路徑：/.well-known/acme-challenge/{token}\n\
                2. 文件內容：{key_auth}\n\
                3. 確保可通過 HTTP 訪問（非 HTTPS）",
            dns01: "DNS-01 驗證步驟：\n\
                1. 新增 TXT 記錄：{dns_name}\n\
                2. 記錄值：{dns_value}\n\
                3. 等待 DNS 傳播",
            tls_sni01: "TLS-SNI-01 驗證步驟：\n\
                1. 產生自簽憑證，SAN 為：{sni_name}\n\
                2. 在 443 埠上以該 SNI 名稱提供此憑證",
        },
    );

    m.insert(
        "en",
        Instructions {
            http01: "HTTP-01 Validation Steps:\n\
                1. Create file path: /.well-known/acme-challenge/{token}\n\
                2. File content: {key_auth}\n\
                3. Ensure accessible via HTTP (not HTTPS)",
            dns01: "DNS-01 Validation Steps:\n\
                1. Add TXT record: {dns_name}\n\
                2. Value: {dns_value}\n\
                3. Wait for DNS propagation",
            tls_sni01: "TLS-SNI-01 Validation Steps:\n\
                1. Create a self-signed certificate with SAN: {sni_name}\n\
                2. Serve it on port 443 for that SNI name",
        },
    );

    m
}

/// 挑戰相關的操作。
pub struct ChallengeOps<'a> {
    engine: &'a RequestEngine,
}

impl<'a> ChallengeOps<'a> {
    pub fn new(engine: &'a RequestEngine) -> Self {
        Self { engine }
    }

    /// 以 GET 讀取挑戰，預期回應 200。
    pub fn at(&self, location: &str) -> Result<ReadyableChallenge<'a>> {
        let challenge = self.engine.get(location, &[200], decode_challenge)?;
        Ok(self.use_challenge(challenge))
    }

    /// 使用已知的挑戰物件，例如授權回應中的挑戰。
    pub fn use_challenge(&self, challenge: Challenge) -> ReadyableChallenge<'a> {
        ReadyableChallenge {
            engine: self.engine,
            challenge,
        }
    }
}

/// 可準備並通知伺服器就緒的挑戰。
pub struct ReadyableChallenge<'a> {
    engine: &'a RequestEngine,
    challenge: Challenge,
}

impl ReadyableChallenge<'_> {
    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// 在本地計算 key authorization，不與伺服器通訊。
    ///
    /// 挑戰已帶有伺服器提供的值時保留原值。
    pub fn prepare(&mut self) -> Result<&Challenge> {
        if self.challenge.key_authorization().is_none() {
            let key_auth = key_authorization(self.challenge.token(), self.engine.jwk())?;
            self.challenge.inner_mut().key_authorization = Some(key_auth);
        }
        Ok(&self.challenge)
    }

    /// 通知伺服器挑戰已就緒，預期回應 202，回傳伺服器觀察到的挑戰狀態。
    pub fn ready(mut self) -> Result<Challenge> {
        self.prepare()?;
        let key_auth = self
            .challenge
            .key_authorization()
            .unwrap_or_default()
            .to_owned();

        self.engine.send(
            self.challenge.uri(),
            &ChallengeResponsePayload::new(key_auth),
            &[202],
            decode_challenge,
        )
    }
}

fn decode_challenge(response: HttpResponse) -> Result<Challenge> {
    Challenge::from_json(&response.body)
}
