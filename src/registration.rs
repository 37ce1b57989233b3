//! 帳戶（registration）模型與其狀態轉換：建立、更新、查詢、金鑰輪替與復原。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    directory::Directory,
    error::{AcmeError, Result},
    jwk::Jwk,
    jws::Jws,
    key_pair::{KeyError, KeyPair},
    link::{LinkRelations, REL_NEXT, REL_RECOVER, REL_TERMS_OF_SERVICE},
    payload::{
        contact_list, NewKeyPayload, NewRegistrationPayload, OldKeyPayload, PayloadT,
        RecoveryPayload, RegistrationPayload,
    },
    protection::Protection,
    request::RequestEngine,
    signature::Signer,
    transport::HttpResponse,
};

/// 聯絡方式：協定（例如 `mailto`、`tel`）對應到地址。
pub type Contacts = BTreeMap<String, String>;

/// 伺服器上的帳戶。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// 帳戶公鑰；只知道 URL 的帳戶參照沒有此欄位。
    pub key: Option<Jwk>,
    pub contact: Contacts,
    /// 帳戶 URL，之後所有帳戶操作都以此為目標。
    pub location: Option<String>,
    /// 服務條款 URL。
    pub agreement: Option<String>,
    /// 授權集合 URL。
    pub authorizations: Option<String>,
    /// 憑證集合 URL。
    pub certificates: Option<String>,
    /// 帳戶復原 URL。
    pub recover: Option<String>,
}

/// 建立新帳戶的請求。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRegistration {
    pub contact: Contacts,
    /// 伺服器提供新的服務條款時自動同意。
    pub agree_to_terms: bool,
}

/// 帳戶復原的請求。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryRegistration {
    /// 要復原的舊帳戶 URL。
    pub base: String,
    pub contact: Contacts,
}

#[derive(Serialize, Deserialize)]
struct RawRegistration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contact: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agreement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorizations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    certificates: Option<String>,
}

/// 將 `"scheme:address"` 列表轉為聯絡方式對應表，格式錯誤的項目會被略過。
pub fn parse_contacts<S: AsRef<str>>(entries: &[S]) -> Contacts {
    let mut contacts = Contacts::new();
    for entry in entries {
        match entry.as_ref().split_once(':') {
            Some((scheme, address)) if !scheme.is_empty() => {
                contacts.insert(scheme.to_owned(), address.to_owned());
            }
            _ => log::warn!("Skipping malformed contact {:?}", entry.as_ref()),
        }
    }
    contacts
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

impl Registration {
    /// 只有帳戶 URL 的參照，例如 409 回應中的 `Location`。
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    /// 從 JSON 主體解碼帳戶。
    ///
    /// # 錯誤
    ///
    /// 缺少 `key` 時回傳 [`AcmeError::ProtocolViolation`]。
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawRegistration = serde_json::from_slice(body)?;
        let key = raw.key.ok_or_else(|| {
            AcmeError::ProtocolViolation("registration is missing the required key".to_owned())
        })?;
        let key = Jwk::from_value(&key).map_err(AcmeError::decode)?;

        Ok(Self {
            key: Some(key),
            contact: parse_contacts(&raw.contact.unwrap_or_default()),
            location: None,
            agreement: non_empty(raw.agreement),
            authorizations: non_empty(raw.authorizations),
            certificates: non_empty(raw.certificates),
            recover: None,
        })
    }

    pub fn to_json_value(&self) -> Result<Value> {
        let key = self
            .key
            .as_ref()
            .map(|jwk| jwk.to_value().map_err(AcmeError::decode))
            .transpose()?;
        let raw = RawRegistration {
            key,
            contact: Some(contact_list(&self.contact)).filter(|list| !list.is_empty()),
            agreement: self.agreement.clone(),
            authorizations: self.authorizations.clone(),
            certificates: self.certificates.clone(),
        };
        Ok(serde_json::to_value(raw)?)
    }
}

/// 解碼後的帳戶，以及伺服器新提供、與主體記錄不同的服務條款。
struct DecodedRegistration {
    registration: Registration,
    offered_agreement: Option<String>,
}

fn decode_registration(
    response: &HttpResponse,
    certificates_fallback: Option<String>,
) -> Result<DecodedRegistration> {
    let mut registration = Registration::from_json(&response.body)?;
    let links = LinkRelations::from_response(response);

    let recorded_agreement = registration.agreement.clone();
    let offered = non_empty(links.first_target(REL_TERMS_OF_SERVICE).map(str::to_owned));
    if offered.is_some() {
        registration.agreement = offered.clone();
    }
    if let Some(next) = non_empty(links.first_target(REL_NEXT).map(str::to_owned)) {
        registration.authorizations = Some(next);
    }
    registration.recover = non_empty(links.first_target(REL_RECOVER).map(str::to_owned));
    if registration.certificates.is_none() {
        registration.certificates = certificates_fallback;
    }
    registration.location = Some(
        non_empty(response.header("Location").map(str::to_owned))
            .unwrap_or_else(|| response.url.clone()),
    );

    Ok(DecodedRegistration {
        registration,
        offered_agreement: offered.filter(|offered| Some(offered) != recorded_agreement.as_ref()),
    })
}

/// 帳戶相關的操作。
pub struct RegistrationOps<'a> {
    engine: &'a RequestEngine,
    directory: &'a Directory,
}

impl<'a> RegistrationOps<'a> {
    pub fn new(engine: &'a RequestEngine, directory: &'a Directory) -> Self {
        Self { engine, directory }
    }

    /// 建立新帳戶，預期回應 201。
    ///
    /// 若 `agree_to_terms` 為真且伺服器以 `terms-of-service` 關聯提供了與主體不同的條款，
    /// 會立即送出一次帶有該條款的 [`update`](RegistrationOps::update)。
    pub fn create(&self, new_registration: &NewRegistration) -> Result<Registration> {
        let url = self.directory.new_reg()?;
        let decoded = self.engine.send(
            url,
            &NewRegistrationPayload::new(&new_registration.contact),
            &[201],
            |response| decode_registration(&response, None),
        )?;

        match decoded.offered_agreement {
            Some(agreement) if new_registration.agree_to_terms => {
                log::info!("Agreeing to terms of service {agreement}");
                self.update(&decoded.registration)
            }
            _ => Ok(decoded.registration),
        }
    }

    /// 以帳戶的 `location` 更新帳戶，預期回應 202。
    ///
    /// 載荷帶有帳戶的聯絡方式與已知的服務條款。回應沒有憑證集合 URL 時沿用原值。
    pub fn update(&self, registration: &Registration) -> Result<Registration> {
        let location = registration.location.as_deref().ok_or_else(|| {
            AcmeError::ProtocolViolation("registration has no location to update".to_owned())
        })?;
        let payload =
            RegistrationPayload::new(&registration.contact, registration.agreement.as_deref());

        self.engine.send(location, &payload, &[202], |response| {
            decode_registration(&response, registration.certificates.clone())
                .map(|decoded| decoded.registration)
        })
    }

    /// 查詢目前金鑰對應的帳戶。
    ///
    /// 對 new-reg 送出不帶聯絡方式的載荷：伺服器以 409 與 `Location` 指出既有帳戶時，
    /// 改為對該 URL 送出 [`update`](RegistrationOps::update)；201 或 202 則直接解碼。
    pub fn get(&self) -> Result<Registration> {
        let url = self.directory.new_reg()?;
        let response = self.engine.send(
            url,
            &NewRegistrationPayload::new(&Contacts::new()),
            &[201, 202, 409],
            Ok,
        )?;

        if response.status == 409 {
            let location = non_empty(response.header("Location").map(str::to_owned))
                .ok_or_else(|| {
                    AcmeError::ProtocolViolation(
                        "409 Conflict without a Location header".to_owned(),
                    )
                })?;
            log::info!("Account already exists at {location}");
            return self.update(&Registration::at(location));
        }

        decode_registration(&response, None).map(|decoded| decoded.registration)
    }

    /// 將帳戶金鑰輪替為 `new_key`，預期回應 202。
    ///
    /// 內層 JWS 以新金鑰簽名，載荷指向舊金鑰的縮影；外層以目前帳戶金鑰簽名並送往帳戶 URL。
    /// 成功後此工作階段仍持有舊金鑰，後續操作需以新金鑰建立新的客戶端。
    pub fn update_key(&self, new_key: &KeyPair) -> Result<()> {
        let location = self.get()?.location.ok_or_else(|| {
            AcmeError::ProtocolViolation("account location is unknown".to_owned())
        })?;

        let old_key = OldKeyPayload::new(
            self.engine
                .jwk()
                .thumbprint()
                .map_err(|e| AcmeError::Key(KeyError::from(e)))?,
        );
        old_key.validate()?;

        let new_signer = Signer::new(new_key)?;
        let header =
            Protection::with_jwk(new_signer.algorithm(), new_key.jwk()?).create_header(None);
        let inner = Jws::sign(&header, &old_key, &new_signer)?;

        self.engine.send(
            &location,
            &NewKeyPayload::new(inner.to_compact()),
            &[202],
            |_| Ok(()),
        )?;
        log::info!("Rolled over account key for {location}");
        Ok(())
    }

    /// 以聯絡方式復原帳戶。
    ///
    /// 先向 recover-reg 送出請求（預期 201）取得暫時帳戶，再輪詢其 URL，
    /// 直到伺服器回應 200；202 表示尚在處理。
    pub fn recover(&self, recovery: &RecoveryRegistration) -> Result<Registration> {
        let url = self.directory.recover_reg()?;
        let stub = self.engine.send(
            url,
            &RecoveryPayload::new(&recovery.base, &recovery.contact),
            &[201],
            |response| decode_registration(&response, None),
        )?;

        let location = stub.registration.location.ok_or_else(|| {
            AcmeError::ProtocolViolation("recovery response has no location".to_owned())
        })?;

        let registration = self.engine.send_with_polling(
            &location,
            &RegistrationPayload::empty(),
            200,
            &[202],
            |response| decode_registration(&response, None).map(|decoded| decoded.registration),
        )?;
        log::info!("Recovered account {location}");
        Ok(registration)
    }
}
