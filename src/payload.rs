use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    authorization::Identifier,
    directory::ResourceType,
    error::{AcmeError, Result},
};

/// 定義所有 API 載荷（Payload）必須實作的功能。
///
/// 每個載荷都帶有 `resource` 欄位，表示其 ACME 資源種類，
/// 且必須與請求的端點一致。
pub trait PayloadT: Serialize + for<'de> Deserialize<'de> {
    /// 載荷的 `resource` 值。
    fn resource(&self) -> ResourceType;

    /// 將載荷轉換成 JSON 格式的字串。
    fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 驗證載荷資料是否符合預期的規範。
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// 將聯絡方式對應表轉成線上格式的 `"scheme:address"` 陣列。
pub fn contact_list(contact: &BTreeMap<String, String>) -> Vec<String> {
    contact
        .iter()
        .map(|(scheme, address)| format!("{scheme}:{address}"))
        .collect()
}

/// 建立新帳戶的載荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistrationPayload {
    resource: ResourceType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contact: Vec<String>,
}

impl NewRegistrationPayload {
    pub fn new(contact: &BTreeMap<String, String>) -> Self {
        Self {
            resource: ResourceType::NewReg,
            contact: contact_list(contact),
        }
    }
}

impl PayloadT for NewRegistrationPayload {
    fn resource(&self) -> ResourceType {
        self.resource
    }
}

/// 更新既有帳戶的載荷，也用於輪詢帳戶狀態。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    resource: ResourceType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contact: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agreement: Option<String>,
}

impl RegistrationPayload {
    pub fn new(contact: &BTreeMap<String, String>, agreement: Option<&str>) -> Self {
        Self {
            resource: ResourceType::Reg,
            contact: contact_list(contact),
            agreement: agreement.map(str::to_owned),
        }
    }

    /// 只含 `resource` 的空載荷。
    pub fn empty() -> Self {
        Self::new(&BTreeMap::new(), None)
    }
}

impl PayloadT for RegistrationPayload {
    fn resource(&self) -> ResourceType {
        self.resource
    }
}

/// 金鑰輪替的內層載荷，由新金鑰簽名，指向舊金鑰的縮影。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldKeyPayload {
    resource: ResourceType,
    #[serde(rename = "oldKey")]
    pub old_key: String,
}

impl OldKeyPayload {
    pub fn new(old_key_thumbprint: impl Into<String>) -> Self {
        Self {
            resource: ResourceType::Reg,
            old_key: old_key_thumbprint.into(),
        }
    }
}

impl PayloadT for OldKeyPayload {
    fn resource(&self) -> ResourceType {
        self.resource
    }

    fn validate(&self) -> Result<()> {
        if self.old_key.is_empty() {
            return Err(AcmeError::Signing("old key thumbprint is empty".to_owned()));
        }
        Ok(())
    }
}

/// 金鑰輪替的外層載荷，`newKey` 為內層 JWS 的緊湊序列化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKeyPayload {
    resource: ResourceType,
    #[serde(rename = "newKey")]
    pub new_key: String,
}

impl NewKeyPayload {
    pub fn new(inner_jws: impl Into<String>) -> Self {
        Self {
            resource: ResourceType::Reg,
            new_key: inner_jws.into(),
        }
    }
}

impl PayloadT for NewKeyPayload {
    fn resource(&self) -> ResourceType {
        self.resource
    }
}

/// 帳戶復原的方式；此草案版本僅定義以聯絡方式復原。
pub const RECOVERY_METHOD_CONTACT: &str = "contact";

/// 帳戶復原的載荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPayload {
    resource: ResourceType,
    method: String,
    /// 要復原的舊帳戶 URL。
    base: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contact: Vec<String>,
}

impl RecoveryPayload {
    pub fn new(base: impl Into<String>, contact: &BTreeMap<String, String>) -> Self {
        Self {
            resource: ResourceType::RecoverReg,
            method: RECOVERY_METHOD_CONTACT.to_owned(),
            base: base.into(),
            contact: contact_list(contact),
        }
    }
}

impl PayloadT for RecoveryPayload {
    fn resource(&self) -> ResourceType {
        self.resource
    }

    fn validate(&self) -> Result<()> {
        if self.base.is_empty() {
            return Err(AcmeError::ProtocolViolation(
                "recovery requires the base account URL".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 申請新授權的載荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuthorizationPayload {
    resource: ResourceType,
    pub identifier: Identifier,
}

impl NewAuthorizationPayload {
    pub fn new(identifier: Identifier) -> Self {
        Self {
            resource: ResourceType::NewAuthz,
            identifier,
        }
    }
}

impl PayloadT for NewAuthorizationPayload {
    /// 識別項的類型與值都不得為空。
    fn validate(&self) -> Result<()> {
        if self.identifier.identifier_type.is_empty() || self.identifier.value.is_empty() {
            return Err(AcmeError::ProtocolViolation(
                "identifier type and value are required".to_owned(),
            ));
        }
        Ok(())
    }

    fn resource(&self) -> ResourceType {
        self.resource
    }
}

/// 回應挑戰的載荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponsePayload {
    resource: ResourceType,
    #[serde(rename = "keyAuthorization")]
    pub key_authorization: String,
}

impl ChallengeResponsePayload {
    pub fn new(key_authorization: impl Into<String>) -> Self {
        Self {
            resource: ResourceType::Challenge,
            key_authorization: key_authorization.into(),
        }
    }
}

impl PayloadT for ChallengeResponsePayload {
    fn resource(&self) -> ResourceType {
        self.resource
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn to_value<P: PayloadT>(payload: &P) -> Value {
        serde_json::from_str(&payload.to_json_string().unwrap()).unwrap()
    }

    #[test]
    fn test_every_payload_carries_resource() {
        let contact = BTreeMap::from([("mailto".to_owned(), "admin@example.com".to_owned())]);

        assert_eq!(
            to_value(&NewRegistrationPayload::new(&contact)),
            json!({"resource": "new-reg", "contact": ["mailto:admin@example.com"]})
        );
        assert_eq!(
            to_value(&RegistrationPayload::new(&contact, Some("https://example.com/tos"))),
            json!({
                "resource": "reg",
                "contact": ["mailto:admin@example.com"],
                "agreement": "https://example.com/tos"
            })
        );
        assert_eq!(
            to_value(&RecoveryPayload::new("https://example.com/reg/1", &contact)),
            json!({
                "resource": "recover-reg",
                "method": "contact",
                "base": "https://example.com/reg/1",
                "contact": ["mailto:admin@example.com"]
            })
        );
        assert_eq!(
            to_value(&ChallengeResponsePayload::new("token.thumb")),
            json!({"resource": "challenge", "keyAuthorization": "token.thumb"})
        );
        assert_eq!(
            to_value(&NewAuthorizationPayload::new(Identifier::dns("example.com"))),
            json!({"resource": "new-authz", "identifier": {"type": "dns", "value": "example.com"}})
        );
    }

    #[test]
    fn test_empty_payloads_omit_optional_fields() {
        assert_eq!(
            to_value(&NewRegistrationPayload::new(&BTreeMap::new())),
            json!({"resource": "new-reg"})
        );
        assert_eq!(to_value(&RegistrationPayload::empty()), json!({"resource": "reg"}));
    }

    #[test]
    fn test_key_rollover_payloads() {
        assert_eq!(
            to_value(&OldKeyPayload::new("thumb")),
            json!({"resource": "reg", "oldKey": "thumb"})
        );
        assert_eq!(
            to_value(&NewKeyPayload::new("a.b.c")),
            json!({"resource": "reg", "newKey": "a.b.c"})
        );
        assert!(OldKeyPayload::new("").validate().is_err());
    }

    #[test]
    fn test_validation() {
        assert!(NewAuthorizationPayload::new(Identifier::dns("")).validate().is_err());
        assert!(RecoveryPayload::new("", &BTreeMap::new()).validate().is_err());
        assert!(NewAuthorizationPayload::new(Identifier::dns("example.com"))
            .validate()
            .is_ok());
    }
}
