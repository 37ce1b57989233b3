use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AcmeError, Result};

/// ACME 資源種類，也就是每個請求負載中 `resource` 欄位的值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    NewReg,
    RecoverReg,
    NewAuthz,
    NewCert,
    RevokeCert,
    Reg,
    Authz,
    Challenge,
    Cert,
}

impl ResourceType {
    pub const ALL: [ResourceType; 9] = [
        ResourceType::NewReg,
        ResourceType::RecoverReg,
        ResourceType::NewAuthz,
        ResourceType::NewCert,
        ResourceType::RevokeCert,
        ResourceType::Reg,
        ResourceType::Authz,
        ResourceType::Challenge,
        ResourceType::Cert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::NewReg => "new-reg",
            ResourceType::RecoverReg => "recover-reg",
            ResourceType::NewAuthz => "new-authz",
            ResourceType::NewCert => "new-cert",
            ResourceType::RevokeCert => "revoke-cert",
            ResourceType::Reg => "reg",
            ResourceType::Authz => "authz",
            ResourceType::Challenge => "challenge",
            ResourceType::Cert => "cert",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == s)
            .ok_or(())
    }
}

/// 伺服器目錄：資源種類到端點 URL 的不可變對應。
///
/// 由探索請求的 JSON 物件建立一次，之後不再變動。
/// 無法辨識的鍵（例如 `meta`）會被忽略。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    resources: HashMap<ResourceType, String>,
}

impl Directory {
    /// 從目錄 JSON 物件建立 `Directory`。
    ///
    /// # 錯誤
    ///
    /// 主體不是 JSON 物件時回傳 [`AcmeError::Decode`]。
    pub fn from_json(body: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(map) => Ok(Self::from_entries(
                map.iter()
                    .filter_map(|(key, value)| value.as_str().map(|url| (key.as_str(), url))),
            )),
            other => Err(AcmeError::Decode(format!(
                "directory must be a JSON object, got {other}"
            ))),
        }
    }

    /// 由 (鍵, URL) 組合建立目錄，略過未知的鍵。
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut resources = HashMap::new();
        for (key, url) in entries {
            match key.parse::<ResourceType>() {
                Ok(resource) => {
                    resources.insert(resource, url.to_owned());
                }
                Err(()) => log::trace!("Ignoring unknown directory entry {key}"),
            }
        }
        Self { resources }
    }

    /// 取得資源種類對應的 URL。
    ///
    /// # 錯誤
    ///
    /// 目錄中沒有該資源時回傳 [`AcmeError::UnknownResource`]。
    pub fn resolve(&self, resource: ResourceType) -> Result<&str> {
        self.resources
            .get(&resource)
            .map(String::as_str)
            .ok_or(AcmeError::UnknownResource(resource))
    }

    pub fn contains(&self, resource: ResourceType) -> bool {
        self.resources.contains_key(&resource)
    }

    pub fn new_reg(&self) -> Result<&str> {
        self.resolve(ResourceType::NewReg)
    }

    pub fn recover_reg(&self) -> Result<&str> {
        self.resolve(ResourceType::RecoverReg)
    }

    pub fn new_authz(&self) -> Result<&str> {
        self.resolve(ResourceType::NewAuthz)
    }

    pub fn new_cert(&self) -> Result<&str> {
        self.resolve(ResourceType::NewCert)
    }

    pub fn revoke_cert(&self) -> Result<&str> {
        self.resolve(ResourceType::RevokeCert)
    }
}
