use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    challenge::{Challenge, RawChallenge},
    directory::Directory,
    error::{AcmeError, Result},
    payload::NewAuthorizationPayload,
    request::RequestEngine,
    transport::HttpResponse,
};

/// 授權與挑戰共用的資源狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    /// 伺服器回傳了無法辨識的狀態值。
    Unknown,
    #[default]
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Valid => "valid",
            Status::Invalid => "invalid",
            Status::Revoked => "revoked",
        }
    }

    /// 判斷該狀態是否為終結狀態，即伺服器不會再改變它。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Valid | Status::Invalid | Status::Revoked)
    }
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        match value {
            "pending" => Status::Pending,
            "processing" => Status::Processing,
            "valid" => Status::Valid,
            "invalid" => Status::Invalid,
            "revoked" => Status::Revoked,
            _ => Status::Unknown,
        }
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Status::from(value.as_str())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_owned()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 表示一個識別項，例如 `dns` / `example.com`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub value: String,
}

impl Identifier {
    pub fn new(identifier_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            identifier_type: identifier_type.into(),
            value: value.into(),
        }
    }

    /// 建立 `dns` 類型的識別項。
    pub fn dns(domain: impl Into<String>) -> Self {
        Self::new("dns", domain)
    }
}

/// 單一識別項的授權，包含伺服器提供的挑戰與挑戰組合。
///
/// 挑戰列表保持伺服器回傳的順序，因為組合是以索引參照挑戰。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub identifier: Identifier,
    pub status: Status,
    pub expires: Option<DateTime<Utc>>,
    pub challenges: Vec<Challenge>,
    /// 每個組合是 `challenges` 的索引列表，完成其中任一組合即可通過授權。
    pub combinations: Vec<Vec<usize>>,
    /// 授權資源的 URL，取自 `Location` 標頭或請求 URL。
    pub location: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RawAuthorization {
    identifier: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    challenges: Vec<RawChallenge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    combinations: Vec<Vec<usize>>,
}

impl Authorization {
    /// 從 JSON 主體解碼授權。
    ///
    /// # 錯誤
    ///
    /// - 未知的挑戰類型回傳 [`AcmeError::UnknownChallengeType`]。
    /// - 組合索引超出挑戰列表範圍或 `expires` 格式錯誤時回傳 [`AcmeError::Decode`]。
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawAuthorization = serde_json::from_slice(body)?;

        let challenges = raw
            .challenges
            .into_iter()
            .map(Challenge::try_from)
            .collect::<Result<Vec<_>>>()?;

        if let Some(index) = raw
            .combinations
            .iter()
            .flatten()
            .find(|&&index| index >= challenges.len())
        {
            return Err(AcmeError::Decode(format!(
                "combination references challenge {index} of {}",
                challenges.len()
            )));
        }

        let expires = raw
            .expires
            .filter(|value| !value.is_empty())
            .map(|value| {
                DateTime::parse_from_rfc3339(&value)
                    .map(|date| date.with_timezone(&Utc))
                    .map_err(AcmeError::decode)
            })
            .transpose()?;

        Ok(Self {
            identifier: raw.identifier,
            status: raw.status.unwrap_or_default(),
            expires,
            challenges,
            combinations: raw.combinations,
            location: None,
        })
    }

    /// 將組合展開為挑戰的參照。
    pub fn combination_challenges(&self) -> Vec<Vec<&Challenge>> {
        self.combinations
            .iter()
            .map(|combination| {
                combination
                    .iter()
                    .filter_map(|&index| self.challenges.get(index))
                    .collect()
            })
            .collect()
    }

    /// 找出第一個只需單一挑戰、且該挑戰符合 `accept` 的組合。
    pub fn find_single_challenge(&self, accept: impl Fn(&Challenge) -> bool) -> Option<&Challenge> {
        self.combination_challenges()
            .into_iter()
            .filter(|combination| combination.len() == 1)
            .flatten()
            .find(|challenge| accept(challenge))
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for Authorization {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawAuthorization {
            identifier: self.identifier.clone(),
            status: Some(self.status),
            expires: self
                .expires
                .map(|date| date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            challenges: self.challenges.iter().map(RawChallenge::from).collect(),
            combinations: self.combinations.clone(),
        }
        .serialize(serializer)
    }
}

/// 授權相關的操作。
pub struct AuthorizationOps<'a> {
    engine: &'a RequestEngine,
    directory: &'a Directory,
}

impl<'a> AuthorizationOps<'a> {
    pub fn new(engine: &'a RequestEngine, directory: &'a Directory) -> Self {
        Self { engine, directory }
    }

    /// 為識別項申請新的授權，預期回應 201。
    pub fn create_new(&self, identifier: Identifier) -> Result<Authorization> {
        let url = self.directory.new_authz()?;
        self.engine.send(
            url,
            &NewAuthorizationPayload::new(identifier),
            &[201],
            decode_authorization,
        )
    }

    /// 讀取既有的授權，預期回應 200。
    pub fn at(&self, location: &str) -> Result<Authorization> {
        self.engine.get(location, &[200], decode_authorization)
    }
}

fn decode_authorization(response: HttpResponse) -> Result<Authorization> {
    let mut authorization = Authorization::from_json(&response.body)?;
    authorization.location = Some(
        response
            .header("Location")
            .filter(|location| !location.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| response.url.clone()),
    );
    Ok(authorization)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::{json, Value};

    use super::*;
    use crate::{
        challenge::ChallengeType,
        config::PollPolicy,
        jws::Jws,
        key_pair::KeyPair,
        signature::JwsAlgorithm,
        transport::mock::{json_reply, reply, MockHttp},
    };

    fn authz_json() -> Value {
        json!({
            "identifier": {"type": "dns", "value": "example.com"},
            "status": "pending",
            "expires": "2016-01-01T00:00:00Z",
            "challenges": [
                {"type": "http-01", "status": "pending", "uri": "https://example.com/authz/1/0", "token": "tok0"},
                {"type": "tls-sni-01", "status": "pending", "uri": "https://example.com/authz/1/1", "token": "tok1"},
                {"type": "dns-01", "status": "pending", "uri": "https://example.com/authz/1/2", "token": "tok2"}
            ],
            "combinations": [[0], [1, 2]]
        })
    }

    fn setup() -> (MockHttp, RequestEngine, Directory) {
        let http = MockHttp::new();
        let key = KeyPair::generate_ec().unwrap();
        let engine = RequestEngine::new(
            Arc::new(http.clone()),
            &key,
            JwsAlgorithm::ES256,
            "https://example.com/directory",
            PollPolicy::new(3, Duration::from_secs(10), Duration::ZERO),
        )
        .unwrap();
        engine.nonces().observe(&reply(200, "bjE")).unwrap();
        let directory =
            Directory::from_entries([("new-authz", "https://example.com/acme/new-authz")]);
        (http, engine, directory)
    }

    #[test]
    fn test_combination_indices() {
        let authz = Authorization::from_json(authz_json().to_string().as_bytes()).unwrap();
        let combinations = authz.combination_challenges();

        assert_eq!(combinations.len(), 2);
        assert_eq!(combinations[0], vec![&authz.challenges[0]]);
        assert_eq!(
            combinations[1],
            vec![&authz.challenges[1], &authz.challenges[2]]
        );
        assert_eq!(
            authz
                .find_single_challenge(|c| c.challenge_type() == ChallengeType::Http01)
                .map(Challenge::token),
            Some("tok0")
        );
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let authz = Authorization::from_json(authz_json().to_string().as_bytes()).unwrap();
        assert_eq!(authz.status, Status::Pending);
        assert_eq!(authz.identifier, Identifier::dns("example.com"));
        assert_eq!(
            authz.expires.unwrap().to_rfc3339(),
            "2016-01-01T00:00:00+00:00"
        );

        let encoded = authz.to_json_value().unwrap();
        assert_eq!(encoded["combinations"], json!([[0], [1, 2]]));
        assert_eq!(encoded["expires"], "2016-01-01T00:00:00Z");

        let decoded = Authorization::from_json(encoded.to_string().as_bytes()).unwrap();
        assert_eq!(decoded, authz);
    }

    #[test]
    fn test_status_defaults_and_unknown_values() {
        let authz = Authorization::from_json(
            br#"{"identifier":{"type":"dns","value":"example.com"}}"#,
        )
        .unwrap();
        assert_eq!(authz.status, Status::Pending);
        assert!(authz.challenges.is_empty());

        let status: Status = serde_json::from_str("\"deactivated\"").unwrap();
        assert_eq!(status, Status::Unknown);
        assert!(Status::Revoked.is_terminal());
        assert!(!Status::Processing.is_terminal());
    }

    #[test]
    fn test_rejects_bad_combinations_and_challenge_types() {
        let mut body = authz_json();
        body["combinations"] = json!([[3]]);
        assert!(matches!(
            Authorization::from_json(body.to_string().as_bytes()),
            Err(AcmeError::Decode(_))
        ));

        let mut body = authz_json();
        body["challenges"][1]["type"] = json!("proofOfPossession-01");
        assert!(matches!(
            Authorization::from_json(body.to_string().as_bytes()),
            Err(AcmeError::UnknownChallengeType(t)) if t == "proofOfPossession-01"
        ));
    }

    #[test]
    fn test_create_new_posts_identifier() {
        let (http, engine, directory) = setup();
        http.push(
            json_reply(201, "bjI", &authz_json())
                .with_header("Location", "https://example.com/acme/authz/1"),
        );

        let authz = AuthorizationOps::new(&engine, &directory)
            .create_new(Identifier::dns("example.com"))
            .unwrap();
        assert_eq!(authz.location.as_deref(), Some("https://example.com/acme/authz/1"));
        assert_eq!(authz.challenges.len(), 3);

        let request = &http.requests()[0];
        assert_eq!(request.url, "https://example.com/acme/new-authz");
        let payload: Value = Jws::parse(request.body_text().unwrap())
            .unwrap()
            .payload()
            .unwrap();
        assert_eq!(
            payload,
            json!({"resource": "new-authz", "identifier": {"type": "dns", "value": "example.com"}})
        );
    }

    #[test]
    fn test_at_falls_back_to_request_url() {
        let (http, engine, directory) = setup();
        http.push(json_reply(200, "bjI", &authz_json()));

        let authz = AuthorizationOps::new(&engine, &directory)
            .at("https://example.com/acme/authz/1")
            .unwrap();
        assert_eq!(authz.location.as_deref(), Some("https://example.com/acme/authz/1"));
    }

    #[test]
    fn test_create_new_requires_201() {
        let (http, engine, directory) = setup();
        http.push(json_reply(
            403,
            "bjI",
            &json!({"type": "urn:acme:error:unauthorized", "detail": "No registration exists"}),
        ));

        let err = AuthorizationOps::new(&engine, &directory)
            .create_new(Identifier::dns("example.com"))
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}
