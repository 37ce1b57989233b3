//! # ACME draft（v01）客戶端
//!
//! 本庫實作 ACME v01 協議的客戶端流程，涵蓋以下部分：
//!
//! - **請求引擎**（`request`）：以帳戶金鑰簽出 JWS、管理單一 nonce、檢查回應狀態碼，並依 `Retry-After` 有限度地輪詢。
//! - **帳戶**（`registration`）：建立、更新、查詢既有帳戶、金鑰輪替與帳戶復原，並可自動同意新的服務條款。
//! - **授權與挑戰**（`authorization`、`challenge`）：建立授權、讀取挑戰、計算 key authorization 並通知伺服器驗證。
//!
//! ## 特性
//!
//! - 每個簽名請求使用一次性的 nonce，回應中的 `Replay-Nonce` 自動補充
//! - 支援 RS256 與 ES256
//! - 解析 `Link` 標頭取得服務條款、授權集合與復原 URL
//! - 輪詢次數與總時間皆有上限，並可由其他執行緒取消
//!
//! ## 示例
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use racme_draft::{
//!     authorization::Identifier,
//!     challenge::ChallengeType,
//!     client::AcmeClient,
//!     config::{Config, PollPolicy},
//!     key_pair::KeyPair,
//!     registration::NewRegistration,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key_pair = KeyPair::generate_ec()?;
//!     let poll = PollPolicy::new(10, Duration::from_secs(120), Duration::from_secs(3));
//!     let client = AcmeClient::new(Config::lets_encrypt_staging(key_pair, poll))?;
//!
//!     // 1. 建立帳戶並同意服務條款
//!     let mut new_registration = NewRegistration::default();
//!     new_registration
//!         .contact
//!         .insert("mailto".to_owned(), "admin@example.com".to_owned());
//!     new_registration.agree_to_terms = true;
//!     let registration = client.registration().create(&new_registration)?;
//!     println!("account: {:?}", registration.location);
//!
//!     // 2. 為網域建立授權
//!     let authorization = client
//!         .authorization()
//!         .create_new(Identifier::dns("example.com"))?;
//!
//!     // 3. 選擇 http-01 挑戰，部署檔案後通知伺服器
//!     let http01 = authorization
//!         .find_single_challenge(|c| c.challenge_type() == ChallengeType::Http01);
//!     if let Some(challenge) = http01 {
//!         let mut handle = client.challenges().use_challenge(challenge.clone());
//!         if let Some(instructions) = handle.prepare()?.instructions("example.com", "en") {
//!             println!("{instructions}");
//!         }
//!         let challenge = handle.ready()?;
//!         println!("status: {}", challenge.status());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! 更多詳細 API 說明請參考各個模組的文檔。

pub mod authorization;
pub mod base64;
pub mod challenge;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod jwk;
pub mod jws;
pub mod key_pair;
pub mod link;
pub mod nonce;
pub mod payload;
pub mod protection;
pub mod registration;
pub mod request;
pub mod signature;
pub mod transport;

pub use client::AcmeClient;
pub use config::{Config, PollPolicy};
pub use error::{AcmeError, Result};
pub use key_pair::KeyPair;
