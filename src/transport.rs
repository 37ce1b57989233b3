//! HTTP 傳輸層抽象。
//!
//! 請求引擎只透過 [`HttpClient`] 存取網路；正式環境使用 [`ReqwestClient`]，
//! 測試則注入預先編排回應的記憶體實作。

use std::time::Duration;

use reqwest::{
    blocking::Client,
    header::CONTENT_TYPE,
    redirect::Policy,
    StatusCode,
};

use crate::error::{AcmeError, Result};

/// JWS 緊湊序列化的媒體類型。
pub const JOSE_CONTENT_TYPE: &str = "application/jose+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

/// 一個待送出的 HTTP 請求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            content_type: None,
            body: None,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            ..Self::get(url)
        }
    }

    /// 建立攜帶 JWS 緊湊序列化內容的 POST 請求。
    pub fn post_jose(url: impl Into<String>, compact: String) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            content_type: Some(JOSE_CONTENT_TYPE.to_owned()),
            body: Some(compact.into_bytes()),
        }
    }

    /// 以 UTF-8 解讀請求主體。
    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|body| std::str::from_utf8(body).ok())
    }
}

/// 已完整讀取主體的 HTTP 回應。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// 產生此回應的請求 URL。
    pub url: String,
    /// 依接收順序保存的標頭，同名標頭可能出現多次。
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// 附加一個標頭並回傳自身，便於自訂 [`HttpClient`] 實作組裝回應。
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// 取得第一個同名標頭的值，名稱不分大小寫。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 依序取得所有同名標頭的值。
    pub fn header_values<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + 'n
    where
        'a: 'n,
    {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 狀態碼的標準說明文字，例如 `Bad Request`。
    pub fn reason(&self) -> Option<&'static str> {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
    }
}

/// 網路存取的唯一接縫。
pub trait HttpClient: Send + Sync {
    /// 送出請求並讀取完整回應；連線失敗回傳 [`AcmeError::Transport`]。
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// 以 `reqwest` 阻塞式客戶端實作的 [`HttpClient`]。
///
/// 不會自動跟隨重新導向，3xx 狀態碼會原樣回傳給請求引擎。
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(transport_error)?;

        Ok(Self { client })
    }
}

fn transport_error(e: reqwest::Error) -> AcmeError {
    AcmeError::Transport(e.to_string())
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Head => self.client.head(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().map_err(transport_error)?.to_vec();

        Ok(HttpResponse {
            status,
            url: request.url,
            headers,
            body,
        })
    }
}
