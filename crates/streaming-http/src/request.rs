use std::collections::BTreeMap;

use crate::errors::StreamingError;
use crate::identifier::RequestId;
use crate::transport::TransportRequest;

/// Caller-side description of one streaming HTTP call.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RequestSpec {
    /// Absolute `http`/`https` URL.
    pub url: String,
    /// HTTP method, `GET` unless set.
    #[serde(default = "default_method")]
    pub method: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON request body. Ignored by transports for `GET`.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Explicit identifier. When `None` the correlator allocates one.
    #[serde(default)]
    pub id: Option<RequestId>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestSpec {
    /// Creates a `GET` request for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            id: None,
        }
    }

    /// Creates a `GET` request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    /// Creates a `POST` request for `url`.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).method("POST")
    }

    /// Sets the HTTP method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets an `Authorization: Bearer` header.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Sets a JSON body and a matching `Content-Type` header.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self.header("Content-Type", "application/json")
    }

    /// Pins the request identifier instead of letting the correlator allocate one.
    pub fn id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Checks the fields every transport needs.
    pub fn validate(&self) -> Result<(), StreamingError> {
        if self.url.trim().is_empty() {
            return Err(StreamingError::validation("url is required"));
        }
        let url = reqwest::Url::parse(self.url.trim())
            .map_err(|e| StreamingError::validation(format!("invalid url `{}`: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StreamingError::validation(format!(
                "unsupported url scheme: {}",
                url.scheme()
            )));
        }
        if reqwest::Method::from_bytes(self.method.trim().as_bytes()).is_err()
            || self.method.trim().is_empty()
        {
            return Err(StreamingError::validation(format!(
                "invalid http method: {:?}",
                self.method
            )));
        }
        if let Some(id) = &self.id
            && id.is_blank()
        {
            return Err(StreamingError::validation("hash_id must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn to_transport_request(&self, hash_id: RequestId) -> TransportRequest {
        TransportRequest {
            url: self.url.trim().to_string(),
            method: self.method.trim().to_ascii_uppercase(),
            headers: self.headers.clone(),
            data: self.body.clone(),
            hash_id,
        }
    }
}
