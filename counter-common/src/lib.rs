use {
    serde::{Serialize, Deserialize},
    thiserror::Error,
    http::{HeaderMap, header::{self, IntoHeaderName, HeaderValue}, StatusCode, Method as HttpMethod, Uri},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    #[serde(with = "http_serde::method")]
    pub method: HttpMethod,
    #[serde(with = "http_serde::uri")]
    pub url: Uri,
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
}

impl HttpRequest {
    pub fn get(endpoint: impl Into<String>) -> Result<Self, HttpRequestError> {
        Self::new().with_method(HttpMethod::GET).with_url(endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Result<Self, HttpRequestError> {
        Self::new().with_method(HttpMethod::POST).with_url(endpoint)
    }

    pub fn new() -> Self {
        Self {
            method: HttpMethod::GET,
            url: Uri::from_static("/"),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Result<Self, HttpRequestError> {
        self.url = url.into().parse()
            .map_err(|err| HttpRequestError::InvalidRequest { reason: format!("failed to parse url: {err:?}") })?;
        Ok(self)
    }

    pub fn with_header<K: IntoHeaderName, V: TryInto<HeaderValue>>(mut self, header: K, value: V) -> Result<Self, HttpRequestError> {
        self.headers.append(
            header,
            value.try_into().map_err(|_err| HttpRequestError::InvalidRequest {
                reason: "failed to convert into HeaderValue".to_owned(),
            })?
        );
        Ok(self)
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    #[serde(with = "http_serde::status_code")]
    pub status: StatusCode,
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: vec![],
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn with_header<K: IntoHeaderName>(mut self, header_name: K, header_value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(header_name, header_value.into());
        self
    }

    pub fn with_body(mut self, body: impl HttpResponseBody) -> Self {
        self.body = body.into_bytes();
        self
    }

    /// Serializes `body` as the response payload and marks the response as json.
    /// Serialization failure turns the response into a bare 500.
    pub fn with_json<T: Serialize>(self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(v) => self
                .with_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON))
                .with_body(v),
            Err(_err) => self
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                .with_body(Vec::new()),
        }
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, HttpResponseError> {
        serde_json::from_slice(&self.body)
            .map_err(|err| HttpResponseError::InvalidBody { reason: format!("failed to decode json body: {err:?}") })
    }

    pub fn is_json(&self) -> bool {
        self.headers.get(header::CONTENT_TYPE)
            .map(|v| v.as_bytes() == CONTENT_TYPE_JSON.as_bytes())
            .unwrap_or(false)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Error)]
pub enum HttpRequestError {
    #[error("http request is invalid: {reason}")]
    InvalidRequest { reason: String },
}

#[derive(Debug, Error)]
pub enum HttpResponseError {
    #[error("http response body is invalid: {reason}")]
    InvalidBody { reason: String },
}

pub trait HttpResponseBody {
    fn into_bytes(self) -> Vec<u8>;
}

impl HttpResponseBody for Vec<u8> {
    fn into_bytes(self) -> Vec<u8> { self }
}

impl HttpResponseBody for String {
    fn into_bytes(self) -> Vec<u8> { self.into_bytes() }
}

impl HttpResponseBody for &str {
    fn into_bytes(self) -> Vec<u8> { self.as_bytes().to_vec() }
}

/// Body of a successful GET.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBody {
    pub count: u64,
}

/// Body of a successful POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementBody {
    pub message: String,
    pub new_count: u64,
}

impl IncrementBody {
    pub fn incremented(new_count: u64) -> Self {
        Self { message: "Visitor count incremented".to_owned(), new_count }
    }

    pub fn created() -> Self {
        Self { message: "Visitor record created".to_owned(), new_count: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
