use {
    std::time::Duration,
    tracing::debug,
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    hmac::{Hmac, Mac},
    sha2::Sha256,
    chrono::Utc,
    reqwest::{Method, StatusCode, blocking::{Client, RequestBuilder, Response}},
    serde_json::Value,
    crate::runtime::{
        config::StoreSettings,
        error::StoreError,
        store::{Document, DocumentStore},
    },
};

const API_VERSION: &str = "2018-12-31";
const RESOURCE_DOCS: &str = "docs";
const RESOURCE_COLLS: &str = "colls";

const HEADER_DATE: &str = "x-ms-date";
const HEADER_VERSION: &str = "x-ms-version";
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
const HEADER_UPSERT: &str = "x-ms-documentdb-is-upsert";

type HmacSha256 = Hmac<Sha256>;

/// Cosmos DB (SQL api) container accessed over REST with a master key.
pub struct CosmosStore {
    client: Client,
    endpoint: String,
    key: Vec<u8>,
    database: String,
    container: String,
}

/// Http client for cosmos db requests. Cheap to clone, clones share the connection pool.
pub fn build_client(request_timeout: Duration) -> Result<Client, StoreError> {
    Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|err| StoreError::InternalError { reason: format!("failed to build http client: {err:?}") })
}

impl CosmosStore {
    pub fn new(settings: &StoreSettings, client: Client) -> Result<Self, StoreError> {
        let key = BASE64.decode(settings.key.trim())
            .map_err(|err| StoreError::InvalidCredential { reason: format!("master key must be base64: {err:?}") })?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_owned(),
            key,
            database: settings.database.clone(),
            container: settings.container.clone(),
        })
    }

    /// Fails with `StoreError::ContainerNotFound` if database or container does not exist.
    pub fn check_container(&self) -> Result<(), StoreError> {
        let link = self.container_link();
        let response = self.send(self.request(Method::GET, RESOURCE_COLLS, &link, &link)?)?;

        match response.status() {
            v if v.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::ContainerNotFound {
                reason: format!("{link} does not exist"),
            }),
            _ => Err(unexpected_status(response)),
        }
    }

    fn container_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.container)
    }

    fn document_link(&self, id: &str) -> String {
        format!("{}/docs/{id}", self.container_link())
    }

    fn request(&self, method: Method, resource_type: &str, resource_link: &str, path: &str) -> Result<RequestBuilder, StoreError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let token = authorization_token(&self.key, method.as_str(), resource_type, resource_link, &date)?;

        Ok(self.client.request(method, format!("{}/{path}", self.endpoint))
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(HEADER_DATE, date)
            .header(HEADER_VERSION, API_VERSION))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        request.send()
            .map_err(|err| StoreError::InternalError { reason: format!("failed to send request to cosmos db: {err:?}") })
    }

    fn write(&self, method: Method, resource_link: &str, path: &str, document: Document, upsert: bool) -> Result<Response, StoreError> {
        let mut request = self.request(method, RESOURCE_DOCS, resource_link, path)?
            .header(HEADER_PARTITION_KEY, partition_key_header(&document.partition_key))
            .json(&document.to_value());
        if upsert {
            request = request.header(HEADER_UPSERT, "True");
        }
        if let Some(etag) = &document.etag {
            request = request.header(reqwest::header::IF_MATCH, etag.as_str());
        }
        self.send(request)
    }
}

impl DocumentStore for CosmosStore {
    fn read(&self, id: &str, partition_key: &str) -> Result<Option<Document>, StoreError> {
        let link = self.document_link(id);
        let request = self.request(Method::GET, RESOURCE_DOCS, &link, &link)?
            .header(HEADER_PARTITION_KEY, partition_key_header(partition_key));
        let response = self.send(request)?;

        match response.status() {
            StatusCode::OK => parse_document(response, partition_key).map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(unexpected_status(response)),
        }
    }

    fn create(&self, document: Document) -> Result<Document, StoreError> {
        let link = self.container_link();
        let path = format!("{link}/docs");
        let id = document.id.clone();
        let partition_key = document.partition_key.clone();
        let response = self.write(Method::POST, &link, &path, document, false)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => parse_document(response, &partition_key),
            StatusCode::CONFLICT => Err(StoreError::Conflict { id }),
            _ => Err(unexpected_status(response)),
        }
    }

    fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError> {
        let link = self.document_link(id);
        let partition_key = document.partition_key.clone();
        let response = self.write(Method::PUT, &link, &link, document, false)?;

        match response.status() {
            StatusCode::OK => parse_document(response, &partition_key),
            StatusCode::PRECONDITION_FAILED => Err(StoreError::PreconditionFailed { id: id.to_owned() }),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound { id: id.to_owned() }),
            _ => Err(unexpected_status(response)),
        }
    }

    fn upsert(&self, document: Document) -> Result<Document, StoreError> {
        let link = self.container_link();
        let path = format!("{link}/docs");
        let partition_key = document.partition_key.clone();
        let response = self.write(Method::POST, &link, &path, document, true)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => parse_document(response, &partition_key),
            _ => Err(unexpected_status(response)),
        }
    }
}

/// Master key token as described by the cosmos db REST authorization scheme.
pub fn authorization_token(key: &[u8], verb: &str, resource_type: &str, resource_link: &str, date: &str) -> Result<String, StoreError> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase(),
    );

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| StoreError::InvalidCredential { reason: format!("hmac init failed: {err:?}") })?;
    mac.update(payload.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    Ok(urlencoding::encode(&format!("type=master&ver=1.0&sig={signature}")).into_owned())
}

fn partition_key_header(partition_key: &str) -> String {
    Value::Array(vec![Value::String(partition_key.to_owned())]).to_string()
}

fn parse_document(response: Response, partition_key: &str) -> Result<Document, StoreError> {
    let value: Value = response.json()
        .map_err(|err| StoreError::MalformedDocument { reason: format!("failed to decode cosmos db response: {err:?}") })?;
    Ok(Document::from_value(value)?.with_partition_key(partition_key))
}

fn unexpected_status(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    debug!(%status, %body, "unexpected response from cosmos db");
    StoreError::InternalError { reason: format!("cosmos db responded with {status}: {body}") }
}
