use {
    serde::Serialize,
    serde_json::Value,
    reqwest::{Client, StatusCode},
    thiserror::Error,
    tracing::info,
};

pub const PORKBUN_API_BASE: &str = "https://api.porkbun.com/api/json/v3";
pub const DEFAULT_TTL: &str = "600";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum RecordType {
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "TXT")]
    Txt,
}

#[derive(Debug, Clone)]
pub struct PorkbunCredentials {
    pub api_key: String,
    pub secret_api_key: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DnsRecord {
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: String,
    pub notes: Option<String>,
}

/// Payload of porkbun `dns/create`. Credentials travel in the body.
#[derive(Debug, Serialize)]
struct CreateRecordPayload<'a> {
    apikey: &'a str,
    secretapikey: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    record_type: RecordType,
    content: &'a str,
    ttl: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug)]
pub enum CreateRecordOutcome {
    Created(Value),
    Rejected { status: StatusCode, body: String },
}

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("failed to send request to dns api: {reason}")]
    Transport { reason: String },

    #[error("dns api returned invalid response: {reason}")]
    InvalidResponse { reason: String },
}

pub struct PorkbunClient {
    client: Client,
    api_base: String,
    credentials: PorkbunCredentials,
}

impl PorkbunClient {
    pub fn new(api_base: impl Into<String>, credentials: PorkbunCredentials) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            credentials,
        }
    }

    pub async fn create_record(&self, domain: &str, record: &DnsRecord) -> Result<CreateRecordOutcome, DnsError> {
        let payload = CreateRecordPayload {
            apikey: &self.credentials.api_key,
            secretapikey: &self.credentials.secret_api_key,
            name: &record.name,
            record_type: record.record_type,
            content: &record.content,
            ttl: &record.ttl,
            notes: record.notes.as_deref(),
        };

        info!(domain, name = %record.name, record_type = ?record.record_type, "creating dns record");
        let response = self.client.post(format!("{}/dns/create/{domain}", self.api_base))
            .json(&payload)
            .send()
            .await
            .map_err(|err| DnsError::Transport { reason: format!("{err:?}") })?;

        let status = response.status();
        if status == StatusCode::OK {
            let body = response.json::<Value>().await
                .map_err(|err| DnsError::InvalidResponse { reason: format!("expected json body: {err:?}") })?;
            Ok(CreateRecordOutcome::Created(body))
        } else {
            let body = response.text().await
                .map_err(|err| DnsError::InvalidResponse { reason: format!("failed to read response body: {err:?}") })?;
            Ok(CreateRecordOutcome::Rejected { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        httpmock::prelude::*,
        serde_json::json,
        super::*,
    };

    fn client(server: &MockServer) -> PorkbunClient {
        PorkbunClient::new(server.base_url(), PorkbunCredentials {
            api_key: "pk1_test".to_owned(),
            secret_api_key: "sk1_test".to_owned(),
        })
    }

    fn cname() -> DnsRecord {
        DnsRecord {
            record_type: RecordType::Cname,
            name: "resume".to_owned(),
            content: "resume-endpoint.azurefd.net".to_owned(),
            ttl: DEFAULT_TTL.to_owned(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn create_cname_record() {
        let server = MockServer::start_async().await;
        let mock = server.mock_async(|when, then| {
            when.method(POST)
                .path("/dns/create/example.com")
                .json_body(json!({
                    "apikey": "pk1_test",
                    "secretapikey": "sk1_test",
                    "name": "resume",
                    "type": "CNAME",
                    "content": "resume-endpoint.azurefd.net",
                    "ttl": "600",
                }));
            then.status(200).json_body(json!({ "status": "SUCCESS", "id": 106926659 }));
        }).await;

        let outcome = client(&server).create_record("example.com", &cname()).await.unwrap();
        mock.assert_async().await;
        match outcome {
            CreateRecordOutcome::Created(body) => assert_eq!(json!("SUCCESS"), body["status"]),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_txt_record_with_notes() {
        let server = MockServer::start_async().await;
        let mock = server.mock_async(|when, then| {
            when.method(POST)
                .path("/dns/create/example.com")
                .json_body_partial(r#"{ "type": "TXT", "name": "_dnsauth.resume", "notes": "Cloud Resume Challenge" }"#);
            then.status(200).json_body(json!({ "status": "SUCCESS" }));
        }).await;

        let record = DnsRecord {
            record_type: RecordType::Txt,
            name: "_dnsauth.resume".to_owned(),
            content: "validation-token".to_owned(),
            ttl: DEFAULT_TTL.to_owned(),
            notes: Some("Cloud Resume Challenge".to_owned()),
        };
        client(&server).create_record("example.com", &record).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_record_keeps_raw_body() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST).path("/dns/create/example.com");
            then.status(400).body("Invalid API key.");
        }).await;

        match client(&server).create_record("example.com", &cname()).await.unwrap() {
            CreateRecordOutcome::Rejected { status, body } => {
                assert_eq!(StatusCode::BAD_REQUEST, status);
                assert_eq!("Invalid API key.", body);
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
