use {
    tracing::{info, warn, error},
    counter_common::{HttpRequest, HttpResponse, CountBody, IncrementBody, ErrorBody},
    hyper::{Method, StatusCode},
    serde_json::Value,
    crate::runtime::{
        config::{Environment, StoreConnector, StoreSettings},
        error::StoreError,
        store::{BoxedStore, Document, DocumentStore},
    },
};

/// Id (and partition key) of the single counter document.
pub const COUNTER_ID: &str = "1";
pub const FIELD_COUNT: &str = "count";

/// Upper bound on read-increment-write rounds for a single POST when other writers keep winning.
pub const MAX_INCREMENT_ATTEMPTS: usize = 5;

pub const ERROR_MISSING_CONFIGURATION: &str = "Missing Cosmos DB URL or key in environment variables.";
pub const ERROR_CONTAINER_NOT_FOUND: &str = "Database or container not found.";
pub const ERROR_RECORD_NOT_FOUND: &str = "Visitor record not found.";
pub const ERROR_METHOD_NOT_ALLOWED: &str = "Method not allowed. Use GET or POST.";
pub const ERROR_UPDATE_CONFLICT: &str = "Visitor count update conflicted, please retry.";
pub const ERROR_STORAGE: &str = "Internal storage error.";

/// Visitor counter http handler. Stateless between invocations: settings are resolved
/// from the environment and the store is connected on every call.
pub struct VisitorCounter {
    environment: Box<dyn Environment + Send + Sync>,
    connector: Box<dyn StoreConnector + Send + Sync>,
}

enum IncrementOutcome {
    Created,
    Incremented { new_count: u64 },
}

impl VisitorCounter {
    pub fn new<E, C>(environment: E, connector: C) -> Self
    where
        E: Environment + Send + Sync + 'static,
        C: StoreConnector + Send + Sync + 'static,
    {
        Self {
            environment: Box::new(environment),
            connector: Box::new(connector),
        }
    }

    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        info!(method = %request.method, "processing http request for visitor counter");

        let settings = match StoreSettings::from_env(self.environment.as_ref()) {
            Ok(v) => v,
            Err(err) => {
                warn!("visitor counter is misconfigured: {err}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, ERROR_MISSING_CONFIGURATION);
            }
        };

        if request.method != Method::GET && request.method != Method::POST {
            return error_response(StatusCode::METHOD_NOT_ALLOWED, ERROR_METHOD_NOT_ALLOWED);
        }

        let store = match self.connector.connect(&settings) {
            Ok(v) => v,
            Err(err) => return store_error_response(err),
        };

        let result = if request.method == Method::GET {
            read_count(&store)
        } else {
            increment(&store)
        };

        result.unwrap_or_else(store_error_response)
    }
}

fn read_count(store: &BoxedStore) -> Result<HttpResponse, StoreError> {
    Ok(match store.read(COUNTER_ID, COUNTER_ID)? {
        Some(document) => HttpResponse::new().with_json(&CountBody { count: count_of(&document)? }),
        None => error_response(StatusCode::NOT_FOUND, ERROR_RECORD_NOT_FOUND),
    })
}

fn increment(store: &BoxedStore) -> Result<HttpResponse, StoreError> {
    for attempt in 1..=MAX_INCREMENT_ATTEMPTS {
        match try_increment(store) {
            Ok(IncrementOutcome::Created) => {
                info!("visitor record created");
                return Ok(HttpResponse::new()
                    .with_status(StatusCode::CREATED)
                    .with_json(&IncrementBody::created()));
            },
            Ok(IncrementOutcome::Incremented { new_count }) => {
                info!(new_count, "visitor count incremented");
                return Ok(HttpResponse::new().with_json(&IncrementBody::incremented(new_count)));
            },
            Err(err) if err.is_write_conflict() => {
                warn!(attempt, "concurrent visitor count update, retrying: {err}");
            },
            Err(err) => return Err(err),
        }
    }

    warn!("giving up on visitor count update after {MAX_INCREMENT_ATTEMPTS} attempts");
    Ok(error_response(StatusCode::CONFLICT, ERROR_UPDATE_CONFLICT))
}

fn try_increment(store: &BoxedStore) -> Result<IncrementOutcome, StoreError> {
    match store.read(COUNTER_ID, COUNTER_ID)? {
        Some(mut document) => {
            let new_count = count_of(&document)?
                .checked_add(1)
                .ok_or_else(|| StoreError::MalformedDocument { reason: "visitor count overflow".to_owned() })?;
            // etag from the read stays on the document, making the replace conditional
            document.set_field(FIELD_COUNT, new_count);
            store.replace(COUNTER_ID, document)?;
            Ok(IncrementOutcome::Incremented { new_count })
        },
        None => {
            store.create(Document::new(COUNTER_ID).with_field(FIELD_COUNT, 1u64))?;
            Ok(IncrementOutcome::Created)
        },
    }
}

/// Count stored on the document. Missing or null count reads as zero.
/// Whole-number floats (`5.0`) are accepted, as written by some clients.
fn count_of(document: &Document) -> Result<u64, StoreError> {
    let value = match document.field(FIELD_COUNT) {
        None | Some(Value::Null) => return Ok(0),
        Some(value) => value,
    };

    if let Some(count) = value.as_u64() {
        return Ok(count);
    }

    match value.as_f64() {
        Some(count) if count >= 0.0 && count.fract() == 0.0 && count < u64::MAX as f64 => Ok(count as u64),
        _ => Err(StoreError::MalformedDocument {
            reason: format!("visitor count must be a non-negative integer, got: {value}"),
        }),
    }
}

fn store_error_response(err: StoreError) -> HttpResponse {
    match err {
        StoreError::ContainerNotFound { .. } => {
            warn!("visitor counter store is missing: {err}");
            error_response(StatusCode::NOT_FOUND, ERROR_CONTAINER_NOT_FOUND)
        },
        other => {
            error!("internal error while serving visitor counter request: {other:?}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, ERROR_STORAGE)
        },
    }
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::new()
        .with_status(status)
        .with_json(&ErrorBody::new(message))
}

#[cfg(test)]
mod tests {
    use {
        serde_json::json,
        super::*,
    };

    #[test]
    fn count_defaults_to_zero() {
        assert_eq!(0, count_of(&Document::new(COUNTER_ID)).unwrap());
        assert_eq!(0, count_of(&Document::new(COUNTER_ID).with_field(FIELD_COUNT, Value::Null)).unwrap());
        assert_eq!(12, count_of(&Document::new(COUNTER_ID).with_field(FIELD_COUNT, 12)).unwrap());
    }

    #[test]
    fn whole_float_count() {
        assert_eq!(5, count_of(&Document::new(COUNTER_ID).with_field(FIELD_COUNT, json!(5.0))).unwrap());
        assert_eq!(0, count_of(&Document::new(COUNTER_ID).with_field(FIELD_COUNT, json!(0.0))).unwrap());
    }

    #[test]
    fn count_must_be_non_negative_integer() {
        for value in [json!(-1), json!(1.5), json!(-2.0), json!(1e30), json!("3")] {
            let document = Document::new(COUNTER_ID).with_field(FIELD_COUNT, value);
            assert!(matches!(count_of(&document), Err(StoreError::MalformedDocument { .. })));
        }
    }

    #[test]
    fn unexpected_store_error_hides_details() {
        let response = store_error_response(StoreError::InternalError { reason: "connection refused to 10.0.0.1".to_owned() });
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status);
        assert_eq!(ErrorBody::new(ERROR_STORAGE), response.json::<ErrorBody>().unwrap());
    }
}
