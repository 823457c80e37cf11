use {
    std::{collections::HashMap, sync::{Arc, Mutex}, path::Path},
    serde_json::{Map, Value},
    rusqlite::{Connection, ErrorCode, OptionalExtension},
    thiserror::Error,
    crate::runtime::error::StoreError,
};

pub const FIELD_ID: &str = "id";
pub const FIELD_ETAG: &str = "_etag";

/// Json document as kept by a document store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub partition_key: String,
    /// Full json object, including `id`.
    pub body: Map<String, Value>,
    /// Concurrency token assigned by the store on every write.
    /// When set, replace only succeeds if the stored document still carries the same token.
    pub etag: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut body = Map::new();
        body.insert(FIELD_ID.to_owned(), Value::String(id.clone()));
        Self {
            partition_key: id.clone(),
            id,
            body,
            etag: None,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        let body = match value {
            Value::Object(v) => v,
            other => return Err(StoreError::MalformedDocument { reason: format!("expected json object, got: {other}") }),
        };
        let id = match body.get(FIELD_ID) {
            Some(Value::String(v)) if !v.is_empty() => v.clone(),
            _ => return Err(StoreError::MalformedDocument { reason: "document must have a non-empty string id".to_owned() }),
        };
        let etag = match body.get(FIELD_ETAG) {
            Some(Value::String(v)) => Some(v.clone()),
            _ => None,
        };

        Ok(Self {
            partition_key: id.clone(),
            id,
            body,
            etag,
        })
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = partition_key.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.body.insert(key.into(), value.into());
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

pub trait DocumentStore {
    /// Reads document by id. Missing document is `Ok(None)`.
    fn read(&self, id: &str, partition_key: &str) -> Result<Option<Document>, StoreError>;

    /// Creates a new document, failing with `StoreError::Conflict` if it already exists.
    fn create(&self, document: Document) -> Result<Document, StoreError>;

    /// Replaces existing document. Honors `document.etag` as a write precondition.
    fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError>;

    /// Creates or overwrites document unconditionally.
    fn upsert(&self, document: Document) -> Result<Document, StoreError>;
}

impl<T: DocumentStore> DocumentStore for Arc<T> {
    fn read(&self, id: &str, partition_key: &str) -> Result<Option<Document>, StoreError> { self.as_ref().read(id, partition_key) }
    fn create(&self, document: Document) -> Result<Document, StoreError> { self.as_ref().create(document) }
    fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError> { self.as_ref().replace(id, document) }
    fn upsert(&self, document: Document) -> Result<Document, StoreError> { self.as_ref().upsert(document) }
}

#[derive(Clone)]
pub struct BoxedStore {
    inner: Arc<Box<dyn DocumentStore + Send + Sync>>,
}

impl BoxedStore {
    pub fn new<T: DocumentStore + Send + Sync + 'static>(inner: T) -> Self {
        Self {
            inner: Arc::new(Box::new(inner)),
        }
    }
}

impl DocumentStore for BoxedStore {
    fn read(&self, id: &str, partition_key: &str) -> Result<Option<Document>, StoreError> {
        self.inner.read(id, partition_key)
    }

    fn create(&self, document: Document) -> Result<Document, StoreError> {
        self.inner.create(document)
    }

    fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError> {
        self.inner.replace(id, document)
    }

    fn upsert(&self, document: Document) -> Result<Document, StoreError> {
        self.inner.upsert(document)
    }
}

pub trait WithDocument: Sized {
    fn with_document(self, document: Document) -> Result<Self, StoreError>;
}

impl<S: DocumentStore> WithDocument for S {
    fn with_document(self, document: Document) -> Result<Self, StoreError> {
        self.upsert(document)?;
        Ok(self)
    }
}

/// Operation as observed by `MemoryStore`, recorded before it is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    Read { id: String },
    Create { document: Document },
    Replace { id: String, document: Document },
    Upsert { document: Document },
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryStoreState>,
}

#[derive(Default)]
struct MemoryStoreState {
    documents: HashMap<(String, String), Document>,
    version: u64,
    operations: Vec<StoreOperation>,
}

impl MemoryStoreState {
    fn next_etag(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn write(&mut self, mut document: Document) -> Document {
        document.etag = Some(self.next_etag());
        self.documents.insert((document.partition_key.clone(), document.id.clone()), document.clone());
        document
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> Vec<StoreOperation> {
        self.lock().map(|v| v.operations.clone()).unwrap_or_default()
    }

    pub fn operations_count(&self) -> usize {
        self.lock().map(|v| v.operations.len()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreState>, StoreError> {
        self.state.lock()
            .map_err(|err| StoreError::InternalError { reason: format!("failed to lock memory store: {err:?}") })
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, id: &str, partition_key: &str) -> Result<Option<Document>, StoreError> {
        let mut state = self.lock()?;
        state.operations.push(StoreOperation::Read { id: id.to_owned() });
        Ok(state.documents.get(&(partition_key.to_owned(), id.to_owned())).cloned())
    }

    fn create(&self, document: Document) -> Result<Document, StoreError> {
        let mut state = self.lock()?;
        state.operations.push(StoreOperation::Create { document: document.clone() });
        if state.documents.contains_key(&(document.partition_key.clone(), document.id.clone())) {
            return Err(StoreError::Conflict { id: document.id });
        }
        Ok(state.write(document))
    }

    fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError> {
        let mut state = self.lock()?;
        state.operations.push(StoreOperation::Replace { id: id.to_owned(), document: document.clone() });
        if document.id != id {
            return Err(StoreError::MalformedDocument { reason: format!("document id {:?} does not match replaced id {id:?}", document.id) });
        }

        let stored_etag = match state.documents.get(&(document.partition_key.clone(), id.to_owned())) {
            Some(v) => v.etag.clone(),
            None => return Err(StoreError::NotFound { id: id.to_owned() }),
        };
        if document.etag.is_some() && document.etag != stored_etag {
            return Err(StoreError::PreconditionFailed { id: id.to_owned() });
        }

        Ok(state.write(document))
    }

    fn upsert(&self, document: Document) -> Result<Document, StoreError> {
        let mut state = self.lock()?;
        state.operations.push(StoreOperation::Upsert { document: document.clone() });
        Ok(state.write(document))
    }
}

/// Document store kept in a local sqlite database. Etag is a per-document version counter.
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

#[derive(Error, Debug)]
pub enum SqliteStoreConnectionError {
    #[error("failed to open connection: {0:?}")]
    ConnectionOpenError(rusqlite::Error),

    #[error("failed to init database: {0:?}")]
    DatabaseInitError(rusqlite::Error),
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SqliteStoreConnectionError> {
        Self::from_connection(
            Connection::open(path)
                .map_err(SqliteStoreConnectionError::ConnectionOpenError)?
        )
    }

    pub fn in_memory() -> Result<Self, SqliteStoreConnectionError> {
        Self::from_connection(
            Connection::open_in_memory()
                .map_err(SqliteStoreConnectionError::ConnectionOpenError)?
        )
    }

    fn from_connection(connection: Connection) -> Result<Self, SqliteStoreConnectionError> {
        connection.execute(
            "create table if not exists documents (partition_key text not null, id text not null, body text not null, version integer not null, primary key (partition_key, id))",
            ()
        ).map_err(SqliteStoreConnectionError::DatabaseInitError)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock()
            .map_err(|err| StoreError::InternalError { reason: format!("failed to acquire sqlite connection: {err:?}") })
    }
}

fn encode_body(document: &Document) -> Result<String, StoreError> {
    serde_json::to_string(&document.body)
        .map_err(|err| StoreError::MalformedDocument { reason: format!("failed to encode document body: {err:?}") })
}

fn decode_body(body: &str) -> Result<Map<String, Value>, StoreError> {
    serde_json::from_str(body)
        .map_err(|err| StoreError::MalformedDocument { reason: format!("failed to decode stored document body: {err:?}") })
}

fn sqlite_error(err: rusqlite::Error) -> StoreError {
    StoreError::InternalError { reason: format!("failed to execute sqlite query: {err:?}") }
}

fn select_version(connection: &Connection, partition_key: &str, id: &str) -> Result<Option<i64>, StoreError> {
    connection.query_row(
        "select version from documents where partition_key = ?1 and id = ?2",
        (partition_key, id),
        |row| row.get(0)
    ).optional().map_err(sqlite_error)
}

impl DocumentStore for SqliteStore {
    fn read(&self, id: &str, partition_key: &str) -> Result<Option<Document>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(String, i64)> = connection.query_row(
            "select body, version from documents where partition_key = ?1 and id = ?2",
            (partition_key, id),
            |row| Ok((row.get(0)?, row.get(1)?))
        ).optional().map_err(sqlite_error)?;

        match row {
            Some((body, version)) => Ok(Some(Document {
                id: id.to_owned(),
                partition_key: partition_key.to_owned(),
                body: decode_body(&body)?,
                etag: Some(version.to_string()),
            })),
            None => Ok(None),
        }
    }

    fn create(&self, document: Document) -> Result<Document, StoreError> {
        let connection = self.lock()?;
        let body = encode_body(&document)?;
        let result = connection.execute(
            "insert into documents (partition_key, id, body, version) values (?1, ?2, ?3, 1)",
            (&document.partition_key, &document.id, &body)
        );
        match result {
            Ok(_) => Ok(document.with_etag(Some(1.to_string()))),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Conflict { id: document.id })
            },
            Err(err) => Err(sqlite_error(err)),
        }
    }

    fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError> {
        if document.id != id {
            return Err(StoreError::MalformedDocument { reason: format!("document id {:?} does not match replaced id {id:?}", document.id) });
        }

        let connection = self.lock()?;
        let body = encode_body(&document)?;
        let updated = match &document.etag {
            Some(etag) => match etag.parse::<i64>() {
                Ok(expected_version) => connection.execute(
                    "update documents set body = ?1, version = version + 1 where partition_key = ?2 and id = ?3 and version = ?4",
                    (&body, &document.partition_key, id, expected_version)
                ).map_err(sqlite_error)?,
                // not a token this store has issued, so it cannot match
                Err(_) => 0,
            },
            None => connection.execute(
                "update documents set body = ?1, version = version + 1 where partition_key = ?2 and id = ?3",
                (&body, &document.partition_key, id)
            ).map_err(sqlite_error)?,
        };

        match select_version(&connection, &document.partition_key, id)? {
            Some(version) if updated > 0 => Ok(document.with_etag(Some(version.to_string()))),
            Some(_) => Err(StoreError::PreconditionFailed { id: id.to_owned() }),
            None => Err(StoreError::NotFound { id: id.to_owned() }),
        }
    }

    fn upsert(&self, document: Document) -> Result<Document, StoreError> {
        let connection = self.lock()?;
        let body = encode_body(&document)?;
        connection.execute(
            "insert into documents (partition_key, id, body, version) values (?1, ?2, ?3, 1) \
             on conflict (partition_key, id) do update set body = excluded.body, version = documents.version + 1",
            (&document.partition_key, &document.id, &body)
        ).map_err(sqlite_error)?;

        let version = select_version(&connection, &document.partition_key, &document.id)?
            .ok_or_else(|| StoreError::InternalError { reason: format!("document {:?} missing right after upsert", document.id) })?;
        Ok(document.with_etag(Some(version.to_string())))
    }
}
