use {
    std::{fs, path::Path},
    serde_json::Value,
    thiserror::Error,
    tracing::info,
    crate::runtime::{
        error::StoreError,
        store::{Document, DocumentStore},
    },
};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read {path}: {reason}")]
    FailedToRead { path: String, reason: String },

    #[error("failed to parse json: {0}")]
    InvalidJson(serde_json::Error),

    #[error("document #{index} is invalid: {error}")]
    InvalidDocument { index: usize, error: StoreError },

    #[error("failed to upsert document {id:?}: {error}")]
    Store { id: String, error: StoreError },
}

/// Reads a json file holding one document (object) or a list of documents.
/// Partition key of each document defaults to its id.
pub fn load_documents(path: &Path, partition_key: Option<&str>) -> Result<Vec<Document>, UploadError> {
    let contents = fs::read(path)
        .map_err(|err| UploadError::FailedToRead { path: path.display().to_string(), reason: err.to_string() })?;
    parse_documents(&contents, partition_key)
}

pub fn parse_documents(contents: &[u8], partition_key: Option<&str>) -> Result<Vec<Document>, UploadError> {
    let values = match serde_json::from_slice(contents).map_err(UploadError::InvalidJson)? {
        Value::Array(values) => values,
        other => vec![other],
    };

    values.into_iter()
        .enumerate()
        .map(|(index, value)| {
            let document = Document::from_value(value)
                .map_err(|error| UploadError::InvalidDocument { index, error })?;
            Ok(match partition_key {
                Some(partition_key) => document.with_partition_key(partition_key),
                None => document,
            })
        })
        .collect()
}

/// Upserts documents in order, stopping at the first failure.
pub fn upload(store: &impl DocumentStore, documents: Vec<Document>) -> Result<usize, UploadError> {
    let mut written = 0;
    for document in documents {
        let id = document.id.clone();
        store.upsert(document).map_err(|error| UploadError::Store { id: id.clone(), error })?;
        info!(%id, "document uploaded");
        written += 1;
    }
    Ok(written)
}
