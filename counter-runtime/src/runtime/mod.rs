pub use crate::runtime::{
    counter::VisitorCounter,
    store::{BoxedStore, Document, DocumentStore, MemoryStore, SqliteStore},
};

pub mod config;
pub mod cosmos;
pub mod counter;
pub mod error;
pub mod store;
