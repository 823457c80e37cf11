use {
    std::{path::PathBuf, time::Duration},
    tokio::{fs, io},
    serde::Deserialize,
    thiserror::Error,
    tracing::Level,
    crate::runtime::{
        config::{CosmosConnector, SharedStoreConnector, StoreConnector},
        error::StoreError,
        store::{BoxedStore, MemoryStore, SqliteStore},
    },
};

const DEFAULT_PORT: u16 = 7071;
const DEFAULT_ROUTE: &str = "/api/http_trigger";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct ServerConfig {
    #[serde(skip_deserializing)]
    pub config_path: Option<PathBuf>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_route")]
    pub route: String,

    #[serde(default)]
    pub store: StoreConfig,

    pub logger: Option<LoggerConfig>,
    pub log_level: Option<LogLevel>,

    /// Value of `access-control-allow-origin` added to every response.
    pub cors_allow_origin: Option<String>,

    /// Size of the worker pool running the handler. Defaults to number of cpus.
    pub workers: Option<usize>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_route() -> String {
    DEFAULT_ROUTE.to_owned()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            port: DEFAULT_PORT,
            route: DEFAULT_ROUTE.to_owned(),
            store: StoreConfig::default(),
            logger: None,
            log_level: None,
            cors_allow_origin: None,
            workers: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(tag = "driver")]
pub enum StoreConfig {
    #[serde(rename = "cosmos")]
    Cosmos {
        request_timeout_secs: Option<u64>,
    },
    #[serde(rename = "sqlite")]
    Sqlite {
        path: String,
    },
    #[serde(rename = "memory")]
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Cosmos { request_timeout_secs: None }
    }
}

impl StoreConfig {
    pub fn connector(&self) -> Result<Box<dyn StoreConnector + Send + Sync>, StoreError> {
        Ok(match self {
            Self::Cosmos { request_timeout_secs } => Box::new(CosmosConnector::new(
                Duration::from_secs(request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
            )),
            Self::Sqlite { path } => {
                let store = SqliteStore::new(path)
                    .map_err(|err| StoreError::InternalError { reason: format!("failed to open sqlite store at {path:?}: {err}") })?;
                Box::new(SharedStoreConnector::new(BoxedStore::new(store)))
            },
            Self::Memory => Box::new(SharedStoreConnector::new(BoxedStore::new(MemoryStore::new()))),
        })
    }
}

#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum LoggerConfig {
    #[serde(rename = "stdout")]
    Stdout,
    #[serde(rename = "noop")]
    Noop,
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerConfigLoadError {
    #[error("failed to read config file: {0:?}")]
    FailedToRead(io::Error),

    #[error("failed to parse config file: {0}")]
    FailedToParse(serde_yml::Error),
}

impl ServerConfig {
    pub async fn load(file_path: PathBuf) -> Result<Self, ServerConfigLoadError> {
        let mut config = Self::from_yaml(
            &fs::read(&file_path).await.map_err(ServerConfigLoadError::FailedToRead)?
        )?;
        config.config_path = Some(file_path);
        Ok(config)
    }

    pub fn from_yaml(config: &[u8]) -> Result<Self, ServerConfigLoadError> {
        serde_yml::from_slice(config).map_err(ServerConfigLoadError::FailedToParse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let config = ServerConfig::from_yaml(br#"
port: 8080
route: /api/visitors
store:
  driver: sqlite
  path: data/counter.sqlite
logger:
  type: noop
log_level: debug
cors_allow_origin: https://resume.example.com
workers: 2
"#).unwrap();

        assert_eq!(ServerConfig {
            config_path: None,
            port: 8080,
            route: "/api/visitors".to_owned(),
            store: StoreConfig::Sqlite { path: "data/counter.sqlite".to_owned() },
            logger: Some(LoggerConfig::Noop),
            log_level: Some(LogLevel::Debug),
            cors_allow_origin: Some("https://resume.example.com".to_owned()),
            workers: Some(2),
        }, config);
    }

    #[test]
    fn empty_config_uses_defaults() {
        assert_eq!(ServerConfig::default(), ServerConfig::from_yaml(b"{}").unwrap());
    }

    #[test]
    fn cosmos_store_config() {
        let config = ServerConfig::from_yaml(b"store:\n  driver: cosmos\n  request_timeout_secs: 5\n").unwrap();
        assert_eq!(StoreConfig::Cosmos { request_timeout_secs: Some(5) }, config.store);
    }

    #[test]
    fn unknown_store_driver() {
        assert!(matches!(
            ServerConfig::from_yaml(b"store:\n  driver: redis\n"),
            Err(ServerConfigLoadError::FailedToParse(_))
        ));
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.yaml");
        std::fs::write(&path, "port: 9000\nstore:\n  driver: memory\n").unwrap();

        let config = ServerConfig::load(path.clone()).await.unwrap();
        assert_eq!(9000, config.port);
        assert_eq!(StoreConfig::Memory, config.store);
        assert_eq!(Some(path), config.config_path);
    }

    #[tokio::test]
    async fn load_missing_file() {
        assert!(matches!(
            ServerConfig::load(PathBuf::from("does-not-exist.yaml")).await,
            Err(ServerConfigLoadError::FailedToRead(_))
        ));
    }
}
