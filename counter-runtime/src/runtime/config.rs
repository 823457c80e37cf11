use {
    std::{collections::HashMap, sync::OnceLock, time::Duration},
    reqwest::blocking::Client,
    crate::runtime::{
        cosmos::{CosmosStore, build_client},
        error::{SettingsError, StoreError},
        store::BoxedStore,
    },
};

const ENV_ENDPOINT: &[&str] = &["COSMOS_DB_URL", "COSMOS_DB_ENDPOINT"];
const ENV_KEY: &[&str] = &["COSMOS_DB_KEY"];
const ENV_DATABASE: &[&str] = &["COSMOS_DB_NAME", "COSMOS_DB_DATABASE_NAME"];
const ENV_CONTAINER: &[&str] = &["COSMOS_DB_CONTAINER", "COSMOS_DB_CONTAINER_NAME"];

pub const DEFAULT_DATABASE: &str = "Counter";
pub const DEFAULT_CONTAINER: &str = "Visitors";

/// Source of configuration values. Looked up on every invocation, nothing is cached.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoreSettings {
    pub endpoint: String,
    pub key: String,
    pub database: String,
    pub container: String,
}

impl StoreSettings {
    pub fn from_env(env: &dyn Environment) -> Result<Self, SettingsError> {
        let endpoint = first_non_empty(env, ENV_ENDPOINT);
        let key = first_non_empty(env, ENV_KEY);

        let (endpoint, key) = match (endpoint, key) {
            (Some(endpoint), Some(key)) => (endpoint, key),
            _ => return Err(SettingsError::MissingEndpointOrKey),
        };

        Ok(Self {
            endpoint,
            key,
            database: first_non_empty(env, ENV_DATABASE).unwrap_or_else(|| DEFAULT_DATABASE.to_owned()),
            container: first_non_empty(env, ENV_CONTAINER).unwrap_or_else(|| DEFAULT_CONTAINER.to_owned()),
        })
    }
}

fn first_non_empty(env: &dyn Environment, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env.var(key))
        .find(|v| !v.trim().is_empty())
}

/// Opens a store for validated settings.
pub trait StoreConnector {
    fn connect(&self, settings: &StoreSettings) -> Result<BoxedStore, StoreError>;
}

impl<T: StoreConnector + ?Sized> StoreConnector for Box<T> {
    fn connect(&self, settings: &StoreSettings) -> Result<BoxedStore, StoreError> {
        self.as_ref().connect(settings)
    }
}

/// Connects to cosmos db, verifying that database and container exist.
/// Settings are taken per call, the http client is shared by all connections.
pub struct CosmosConnector {
    request_timeout: Duration,
    // built on first connect; blocking client must not be created on the async runtime
    client: OnceLock<Client>,
}

impl CosmosConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<Client, StoreError> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }
        let client = build_client(self.request_timeout)?;
        Ok(self.client.get_or_init(|| client).clone())
    }
}

impl StoreConnector for CosmosConnector {
    fn connect(&self, settings: &StoreSettings) -> Result<BoxedStore, StoreError> {
        let store = CosmosStore::new(settings, self.client()?)?;
        store.check_container()?;
        Ok(BoxedStore::new(store))
    }
}

/// Hands out the same store regardless of settings. Used for local sqlite and memory stores.
#[derive(Clone)]
pub struct SharedStoreConnector {
    store: BoxedStore,
}

impl SharedStoreConnector {
    pub fn new(store: BoxedStore) -> Self {
        Self {
            store,
        }
    }
}

impl StoreConnector for SharedStoreConnector {
    fn connect(&self, _settings: &StoreSettings) -> Result<BoxedStore, StoreError> {
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use {
        httpmock::prelude::*,
        serde_json::json,
        super::*,
    };

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn settings_with_defaults() {
        let settings = StoreSettings::from_env(&env(&[
            ("COSMOS_DB_URL", "https://example.documents.azure.com:443/"),
            ("COSMOS_DB_KEY", "a2V5"),
        ])).unwrap();

        assert_eq!(StoreSettings {
            endpoint: "https://example.documents.azure.com:443/".to_owned(),
            key: "a2V5".to_owned(),
            database: "Counter".to_owned(),
            container: "Visitors".to_owned(),
        }, settings);
    }

    #[test]
    fn settings_from_loader_variable_names() {
        let settings = StoreSettings::from_env(&env(&[
            ("COSMOS_DB_ENDPOINT", "https://example"),
            ("COSMOS_DB_KEY", "a2V5"),
            ("COSMOS_DB_DATABASE_NAME", "db"),
            ("COSMOS_DB_CONTAINER_NAME", "coll"),
        ])).unwrap();

        assert_eq!("https://example", settings.endpoint);
        assert_eq!("db", settings.database);
        assert_eq!("coll", settings.container);
    }

    #[test]
    fn empty_values_are_missing() {
        assert_eq!(
            Err(SettingsError::MissingEndpointOrKey),
            StoreSettings::from_env(&env(&[("COSMOS_DB_URL", ""), ("COSMOS_DB_KEY", "a2V5")]))
        );
        assert_eq!(
            Err(SettingsError::MissingEndpointOrKey),
            StoreSettings::from_env(&env(&[("COSMOS_DB_URL", "https://example")]))
        );
        assert_eq!(Err(SettingsError::MissingEndpointOrKey), StoreSettings::from_env(&env(&[])));
    }

    #[test]
    fn cosmos_connector_reuses_client() {
        let server = MockServer::start();
        let container = server.mock(|when, then| {
            when.method(GET).path("/dbs/Counter/colls/Visitors");
            then.status(200).json_body(json!({ "id": "Visitors" }));
        });
        let endpoint = server.base_url();
        let settings = StoreSettings::from_env(&env(&[
            ("COSMOS_DB_URL", endpoint.as_str()),
            ("COSMOS_DB_KEY", "dGVzdC1tYXN0ZXIta2V5"),
        ])).unwrap();

        let connector = CosmosConnector::new(Duration::from_secs(5));
        assert!(connector.client.get().is_none());

        connector.connect(&settings).unwrap();
        assert!(connector.client.get().is_some());
        connector.connect(&settings).unwrap();

        // settings are still checked against the store on every connect
        container.assert_hits(2);
    }
}
