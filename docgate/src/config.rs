//! Runtime settings and backend selection.
//!
//! Settings come from a JSON document or from the `DOCGATE_ENV`,
//! `DOCGATE_CONNECTION_STRING` and `DOCGATE_DATABASE` environment variables.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
};
use docgate_memory::InMemoryStore;

pub const ENV_ENVIRONMENT: &str = "DOCGATE_ENV";
pub const ENV_CONNECTION_STRING: &str = "DOCGATE_CONNECTION_STRING";
pub const ENV_DATABASE: &str = "DOCGATE_DATABASE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DocumentStoreError::Initialization(format!(
                "unknown environment {other:?}"
            ))),
        }
    }
}

/// Where the gateway's store lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub connection_string: Option<String>,
    pub database: Option<String>,
}

impl RuntimeSettings {
    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the settings from the process environment.
    pub fn from_env() -> DocumentStoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> DocumentStoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            environment: read(ENV_ENVIRONMENT)
                .map(|value| value.parse())
                .transpose()?
                .unwrap_or_default(),
            connection_string: read(ENV_CONNECTION_STRING),
            database: read(ENV_DATABASE),
        })
    }

    /// Builds the configured backend.
    ///
    /// A connection string selects MongoDB when the `mongodb` feature is enabled.
    /// Otherwise the in-memory store is used, which production refuses.
    pub async fn connect(&self) -> DocumentStoreResult<Arc<dyn StoreBackend>> {
        #[cfg(feature = "mongodb")]
        if let Some(dsn) = self.connection_string.as_deref() {
            let mut builder = docgate_mongodb::MongoDbStoreBuilder::new(dsn);
            if let Some(database) = self.database.as_deref() {
                builder = builder.database(database);
            }

            let backend: Arc<dyn StoreBackend> = Arc::new(builder.build().await?);
            info!(environment = %self.environment, "using the MongoDB store");
            return Ok(backend);
        }

        #[cfg(not(feature = "mongodb"))]
        if self.connection_string.is_some() {
            warn!("connection string ignored, docgate was built without the mongodb feature");
        }

        if self.environment == Environment::Production {
            return Err(DocumentStoreError::Initialization(
                "production requires a persistent store".to_string(),
            ));
        }

        let backend: Arc<dyn StoreBackend> = Arc::new(InMemoryStore::builder().build().await?);
        info!(environment = %self.environment, "using the in-memory store");
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn settings_parse_from_json_with_defaults() {
        let settings = RuntimeSettings::from_json(r#"{ "environment": "testing" }"#).unwrap();

        assert_eq!(settings.environment, Environment::Testing);
        assert_eq!(settings.connection_string, None);
        assert_eq!(settings.database, None);

        assert!(RuntimeSettings::from_json(r#"{ "environment": "staging" }"#).is_err());
    }

    #[test]
    fn settings_read_from_variables() {
        let settings = RuntimeSettings::from_lookup(lookup(&[
            (ENV_ENVIRONMENT, "PROD"),
            (ENV_CONNECTION_STRING, "mongodb://db:27017"),
            (ENV_DATABASE, " "),
        ]))
        .unwrap();

        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.connection_string.as_deref(), Some("mongodb://db:27017"));
        assert_eq!(settings.database, None);
    }

    #[test]
    fn unknown_environments_are_rejected() {
        let err = RuntimeSettings::from_lookup(lookup(&[(ENV_ENVIRONMENT, "qa")])).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Initialization(_)));
    }

    #[tokio::test]
    async fn development_without_a_connection_uses_memory() {
        let backend = RuntimeSettings::default().connect().await.unwrap();

        let found = backend.find_one("customers", bson::doc! {}, None).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn production_requires_a_persistent_store() {
        let settings = RuntimeSettings {
            environment: Environment::Production,
            ..Default::default()
        };

        assert!(settings.connect().await.is_err());
    }
}
