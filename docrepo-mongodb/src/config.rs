//! Deserializable connection settings.

use std::time::Duration;

use serde::Deserialize;

use crate::driver::MongoDriverBuilder;

/// Connection settings for a [`MongoDriver`](crate::MongoDriver), as found in an application's
/// configuration files.
///
/// ```ignore
/// let config: MongoDriverConfig = serde_json::from_value(json!({
///     "uri": "mongodb://localhost:27017",
///     "database": "app",
///     "connect_timeout_ms": 5000
/// }))?;
/// let driver = config.into_builder().build().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MongoDriverConfig {
    pub uri: String,
    pub database: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub max_pool_size: Option<u32>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

impl MongoDriverConfig {
    pub fn into_builder(self) -> MongoDriverBuilder {
        let mut builder = MongoDriverBuilder::new(&self.uri, &self.database);

        if let Some(app_name) = self.app_name {
            builder = builder.app_name(app_name);
        }
        if let Some(max_pool_size) = self.max_pool_size {
            builder = builder.max_pool_size(max_pool_size);
        }
        if let Some(timeout) = self.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(timeout));
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_settings_default_to_none() {
        let config: MongoDriverConfig = serde_json::from_value(json!({
            "uri": "mongodb://localhost:27017",
            "database": "app"
        }))
        .unwrap();

        assert_eq!(config.database, "app");
        assert_eq!(config.app_name, None);
        assert_eq!(config.max_pool_size, None);
        assert_eq!(config.connect_timeout_ms, None);
    }

    #[test]
    fn missing_database_is_rejected() {
        let result = serde_json::from_value::<MongoDriverConfig>(json!({
            "uri": "mongodb://localhost:27017"
        }));

        assert!(result.is_err());
    }

    #[test]
    fn into_builder_carries_every_setting() {
        let config: MongoDriverConfig = serde_json::from_value(json!({
            "uri": "mongodb://db:27017",
            "database": "billing",
            "app_name": "invoices",
            "max_pool_size": 8,
            "connect_timeout_ms": 1500
        }))
        .unwrap();

        let rendered = format!("{:?}", config.into_builder());
        assert!(rendered.contains("mongodb://db:27017"));
        assert!(rendered.contains("billing"));
        assert!(rendered.contains("invoices"));
        assert!(rendered.contains("Some(8)"));
        assert!(rendered.contains("1.5s"));
    }
}
