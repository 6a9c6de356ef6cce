//! Relay configuration.
//!
//! Loaded from environment variables (or any string map with the same keys):
//!
//! | Key                     | Required | Default                  |
//! |-------------------------|----------|--------------------------|
//! | `LOGSCALE_URL`          | yes      |                          |
//! | `LOGSCALE_INGEST_TOKEN` | yes      |                          |
//! | `STORAGE_ACCOUNT_NAME`  | yes      |                          |
//! | `BLOB_CONTAINER_NAME`   | yes      |                          |
//! | `EVENTHUB_NAMESPACE`    | yes      |                          |
//! | `EVENTHUB_NAME`         | yes      |                          |
//! | `CONSUMER_GROUP`        | no       | `$Default`               |
//! | `REPLICA_NAME`          | no       | `{hostname}-{random}`    |
//! | `MAX_BATCH_SIZE`        | no       | `100`                    |
//! | `LOGSCALE_TYPE`         | no       | unset                    |
//! | `LOGSCALE_TAGS`         | no       | unset (`k1=v1,k2=v2`)    |
//!
//! `CONTAINER_APP_REPLICA_NAME` is accepted when `REPLICA_NAME` is unset.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use logship_coordination::ConsumerScope;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::logscale::LogScaleConfig;

pub const DEFAULT_CONSUMER_GROUP: &str = "$Default";

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

const SERVICE_BUS_SUFFIX: &str = ".servicebus.windows.net";

fn default_consumer_group() -> String {
    DEFAULT_CONSUMER_GROUP.to_string()
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_replica_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    match hostname::get() {
        Ok(host) => format!("{}-{}", host.to_string_lossy(), &suffix[..8]),
        Err(_) => format!("replica-{}", suffix),
    }
}

/// Everything one relay worker needs to start.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RelayConfig {
    pub logscale_url: String,

    pub logscale_ingest_token: String,

    pub storage_account_name: String,

    pub blob_container_name: String,

    /// Short namespace name, or an already fully-qualified host.
    pub eventhub_namespace: String,

    pub eventhub_name: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Worker identity used as the ownership record's owner id.
    #[serde(default = "default_replica_name")]
    pub replica_name: String,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Parser LogScale applies to the forwarded lines.
    #[serde(default)]
    pub logscale_type: Option<String>,

    /// Static tags attached to every pushed envelope.
    #[serde(default)]
    pub logscale_tags: BTreeMap<String, String>,
}

impl RelayConfig {
    /// Load from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_config_map(&vars)
    }

    pub fn from_config_map(config: &HashMap<String, String>) -> ConfigResult<Self> {
        let required = |key: &'static str| -> ConfigResult<String> {
            config
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| {
            config
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let max_batch_size = optional("MAX_BATCH_SIZE")
            .map(|s| {
                s.parse::<usize>().map_err(|e| ConfigError::Invalid {
                    key: "MAX_BATCH_SIZE",
                    reason: e.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE);

        let logscale_tags = optional("LOGSCALE_TAGS")
            .map(|s| parse_tags(&s))
            .transpose()?
            .unwrap_or_default();

        let config = RelayConfig {
            logscale_url: required("LOGSCALE_URL")?,
            logscale_ingest_token: required("LOGSCALE_INGEST_TOKEN")?,
            storage_account_name: required("STORAGE_ACCOUNT_NAME")?,
            blob_container_name: required("BLOB_CONTAINER_NAME")?,
            eventhub_namespace: required("EVENTHUB_NAMESPACE")?,
            eventhub_name: required("EVENTHUB_NAME")?,
            consumer_group: optional("CONSUMER_GROUP").unwrap_or_else(default_consumer_group),
            replica_name: optional("REPLICA_NAME")
                .or_else(|| optional("CONTAINER_APP_REPLICA_NAME"))
                .unwrap_or_else(default_replica_name),
            max_batch_size,
            logscale_type: optional("LOGSCALE_TYPE"),
            logscale_tags,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject empty required fields and a zero batch size.
    ///
    /// Needed for configs built through serde, which only checks presence.
    pub fn validate(&self) -> ConfigResult<()> {
        let fields: [(&'static str, &str); 8] = [
            ("LOGSCALE_URL", &self.logscale_url),
            ("LOGSCALE_INGEST_TOKEN", &self.logscale_ingest_token),
            ("STORAGE_ACCOUNT_NAME", &self.storage_account_name),
            ("BLOB_CONTAINER_NAME", &self.blob_container_name),
            ("EVENTHUB_NAMESPACE", &self.eventhub_namespace),
            ("EVENTHUB_NAME", &self.eventhub_name),
            ("CONSUMER_GROUP", &self.consumer_group),
            ("REPLICA_NAME", &self.replica_name),
        ];
        if let Some((key, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Missing(*key));
        }

        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_BATCH_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// `{EVENTHUB_NAMESPACE}.servicebus.windows.net`, unless the namespace is
    /// already a host name.
    pub fn fully_qualified_namespace(&self) -> String {
        let namespace = self.eventhub_namespace.trim();
        if namespace.contains('.') {
            namespace.to_string()
        } else {
            format!("{}{}", namespace, SERVICE_BUS_SUFFIX)
        }
    }

    pub fn consumer_scope(&self) -> ConsumerScope {
        ConsumerScope::new(
            self.fully_qualified_namespace(),
            self.eventhub_name.clone(),
            self.consumer_group.clone(),
        )
    }

    pub fn logscale_config(&self) -> LogScaleConfig {
        let mut config = LogScaleConfig::new(&self.logscale_url, &self.logscale_ingest_token);
        config.event_type = self.logscale_type.clone();
        if !self.logscale_tags.is_empty() {
            config.tags = Some(self.logscale_tags.clone());
        }
        config
    }

    /// Blob container holding ownership and checkpoint objects.
    ///
    /// Credentials come from the standard `AZURE_*` environment variables,
    /// falling back to managed identity.
    pub fn build_object_store(&self) -> ConfigResult<Arc<dyn ObjectStore>> {
        let store = MicrosoftAzureBuilder::from_env()
            .with_account(&self.storage_account_name)
            .with_container_name(&self.blob_container_name)
            .build()?;
        Ok(Arc::new(store))
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("logscale_url", &self.logscale_url)
            .field("logscale_ingest_token", &"<redacted>")
            .field("storage_account_name", &self.storage_account_name)
            .field("blob_container_name", &self.blob_container_name)
            .field("eventhub_namespace", &self.eventhub_namespace)
            .field("eventhub_name", &self.eventhub_name)
            .field("consumer_group", &self.consumer_group)
            .field("replica_name", &self.replica_name)
            .field("max_batch_size", &self.max_batch_size)
            .field("logscale_type", &self.logscale_type)
            .field("logscale_tags", &self.logscale_tags)
            .finish()
    }
}

/// Parse `k1=v1,k2=v2`. Blank entries are ignored.
fn parse_tags(raw: &str) -> ConfigResult<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, value) = entry.split_once('=').ok_or_else(|| ConfigError::Invalid {
                key: "LOGSCALE_TAGS",
                reason: format!("expected key=value, got '{}'", entry),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "LOGSCALE_TAGS",
                    reason: format!("empty tag name in '{}'", entry),
                });
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_map() -> HashMap<String, String> {
        [
            ("LOGSCALE_URL", "cloud.community.humio.com"),
            ("LOGSCALE_INGEST_TOKEN", "token-123"),
            ("STORAGE_ACCOUNT_NAME", "relaystate"),
            ("BLOB_CONTAINER_NAME", "checkpoints"),
            ("EVENTHUB_NAMESPACE", "contoso"),
            ("EVENTHUB_NAME", "telemetry"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    // ----------------------------------------------------------------
    // from_config_map
    // ----------------------------------------------------------------

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_config_map(&base_map()).unwrap();
        assert_eq!(config.consumer_group, "$Default");
        assert_eq!(config.max_batch_size, 100);
        assert!(!config.replica_name.is_empty());
    }

    #[test]
    fn test_explicit_values() {
        let mut map = base_map();
        map.insert("CONSUMER_GROUP".to_string(), "relay".to_string());
        map.insert("REPLICA_NAME".to_string(), "relay-0".to_string());
        map.insert("MAX_BATCH_SIZE".to_string(), "250".to_string());

        let config = RelayConfig::from_config_map(&map).unwrap();
        assert_eq!(config.consumer_group, "relay");
        assert_eq!(config.replica_name, "relay-0");
        assert_eq!(config.max_batch_size, 250);
    }

    #[test]
    fn test_container_app_replica_fallback() {
        let mut map = base_map();
        map.insert(
            "CONTAINER_APP_REPLICA_NAME".to_string(),
            "relay--abc123".to_string(),
        );
        let config = RelayConfig::from_config_map(&map).unwrap();
        assert_eq!(config.replica_name, "relay--abc123");
    }

    #[test]
    fn test_missing_required() {
        let mut map = base_map();
        map.remove("LOGSCALE_INGEST_TOKEN");
        let err = RelayConfig::from_config_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LOGSCALE_INGEST_TOKEN")));
    }

    #[test]
    fn test_blank_required_is_missing() {
        let mut map = base_map();
        map.insert("EVENTHUB_NAME".to_string(), "   ".to_string());
        let err = RelayConfig::from_config_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("EVENTHUB_NAME")));
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut map = base_map();
        map.insert("MAX_BATCH_SIZE".to_string(), "lots".to_string());
        assert!(matches!(
            RelayConfig::from_config_map(&map).unwrap_err(),
            ConfigError::Invalid {
                key: "MAX_BATCH_SIZE",
                ..
            }
        ));

        map.insert("MAX_BATCH_SIZE".to_string(), "0".to_string());
        assert!(RelayConfig::from_config_map(&map).is_err());
    }

    // ----------------------------------------------------------------
    // Derived values
    // ----------------------------------------------------------------

    #[test]
    fn test_fully_qualified_namespace() {
        let mut config = RelayConfig::from_config_map(&base_map()).unwrap();
        assert_eq!(
            config.fully_qualified_namespace(),
            "contoso.servicebus.windows.net"
        );

        config.eventhub_namespace = "contoso.servicebus.chinacloudapi.cn".to_string();
        assert_eq!(
            config.fully_qualified_namespace(),
            "contoso.servicebus.chinacloudapi.cn"
        );
    }

    #[test]
    fn test_consumer_scope() {
        let config = RelayConfig::from_config_map(&base_map()).unwrap();
        let scope = config.consumer_scope();
        assert_eq!(
            scope.ownership_prefix(),
            "contoso.servicebus.windows.net/telemetry/$default/ownership"
        );
    }

    #[test]
    fn test_logscale_config() {
        let config = RelayConfig::from_config_map(&base_map()).unwrap();
        assert_eq!(
            config.logscale_config().ingest_url(),
            "https://cloud.community.humio.com/api/v1/ingest/humio-unstructured"
        );
    }

    #[test]
    fn test_logscale_type_and_tags() {
        let mut map = base_map();
        map.insert("LOGSCALE_TYPE".to_string(), "accesslog".to_string());
        map.insert(
            "LOGSCALE_TAGS".to_string(),
            "env=prod, region = westeurope,".to_string(),
        );

        let config = RelayConfig::from_config_map(&map).unwrap();
        let logscale = config.logscale_config();
        assert_eq!(logscale.event_type.as_deref(), Some("accesslog"));

        let tags = logscale.tags.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["env"], "prod");
        assert_eq!(tags["region"], "westeurope");
    }

    #[test]
    fn test_logscale_type_and_tags_default_unset() {
        let logscale = RelayConfig::from_config_map(&base_map())
            .unwrap()
            .logscale_config();
        assert!(logscale.event_type.is_none());
        assert!(logscale.tags.is_none());
    }

    #[test]
    fn test_invalid_tags() {
        for raw in ["env", "=prod"] {
            let mut map = base_map();
            map.insert("LOGSCALE_TAGS".to_string(), raw.to_string());
            assert!(matches!(
                RelayConfig::from_config_map(&map).unwrap_err(),
                ConfigError::Invalid {
                    key: "LOGSCALE_TAGS",
                    ..
                }
            ));
        }
    }

    // ----------------------------------------------------------------
    // Serde
    // ----------------------------------------------------------------

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "LOGSCALE_URL": "logscale.example.com",
            "LOGSCALE_INGEST_TOKEN": "t",
            "STORAGE_ACCOUNT_NAME": "acct",
            "BLOB_CONTAINER_NAME": "state",
            "EVENTHUB_NAMESPACE": "ns",
            "EVENTHUB_NAME": "hub"
        }"#;
        let config: RelayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.consumer_group, "$Default");
        assert_eq!(config.max_batch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = RelayConfig::from_config_map(&base_map()).unwrap();
        assert!(!format!("{:?}", config).contains("token-123"));
    }
}
