use actix_web::dev::ServiceRequest;
use actix_web::{dev::ServiceFactory, web, App, Error};
use anyhow::Context;
use log::{error, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assistant::Assistant;
use crate::router::{health, webhook_router};
use crate::storages::{google::GoogleDrive, local::LocalStorage, DriveBackend};
use crate::summary::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Google {
        #[serde(default = "default_credentials_path")]
        credentials_path: PathBuf,
        #[serde(default = "default_token_path")]
        token_path: PathBuf,
    },
    Local {
        root: PathBuf,
    },
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("./credentials.json")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("./token.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Google {
            credentials_path: default_credentials_path(),
            token_path: default_token_path(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub model: String,
    pub max_tokens: u32,
    pub api_key: Option<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub storage: StorageConfig,
    pub summary: SummaryConfig,
    pub webhook_path: String,
    pub temp_dir: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            summary: SummaryConfig::default(),
            webhook_path: "/webhook".to_string(),
            temp_dir: None,
        }
    }
}

impl AssistantConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AssistantConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub async fn connect_storage(&self) -> Option<Arc<dyn DriveBackend>> {
        match &self.storage {
            StorageConfig::Google {
                credentials_path,
                token_path,
            } => match GoogleDrive::connect(credentials_path, token_path).await {
                Ok(drive) => {
                    info!("✅ Google Drive authenticated!");
                    Some(Arc::new(drive) as Arc<dyn DriveBackend>)
                }
                Err(e) => {
                    error!("Error loading Google Drive credentials: {}", e);
                    None
                }
            },
            StorageConfig::Local { root } => {
                if let Err(e) = tokio::fs::create_dir_all(root).await {
                    error!("Cannot create storage directory {}: {}", root.display(), e);
                    return None;
                }
                info!("Serving local directory {}", root.display());
                Some(Arc::new(LocalStorage::new(&root.to_string_lossy())) as Arc<dyn DriveBackend>)
            }
        }
    }
}

#[derive(Clone)]
pub struct AssistantAppConfig {
    pub webhook_path: String,
    pub json_limit: usize,
    pub payload_limit: usize,
    pub assistant: Arc<Assistant>,
}

impl AssistantAppConfig {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            webhook_path: "/webhook".to_string(),
            json_limit: 25 * 1024 * 1024,    // 25MB, base64 attachments
            payload_limit: 25 * 1024 * 1024, // 25MB
            assistant,
        }
    }

    pub fn with_webhook_path(mut self, path: &str) -> Self {
        self.webhook_path = path.to_string();
        self
    }
}

pub trait AssistantAppExt {
    fn configure_assistant(self, config: AssistantAppConfig) -> Self;
}

impl<T> AssistantAppExt for App<T>
where
    T: ServiceFactory<ServiceRequest, Config = (), Error = Error, InitError = ()>,
{
    fn configure_assistant(self, config: AssistantAppConfig) -> Self {
        let assistant = web::Data::from(config.assistant);

        self.app_data(web::JsonConfig::default().limit(config.json_limit))
            .app_data(web::PayloadConfig::default().limit(config.payload_limit))
            .app_data(assistant)
            .service(web::resource(config.webhook_path).route(web::post().to(webhook_router)))
            .service(web::resource("/health").route(web::get().to(health)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config: AssistantConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.webhook_path, "/webhook");
        assert_eq!(config.summary.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(matches!(config.storage, StorageConfig::Google { .. }));
    }

    #[test]
    fn test_local_storage_config() {
        let config: AssistantConfig = serde_json::from_str(
            r#"{"storage":{"backend":"local","root":"./data"},"summary":{"max_tokens":200}}"#,
        )
        .unwrap();
        match config.storage {
            StorageConfig::Local { root } => assert_eq!(root, PathBuf::from("./data")),
            other => panic!("unexpected storage {:?}", other),
        }
        assert_eq!(config.summary.max_tokens, 200);
        assert_eq!(config.summary.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = AssistantConfig::from_file(&dir.path().join("config.json")).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }

    #[tokio::test]
    async fn test_connect_local_storage() {
        let dir = TempDir::new().unwrap();
        let config = AssistantConfig {
            storage: StorageConfig::Local {
                root: dir.path().join("drive"),
            },
            ..Default::default()
        };

        let backend = config.connect_storage().await.unwrap();
        assert_eq!(backend.name(), "local");
        assert!(dir.path().join("drive").is_dir());
    }

    #[tokio::test]
    async fn test_google_without_credentials_stays_disconnected() {
        let dir = TempDir::new().unwrap();
        let config = AssistantConfig {
            storage: StorageConfig::Google {
                credentials_path: dir.path().join("credentials.json"),
                token_path: dir.path().join("token.json"),
            },
            ..Default::default()
        };

        assert!(config.connect_storage().await.is_none());
    }
}
