pub mod app_config;
pub mod assistant;
pub mod command;
pub mod operations;
pub mod payload;
pub mod resolver;
pub mod router;
pub mod storages;
pub mod summary;

pub use app_config::{AssistantAppConfig, AssistantAppExt, AssistantConfig};
pub use assistant::Assistant;
pub use router::webhook_router;
pub use storages::{DriveBackend, RemoteEntry};
