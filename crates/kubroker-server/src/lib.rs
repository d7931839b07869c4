pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ClusterBackend, StorageBackend};
pub use observability::init_tracing;
pub use server::{AppState, KubrokerServer, ServerBuilder, build_app, router};
