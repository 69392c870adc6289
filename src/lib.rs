pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod request;
pub mod store;
pub mod validation;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use context::{ServiceContext, Services};
pub use error::{ApiError, ApiResult};

// Export all model types
pub use model::*;

pub use request::{Request, RequestBuilder};

// Export store types
pub use store::{MemoryRevisionStore, RevisionStore};

/// Router over a fresh in-memory deployment, used by `run_server` and integration tests.
pub fn create_app(config: &crate::config::AppConfig) -> axum::Router {
    let services = Services::builder(config.repository.clone()).build();
    crate::api::routes::create_router().with_state(services)
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = crate::config::AppConfig::load()?;
    let app = create_app(&config);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;

    serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_app_bootstraps_repositories() {
        let config = AppConfig::default();
        let services = Services::builder(config.repository.clone()).build();

        assert!(services.repositories().contains(RESOURCES_REPOSITORY));
        for tooling_id in &config.repository.tooling_ids {
            assert!(services.repositories().contains(tooling_id));
        }
        assert!(!services.repositories().contains("unknown"));
    }
}
