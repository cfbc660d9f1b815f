//! Wires routes, middleware, and [`AppState`] into a runnable server.

use std::net::SocketAddr;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::{middleware as mw, routes, state::AppState};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};

/// Default cap on request body size (10 MiB).
const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub registry: RegistryConfig,
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            registry: RegistryConfig::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ApiConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn with_registry_config(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
    router: Router,
}

impl ApiServer {
    pub async fn new(config: ApiConfig) -> Result<Self> {
        let state = AppState::new(config.registry.clone()).await?;
        let router = Self::build_router(&state, config.max_body_size);

        Ok(Self {
            config,
            state,
            router,
        })
    }

    pub fn with_state(state: AppState, config: ApiConfig) -> Self {
        let router = Self::build_router(&state, config.max_body_size);
        Self {
            config,
            state,
            router,
        }
    }

    pub async fn with_defaults() -> Result<Self> {
        Self::new(ApiConfig::default()).await
    }

    fn build_router(state: &AppState, max_body_size: usize) -> Router {
        let api = routes::api_router(state.clone());

        api.layer(middleware::from_fn(mw::request_id_middleware))
            .layer(RequestBodyLimitLayer::new(max_body_size))
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| RegistryError::storage(format!("failed to bind: {}", e)))?;

        tracing::info!(addr = %self.config.bind_addr, "hyperreg API starting");

        axum::serve(listener, self.router)
            .await
            .map_err(|e| RegistryError::storage(format!("server error: {}", e)))?;

        Ok(())
    }

    pub async fn run_until<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| RegistryError::storage(format!("failed to bind: {}", e)))?;

        tracing::info!(addr = %self.config.bind_addr, "hyperreg API starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| RegistryError::storage(format!("server error: {}", e)))?;

        tracing::info!("hyperreg API shut down");
        Ok(())
    }
}

/// Run a server with default configuration.
pub async fn run_server() -> Result<()> {
    let server = ApiServer::with_defaults().await?;
    server.run().await
}

/// Run a server bound to a specific port.
pub async fn run_server_on_port(port: u16) -> Result<()> {
    let config = ApiConfig::default().with_port(port);
    let server = ApiServer::new(config).await?;
    server.run().await
}
