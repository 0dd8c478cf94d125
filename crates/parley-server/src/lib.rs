//! HTTP server assembly for parley
//!
//! Wires the chat routes, the health check and the request-context
//! middleware into one axum router

mod health;
mod request_context;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use parley_chat::{ChatSettings, ChatState, Stores, chat_router};
use parley_config::Config;
use tower_http::trace::TraceLayer;

pub use request_context::ContextHeaders;

/// Listen address used when none is configured
pub const DEFAULT_LISTEN_ADDRESS: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8000);

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration, reading stores from the data root
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built or a
    /// configured header name is invalid
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let stores = Stores::file(&config.store);
        Self::with_stores(config, stores)
    }

    /// Build the server with caller-supplied stores
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built or a
    /// configured header name is invalid
    pub fn with_stores(config: Config, stores: Stores) -> anyhow::Result<Self> {
        let listen_address = config.server.listen_address.unwrap_or(DEFAULT_LISTEN_ADDRESS);

        let headers = Arc::new(ContextHeaders::new(
            config.server.user_header(),
            config.server.hint_header(),
        )?);

        let settings = ChatSettings {
            chat: config.chat,
            upstream: config.upstream,
            providers: config.providers,
            guest_user: config.store.guest_user,
        };
        let chat_state = ChatState::new(settings, stores)?;

        let mut app = Router::new();

        // Health check
        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        // Chat routes
        app = app.merge(chat_router(chat_state));

        // Request context (innermost, runs just before handlers)
        app = app.layer(axum::middleware::from_fn(move |req, next| {
            let headers = Arc::clone(&headers);
            async move { request_context::request_context_middleware(headers, req, next).await }
        }));

        // Tracing
        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
