//! Test server wrapper that starts parley on a random port

use std::net::SocketAddr;

use parley_chat::Stores;
use parley_chat::store::MemoryStore;
use parley_config::Config;
use parley_server::Server;
use tokio_util::sync::CancellationToken;

/// Header the default config reads the user id from
pub const USER_HEADER: &str = "x-parley-user";

/// Header the default config reads the latest-user hint from
pub const HINT_HEADER: &str = "x-parley-latest-user";

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a test server with empty in-memory stores
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        Self::start_with_store(config, MemoryStore::new()).await
    }

    /// Start a test server backed by the given in-memory store
    pub async fn start_with_store(config: Config, store: MemoryStore) -> anyhow::Result<Self> {
        Self::serve(Server::with_stores(config, Stores::memory(store))?).await
    }

    /// Start a test server reading the configured data root
    pub async fn start_with_files(config: Config) -> anyhow::Result<Self> {
        Self::serve(Server::new(config)?).await
    }

    /// Binds to port 0 for automatic port assignment
    async fn serve(server: Server) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::new();

        Ok(Self { addr, shutdown, client })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Post a chat payload to the generate route
    pub fn generate(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client.post(self.url(parley_chat::GENERATE_PATH)).json(body)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
