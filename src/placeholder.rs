use axum::{extract::State, response::Json, Router};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::BootstrapConfig;

/// Static responder that stands in for the node's RPC port while the node
/// cannot run, so container health checks keep passing during manual fixes
#[derive(Clone)]
pub struct PlaceholderServer {
    host: String,
    port: u16,
    status: Arc<PlaceholderStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceholderStatus {
    pub chain_id: String,
    pub moniker: String,
    pub reason: String,
}

impl PlaceholderStatus {
    pub fn from_config(config: &BootstrapConfig, reason: impl Into<String>) -> Self {
        Self {
            chain_id: config.chain_id.clone(),
            moniker: config.moniker.clone(),
            reason: reason.into(),
        }
    }
}

impl PlaceholderServer {
    pub fn new(host: String, port: u16, status: PlaceholderStatus) -> Self {
        Self {
            host,
            port,
            status: Arc::new(status),
        }
    }

    pub async fn start(&self) -> Result<(), std::io::Error> {
        let bind_addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&bind_addr).await?;

        info!("🩺 Placeholder responder listening on {}", bind_addr);

        self.serve(listener).await
    }

    /// Serve on an already bound listener until the process ends
    pub async fn serve(&self, listener: TcpListener) -> Result<(), std::io::Error> {
        axum::serve(listener, self.create_routes()).await
    }

    // every method and path gets the same answer
    fn create_routes(&self) -> Router {
        Router::new()
            .fallback(status_handler)
            .with_state(self.status.clone())
    }
}

async fn status_handler(State(status): State<Arc<PlaceholderStatus>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": -1,
        "result": {
            "node_info": {
                "network": status.chain_id,
                "moniker": status.moniker,
                "version": "placeholder"
            },
            "sync_info": {
                "latest_block_height": "0",
                "catching_up": true
            },
            "validator_info": {}
        },
        "status": "degraded",
        "reason": status.reason,
        "timestamp": chrono::Utc::now().timestamp()
    }))
}
