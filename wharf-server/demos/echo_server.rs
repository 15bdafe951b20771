//! Echo Server Example
//!
//! This example runs a Wharf server that echoes every message straight
//! back to the client that sent it. Connect with any WebSocket client:
//!
//! ```text
//! websocat ws://127.0.0.1:9000
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use wharf_server::prelude::*;

struct Echo {
    server: Server,
}

#[async_trait]
impl EventHandler for Echo {
    async fn on_client_connected(&self, client: ClientInfo, request: &UpgradeRequest) {
        println!("📡 {} connected from {} ({})", client.id, client.remote_addr, request.path);
    }

    async fn on_message_received(&self, message: IncomingMessage) {
        match message.kind {
            MessageKind::Text => {
                println!("📨 {}: {}", message.client_id, message.as_text());
            }
            MessageKind::Binary => {
                println!("📨 {}: {} bytes", message.client_id, message.len());
            }
        }
        self.server
            .send(message.client_id, message.payload, message.kind)
            .await;
    }

    async fn on_client_disconnected(&self, client_id: ClientId) {
        println!("🔌 {} disconnected", client_id);
    }

    async fn on_server_stopped(&self) {
        println!("🛑 Server stopped");
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    wharf_server::logging::init_logging()?;

    // Create the server
    let server = Server::builder()
        .listen_address([127, 0, 0, 1].into())
        .port(9000)
        .max_connections(1000)
        .build()?;

    server.add_event_handler(Arc::new(Echo { server: server.clone() })).await;

    // Start accepting connections
    server.start().await?;
    println!("🚀 Echo server listening on ws://127.0.0.1:9000");

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");
    server.shutdown().await;

    Ok(())
}
