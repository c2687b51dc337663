//! Gateway API server entrypoint.

use std::sync::Arc;

use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use ledger_gateway::api::{create_router, start_server, AppState};
use ledger_gateway::tools::create_default_registry;
use ledger_gateway::{BackendSettings, ErpClient, Result, ServerSettings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let backend = BackendSettings::from_env();
    if let Err(message) = backend.validate() {
        eprintln!("{message}");
        std::process::exit(1);
    }
    let server = ServerSettings::from_env();

    let client = Arc::new(ErpClient::new(backend));
    let registry = Arc::new(create_default_registry(client, server.request_timeout));

    let router = create_router(AppState { registry });
    start_server(router, &server).await
}
