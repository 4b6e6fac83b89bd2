// AlpineBits guest request bridge server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use alpinebits_bridge::config::{parse_hotel, ProtocolAuthConfig, ServiceConfig};
use alpinebits_bridge::ingestion::DEFAULT_LANGUAGE;
use alpinebits_bridge::model::Hotel;
use alpinebits_bridge::server::{serve, AppState};
use alpinebits_bridge::store::{GuestRequestStore, MemoryStore, SqliteStore};
use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "alpinebits-bridge")]
#[command(about = "Relay website guest requests to hotel PMS systems over AlpineBits")]
struct Args {
    #[arg(short, long, env = "BRIDGE_BIND", default_value = "127.0.0.1:8787")]
    bind: SocketAddr,

    /// SQLite database file. Requests are kept in memory when omitted.
    #[arg(short, long, env = "BRIDGE_DATABASE")]
    database: Option<PathBuf>,

    #[arg(long, env = "BRIDGE_DEFAULT_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    default_language: String,

    /// Hotel to register at startup, as CODE=Name. Repeatable.
    #[arg(long = "hotel", env = "BRIDGE_HOTELS", value_delimiter = ',', value_parser = parse_hotel)]
    hotels: Vec<Hotel>,

    #[arg(long, env = "ALPINEBITS_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "ALPINEBITS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, env = "ALPINEBITS_REQUIRE_CLIENT_ID")]
    require_client_id: bool,
}

impl Args {
    fn into_config(self) -> ServiceConfig {
        let auth = ProtocolAuthConfig {
            username: self.username,
            password: self.password,
            require_client_id: self.require_client_id,
        };
        let mut config = ServiceConfig::default()
            .with_bind_addr(self.bind)
            .with_default_language(self.default_language)
            .with_auth(auth);
        if let Some(path) = self.database {
            config = config.with_database_path(path);
        }
        self.hotels
            .into_iter()
            .fold(config, |config, hotel| config.with_hotel(hotel))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();

    let store: Arc<dyn GuestRequestStore> = match &config.database_path {
        Some(path) => {
            info!(path = ?path, "Opening database");
            Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("opening database {}", path.display()))?,
            )
        }
        None => {
            warn!("No database configured, guest requests are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    for hotel in &config.hotels {
        store
            .upsert_hotel(hotel)
            .await
            .with_context(|| format!("registering hotel {}", hotel.hotel_code))?;
        info!(hotel_code = %hotel.hotel_code, hotel_name = %hotel.hotel_name, "Hotel registered");
    }

    if config.auth.credentials().is_none() {
        warn!("AlpineBits credentials not configured, /alpinebits will answer 500");
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    serve(listener, AppState::new(store, &config), shutdown_signal()).await?;
    Ok(())
}
