use clap::Parser;
use dotenvy::dotenv;
use file_encryptor_web::config::AppConfig;
use file_encryptor_web::services::storage::StorageArea;
use file_encryptor_web::services::transformer::{ExternalTool, Transformer};
use file_encryptor_web::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_encryptor_web=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting file encryptor web front end...");

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }

    // The storage area must exist and be writable before any request arrives
    let storage = Arc::new(StorageArea::open(&config.storage_dir, config.max_file_size).await?);
    info!(
        "📁 Storage area: {} (Max Size={}MB)",
        storage.root().display(),
        config.max_file_size / 1024 / 1024
    );

    let tool = ExternalTool::from_config(&config);
    info!(
        "🔐 Transform tool: {} (timeout {:?})",
        tool.describe(),
        tool.timeout()
    );

    let state = AppState {
        storage,
        transformer: Arc::new(tool),
        config: config.clone(),
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://localhost:{}/swagger-ui", config.port);
    info!("🗂️  Static assets from {}", config.public_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
