use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use webplayer::config::{Cli, Config};
use webplayer::handler::AppState;
use webplayer::routes::router;
use webplayer::storage::Storage;

#[tokio::main]
async fn main() {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("webplayer.svc starting");

    let cfg = Config::from_cli(&args).unwrap_or_else(|e| {
        tracing::error!(error = %format!("{e:#}"), "failed to load config");
        std::process::exit(1);
    });

    let storage = Storage::new(cfg.app.get_data());
    let state = AppState::new(storage);

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, address = %address, "failed to setup tcp listener");
        std::process::exit(1);
    });

    let cancellation_token = CancellationToken::new();
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("ctrl+c signal received, preparing to shutdown");
        shutdown_token.cancel();
    });

    tracing::info!(
        url = %format!("http://{address}"),
        data = %cfg.app.get_data().display(),
        "webplayer.svc running"
    );

    if let Err(err) = axum::serve(listener, router(state))
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await
    {
        tracing::error!(error = %err, "server exited with error");
        std::process::exit(1);
    }

    tracing::info!("webplayer.svc going off, graceful shutdown complete");
}
