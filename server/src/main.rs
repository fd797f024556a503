use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ballticket_server::config::Config;
use ballticket_server::mail::{GraphMailer, LogMailer, Mailer};
use ballticket_server::payment::StripeClient;
use ballticket_server::routes::create_routes;
use ballticket_server::services::auth::ensure_bootstrap_admin;
use ballticket_server::state::AppState;
use ballticket_server::store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;
    info!("Migrations run successfully");

    let mailer: Arc<dyn Mailer> = match config.mail.clone() {
        Some(mail) => Arc::new(GraphMailer::new(mail)),
        None => {
            warn!("Graph mail credentials missing, mails are only logged");
            Arc::new(LogMailer)
        }
    };
    let payments = Arc::new(StripeClient::new(&config.payment));
    let addr = config.bind_addr;

    let state = AppState::new(config, Arc::new(PgStore::new(pool)), payments, mailer);
    ensure_bootstrap_admin(&state).await?;

    let app = create_routes(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
