use companion_server::{configuration::Settings, routes, state::AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let settings = Settings::new()?;

    // Create app state, filling the retrieval store on first start
    let state = AppState::from_settings(&settings).await?;
    info!(
        data_source = %state.data_source,
        store = %settings.retrieval.path.display(),
        "agent ready"
    );

    // Create router with CORS support
    let app = routes::configure(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
