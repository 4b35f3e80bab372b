use edutest_backend::{
    config::init_config,
    database::{
        pool::{create_pool, run_migrations},
        PgStore,
    },
    routes::build_router,
    services::ai_service::GeminiGenerator,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("edutest_backend=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = init_config()?;

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;
    info!("Database migrations applied");

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.generation_timeout_secs))
        .build()?;
    let generator = GeminiGenerator::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        http_client,
    );

    let app_state = AppState::new(Arc::new(PgStore::new(pool)), Arc::new(generator), config);

    {
        let state = app_state.clone();
        let interval = Duration::from_secs(config.session_sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                match state
                    .session_service
                    .expire_overdue_sessions(chrono::Utc::now())
                    .await
                {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "auto-submitted overdue test sessions"),
                    Err(e) => tracing::error!(error = ?e, "session sweeper error"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = build_router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
