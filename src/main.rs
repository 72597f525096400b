//src/main.rs

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use rental_backend::{
    config::{AppConfig, AppState},
    routes,
    services::scheduler_service::spawn_daily_loop,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let config = AppConfig::load().context("Configuração inválida")?;
    let addr = format!("{}:{}", config.host, config.port);
    let scheduler_config = config.scheduler.clone();

    let app_state = AppState::new(config)
        .await
        .context("Falha ao inicializar o estado da aplicação")?;

    // Worker da fila de efeitos colaterais
    app_state.worker().spawn();

    if scheduler_config.enabled {
        spawn_daily_loop(app_state.scheduler.clone(), scheduler_config.run_hour_utc);
    } else {
        tracing::info!("Agendador diário desativado");
    }

    let app = routes::app(app_state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Falha ao iniciar o listener TCP em {}", addr))?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("Erro no servidor Axum")?;
    Ok(())
}
