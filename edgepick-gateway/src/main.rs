/**
 * EDGEPICK GATEWAY - Point d'entrée du serveur HTTP Edgepick
 *
 * RÔLE : Charge la config, ouvre le store de mesures et l'inventaire, câble les
 * composants du cœur puis sert l'API REST.
 *
 * ARCHITECTURE : Dépendances injectées dans AppState, aucune logique métier ici.
 * UTILITÉ : Point d'accès unique des collecteurs et des nœuds demandeurs.
 */

mod error;
mod health;
mod http;
mod state;

use crate::state::AppState;
use anyhow::Context;
use edgepick_core::load_config;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    let app_state = AppState::from_config(&cfg).await?;
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.gateway.listen)
        .await
        .with_context(|| format!("binding {}", cfg.gateway.listen))?;
    info!(addr = %cfg.gateway.listen, key_mode = ?cfg.archive.key_mode, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
        })
        .await
        .context("http server stopped")?;
    Ok(())
}
