//! Relay binary (§4.7 of the expanded spec): an in-memory reference
//! implementation of the bundle store, message queue, and live bridge that every
//! deployment of §6's relay contract needs, wired up over `warp`.

use std::time::Duration;

use config::RelayConfig;
use relay::routes;
use relay::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cfg = RelayConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state = AppState::new(cfg.message_ttl(), cfg.bridge_ttl());
    spawn_message_sweeper(state.clone(), cfg.message_ttl());

    let addr = cfg.socket_addr();
    tracing::info!(%addr, "relay listening");
    warp::serve(routes::routes(state)).run(addr).await;
}

fn spawn_message_sweeper(state: AppState, ttl: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ttl);
        loop {
            interval.tick().await;
            state.messages.lock().await.sweep_expired(ttl);
        }
    });
}
