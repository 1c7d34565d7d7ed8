//! Non-interactive smoke test exercising the full pipeline end to end: an
//! in-process relay, a published bundle, an X3DH handshake, and one round trip
//! over the relay's live bridge in each direction. Stands in for the
//! command-line entry point §1 treats as an external collaborator -- this
//! binary only demonstrates the `client`/`protocol` contract, it is not part
//! of the spec's core.

use std::time::Duration;

use client::Client;
use config::ClientConfig;
use relay::routes;
use relay::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new("info").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state = AppState::new(Duration::from_secs(60), Duration::from_secs(60));
    let (addr, server) = warp::serve(routes::routes(state)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    tracing::info!(%addr, "in-process relay listening");

    let relay_url = format!("http://{addr}");
    let mut alice = Client::new(&ClientConfig {
        relay_url: relay_url.clone(),
        ..ClientConfig::default()
    });
    let mut bob = Client::new(&ClientConfig {
        relay_url,
        ..ClientConfig::default()
    });

    bob.publish_bundle().await.expect("bob publishes a prekey bundle");

    let info = b"double-ratchet-demo";
    let session_id = alice
        .send_initial_message(bob.identity_public(), info, b"hello bob")
        .await
        .expect("alice completes the X3DH handshake");

    let first_plaintext = bob
        .receive_initial_message(session_id, info)
        .await
        .expect("bob accepts alice's initial message");
    assert_eq!(first_plaintext, b"hello bob");
    tracing::info!(%session_id, plaintext = %String::from_utf8_lossy(&first_plaintext), "handshake complete");

    let alice_task = async move {
        let mut live = alice.open_live_session(session_id).await.expect("alice joins the live bridge");
        let (header, payload) = alice.encrypt(session_id, b"ping over the bridge").expect("alice encrypts ping");
        live.send_frame(&header, &payload).await.expect("alice sends ping");

        let (header, payload) = live.recv_frame().await.expect("alice receives pong frame");
        alice.decrypt(session_id, &header, &payload).expect("alice decrypts pong")
    };

    let bob_task = async move {
        let mut live = bob.open_live_session(session_id).await.expect("bob joins the live bridge");

        let (header, payload) = live.recv_frame().await.expect("bob receives ping frame");
        let ping = bob.decrypt(session_id, &header, &payload).expect("bob decrypts ping");

        let (header, payload) = bob.encrypt(session_id, b"pong over the bridge").expect("bob encrypts pong");
        live.send_frame(&header, &payload).await.expect("bob sends pong");
        ping
    };

    let (pong, ping) = tokio::join!(alice_task, bob_task);
    assert_eq!(ping, b"ping over the bridge");
    assert_eq!(pong, b"pong over the bridge");

    tracing::info!(
        ping = %String::from_utf8_lossy(&ping),
        pong = %String::from_utf8_lossy(&pong),
        "live bridge round trip succeeded in both directions"
    );
}
