//! The live bridge's client side (§6): a WebSocket connection to
//! `/bridge/:session_id`, framing every header/payload pair as a
//! [`common::BridgeFrameWire`] JSON text frame. The relay pairs two such
//! connections sharing a session id, sends `"OK"` to each once paired, then
//! forwards every subsequent frame verbatim.

use common::BridgeFrameWire;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::errors::ClientError;

pub struct LiveSession {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl LiveSession {
    /// Connects to `relay_ws_base_url()/bridge/:session_id` and blocks until the
    /// relay's pairing acknowledgement (`"OK"`) arrives.
    pub async fn connect(relay_ws_base_url: &str, session_id: Uuid) -> Result<Self, ClientError> {
        let url = format!("{relay_ws_base_url}/bridge/{session_id}");
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        let mut session = LiveSession { socket };
        session.await_pairing().await?;
        Ok(session)
    }

    async fn await_pairing(&mut self) -> Result<(), ClientError> {
        match self.socket.next().await {
            Some(Ok(Message::Text(text))) if text.as_str() == "OK" => Ok(()),
            Some(Ok(_)) => Err(ClientError::BridgeClosed),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::BridgeClosed),
        }
    }

    /// Sends one header/payload frame, base64-encoded, to whoever the relay has
    /// paired this session with.
    pub async fn send_frame(&mut self, header: &[u8], payload: &[u8]) -> Result<(), ClientError> {
        let frame = BridgeFrameWire::encode(header, payload);
        let text = serde_json::to_string(&frame).expect("BridgeFrameWire always serializes");
        self.socket.send(Message::Text(Utf8Bytes::from(text))).await?;
        Ok(())
    }

    /// Waits for the next header/payload frame, skipping any non-text frame the
    /// transport might deliver (pings, close handshakes).
    pub async fn recv_frame(&mut self) -> Result<(Vec<u8>, Vec<u8>), ClientError> {
        while let Some(message) = self.socket.next().await {
            let message = message?;
            let Message::Text(text) = message else { continue };
            let frame: BridgeFrameWire = serde_json::from_str(text.as_str())?;
            return Ok(frame.decode()?);
        }
        Err(ClientError::BridgeClosed)
    }
}
