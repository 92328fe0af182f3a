//! WebSocket transport: owns the connection lifecycle and forwards
//! messages, in arrival order, to the session loop.
//!
//! There is no reconnect here. A failed or dropped connection ends the
//! session; only an explicit new start dials again.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

#[derive(Debug)]
pub enum NetEvent {
    Connected,
    Text(String),
    Binary(Bytes),
    /// Clean close from the server or end of stream.
    Closed,
    /// Connect failure or transport error.
    Failed(String),
}

#[derive(Debug)]
pub enum NetCommand {
    Close,
}

pub struct NetLink {
    address: String,
    tx: mpsc::Sender<NetEvent>,
    rx_cmd: mpsc::Receiver<NetCommand>,
}

impl NetLink {
    pub fn new(
        address: String,
        tx: mpsc::Sender<NetEvent>,
        rx_cmd: mpsc::Receiver<NetCommand>,
    ) -> Self {
        Self {
            address,
            tx,
            rx_cmd,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.connect_and_loop().await {
            let _ = self.tx.send(NetEvent::Failed(e.to_string())).await;
        }
    }

    async fn connect_and_loop(&mut self) -> anyhow::Result<()> {
        Url::parse(&self.address)
            .map_err(|e| anyhow::anyhow!("invalid address '{}': {}", self.address, e))?;

        log::info!("connecting to {}...", self.address);
        let (ws_stream, _) = connect_async(self.address.as_str()).await?;
        log::info!("connected to {}", self.address);

        let (mut write, mut read) = ws_stream.split();

        self.tx.send(NetEvent::Connected).await?;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.tx.send(NetEvent::Text(text.to_string())).await?;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.tx.send(NetEvent::Binary(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("server closed connection: {:?}", frame);
                            let _ = self.tx.send(NetEvent::Closed).await;
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            let _ = self.tx.send(NetEvent::Closed).await;
                            return Ok(());
                        }
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    // Caller-initiated close, or the session dropped its
                    // command handle. Stop reading first so no further
                    // events can re-enter teardown, then close politely.
                    match cmd {
                        Some(NetCommand::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            log::info!("link closed by engine");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
