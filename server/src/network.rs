//! Server network layer: WebSocket connections feeding the hub's event loop

use crate::broadcast::{Broadcaster, Delivery, Outbound};
use crate::config::ServerConfig;
use crate::error::Rejection;
use crate::hub::Hub;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::SessionId;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        session_id: SessionId,
        addr: SocketAddr,
        outbound: Outbound,
    },
    FrameReceived {
        session_id: SessionId,
        frame: String,
    },
    Disconnected {
        session_id: SessionId,
    },
    Shutdown,
}

/// Main server coordinating connections and the session hub
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    max_connections: usize,
    hub: Hub,
    broadcaster: Broadcaster,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(config: &ServerConfig, seed: f64) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            max_connections: config.max_connections,
            hub: Hub::new(seed),
            broadcaster: Broadcaster::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that can stop [`Server::run`] from outside.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that accepts connections and assigns session ids
    fn spawn_acceptor(&self, listener: TcpListener) {
        let server_tx = self.server_tx.clone();
        let max_connections = self.max_connections;
        let live = Arc::new(AtomicUsize::new(0));

        tokio::spawn(async move {
            let mut next_session_id = 1u64;

            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        continue;
                    }
                };

                if server_tx.is_closed() {
                    break;
                }

                if live.load(Ordering::SeqCst) >= max_connections {
                    warn!("Refusing connection from {}: server full", addr);
                    tokio::spawn(refuse_connection(stream, addr));
                    continue;
                }

                let session_id = SessionId(next_session_id);
                next_session_id += 1;
                live.fetch_add(1, Ordering::SeqCst);

                let server_tx = server_tx.clone();
                let live = Arc::clone(&live);
                tokio::spawn(async move {
                    serve_connection(stream, addr, session_id, server_tx).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
    }

    fn dispatch(&self, deliveries: &[Delivery]) {
        self.broadcaster.dispatch_all(deliveries);
    }

    /// Processes one message from the connection tasks. Returns false once
    /// the loop should stop.
    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Connected {
                session_id,
                addr,
                outbound,
            } => {
                self.broadcaster.register(session_id, outbound);
                let deliveries = self.hub.connect(session_id, addr.ip());
                self.dispatch(&deliveries);
            }
            ServerMessage::FrameReceived { session_id, frame } => {
                match self.hub.handle_frame(session_id, &frame, Instant::now()) {
                    Ok(deliveries) => self.dispatch(&deliveries),
                    Err(rejection) => self.reject(session_id, rejection),
                }
            }
            ServerMessage::Disconnected { session_id } => {
                // Unregister first so the departing session is not a recipient.
                self.broadcaster.unregister(session_id);
                let deliveries = self.hub.disconnect(session_id);
                self.dispatch(&deliveries);
            }
            ServerMessage::Shutdown => return false,
        }
        true
    }

    fn reject(&self, session_id: SessionId, rejection: Rejection) {
        match &rejection {
            Rejection::Validation(e) => debug!("Invalid data from session {}: {}", session_id, e),
            Rejection::Policy(e) => warn!("Rejected event from session {}: {}", session_id, e),
            // The limiter already logged the first breach of the window.
            Rejection::RateLimited(e) => debug!("Session {}: {}", session_id, e),
            Rejection::Protocol(e) => debug!("Ignoring event: {}", e),
        }

        if let Some(notice) = rejection.notice() {
            self.broadcaster
                .dispatch(&Delivery::to_session(session_id, notice));
        }
    }

    /// Main server loop. Every hub mutation happens on this task.
    pub async fn run(&mut self) -> io::Result<()> {
        let listener = self.listener.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "server is already running")
        })?;
        self.spawn_acceptor(listener);

        info!("Server started successfully with seed {}", self.hub.seed());

        while let Some(message) = self.server_rx.recv().await {
            if !self.handle_message(message) {
                break;
            }
        }

        info!(
            "Server shutting down with {} open sessions",
            self.hub.session_count()
        );
        Ok(())
    }
}

/// Completes the handshake only to close the connection again.
async fn refuse_connection(stream: TcpStream, addr: SocketAddr) {
    match accept_async(stream).await {
        Ok(mut ws) => {
            if let Err(e) = ws.close(None).await {
                debug!("Failed to close refused connection {}: {}", addr, e);
            }
        }
        Err(e) => debug!("Handshake with refused connection {} failed: {}", addr, e),
    }
}

/// Drives one connection: forwards text frames to the main loop and writes
/// queued outbound frames back. Always reports the disconnect.
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    session_id: SessionId,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut frames) = ws.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    if server_tx
        .send(ServerMessage::Connected {
            session_id,
            addr,
            outbound,
        })
        .is_err()
    {
        return;
    }

    // Ends once the main loop drops the session's queue.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!("Failed to write to session {}: {}", session_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = frames.next().await {
        match message {
            Ok(Message::Text(frame)) => {
                if server_tx
                    .send(ServerMessage::FrameReceived { session_id, frame })
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from session {}", session_id);
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Connection error on session {}: {}", session_id, e);
                break;
            }
        }
    }

    if let Err(e) = server_tx.send(ServerMessage::Disconnected { session_id }) {
        error!("Failed to report disconnect of session {}: {}", session_id, e);
        writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::ServerEvent;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections: 4,
        }
    }

    fn connected(server: &mut Server, id: u64) -> mpsc::UnboundedReceiver<String> {
        let (outbound, rx) = mpsc::unbounded_channel();
        let addr: SocketAddr = format!("127.0.0.{}:5000", id).parse().unwrap();
        assert!(server.handle_message(ServerMessage::Connected {
            session_id: SessionId(id),
            addr,
            outbound,
        }));
        rx
    }

    fn frame(server: &mut Server, id: u64, frame: &str) {
        assert!(server.handle_message(ServerMessage::FrameReceived {
            session_id: SessionId(id),
            frame: frame.to_string(),
        }));
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            events.push(ServerEvent::decode(&frame).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::new(&test_config(), 0.5).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_message_flow_through_main_loop() {
        let mut server = Server::new(&test_config(), 0.5).await.unwrap();
        let mut one = connected(&mut server, 1);
        let mut two = connected(&mut server, 2);

        assert_eq!(drain(&mut one), vec![ServerEvent::Seed(0.5)]);
        assert_eq!(drain(&mut two), vec![ServerEvent::Seed(0.5)]);

        frame(
            &mut server,
            1,
            r#"{"event":"new player","data":{"x":1,"y":2,"username":"alice"}}"#,
        );
        let events = drain(&mut one);
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], ServerEvent::UsernameChosen("alice".to_string()));
        assert_eq!(drain(&mut two).len(), 2);

        frame(
            &mut server,
            2,
            r#"{"event":"new player","data":{"x":1,"y":2,"username":"alice"}}"#,
        );
        assert_eq!(drain(&mut two), vec![ServerEvent::UsernameTaken]);
        assert!(drain(&mut one).is_empty());

        frame(&mut server, 2, "garbage");
        assert!(drain(&mut two).is_empty());

        frame(
            &mut server,
            1,
            r#"{"event":"update position","data":{"x":12.25,"y":-3.5,"username":"alice"}}"#,
        );
        assert!(drain(&mut one).is_empty());
        match drain(&mut two).as_slice() {
            [ServerEvent::UpdatePosition(update)] => {
                assert_eq!(update.id, SessionId(1));
                assert_approx_eq!(update.player.x, 12.25);
                assert_approx_eq!(update.player.y, -3.5);
            }
            other => panic!("Expected one position update, got {:?}", other),
        }

        assert!(server.handle_message(ServerMessage::Disconnected {
            session_id: SessionId(1)
        }));
        let events = drain(&mut two);
        assert_eq!(events[0], ServerEvent::PlayerDisconnected(SessionId(1)));
        assert_eq!(events.len(), 3);
        assert!(one.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_message_stops_loop() {
        let mut server = Server::new(&test_config(), 0.5).await.unwrap();
        assert!(!server.handle_message(ServerMessage::Shutdown));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut server = Server::new(&test_config(), 0.5).await.unwrap();
        let handle = server.shutdown_handle();
        handle.send(ServerMessage::Shutdown).unwrap();

        tokio_test::assert_ok!(server.run().await);
        assert!(server.run().await.is_err());
    }
}
