use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::GameServices;
use game_types::{ServerError, ServerResponse};

pub mod connection;
pub mod framing;
pub mod handlers;
pub mod worker_pool;

use connection::ConnectionId;
pub use connection::ConnectionManager;
use framing::{Frame, LineFramer};
use handlers::CommandDispatcher;
use worker_pool::WorkerPoolError;

const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Accepts TCP connections and runs one reader, executor and writer task
/// per connection until the peer goes away or shutdown is requested.
pub struct GameServer {
    listener: TcpListener,
    services: GameServices,
}

impl GameServer {
    pub async fn bind(addr: SocketAddr, services: GameServices) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener, services })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut failures = 0u32;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Accept loop stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        failures = 0;
                        let services = self.services.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(handle_connection(stream, peer, services, shutdown));
                    }
                    Err(e) => {
                        // Accept errors are per-connection (e.g. too many open files)
                        failures = failures.saturating_add(1);
                        let pause = accept_backoff(failures);
                        warn!("Failed to accept connection: {}. Pausing {:?}", e, pause);
                        tokio::select! {
                            _ = tokio::time::sleep(pause) => {},
                            _ = shutdown.cancelled() => {},
                        }
                    }
                },
            }
        }
    }
}

/// Pause after `failures` consecutive accept errors: 10ms doubling up to 1s.
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(7);
    Duration::from_millis(10u64 << exponent).min(MAX_ACCEPT_BACKOFF)
}

pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    services: GameServices,
    shutdown: CancellationToken,
) {
    let connection_id = ConnectionId::new();
    info!("New connection {} from {}", connection_id, peer);

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY on {}: {}", connection_id, e);
    }
    let (reader, writer) = stream.into_split();

    let connections = services.connections.clone();
    let response_receiver = connections
        .create_connection(connection_id, peer, services.max_pending_requests)
        .await;
    let dispatcher = CommandDispatcher::new(
        connection_id,
        services.accounts.clone(),
        services.rounds.clone(),
    );

    let (line_sender, line_receiver) = mpsc::channel(services.max_pending_requests);

    let incoming = read_lines(
        reader,
        connection_id,
        LineFramer::new(services.max_line_bytes),
        services.read_buffer_bytes,
        line_sender,
    );
    let executor = execute_lines(line_receiver, dispatcher.clone(), services.clone());
    let outgoing = write_responses(writer, connection_id, response_receiver);

    // The executor finishes queued requests after the reader hits end of stream
    let requests = async move {
        tokio::join!(incoming, executor);
    };

    tokio::pin!(outgoing);
    let drain_pending = tokio::select! {
        _ = requests => true,
        _ = &mut outgoing => false,
        _ = shutdown.cancelled() => {
            debug!("Closing connection {} for shutdown", connection_id);
            false
        },
    };

    let teardown = dispatcher.clone();
    if let Err(e) = services
        .worker_pool
        .execute(move || teardown.handle_disconnect())
        .await
    {
        // Pool closed during shutdown: log out inline
        debug!("Logging out {} inline: {}", connection_id, e);
        dispatcher.handle_disconnect();
    }
    if let Some(closed) = connections.remove_connection(connection_id).await {
        let open_for = Utc::now().signed_duration_since(closed.connected_at);
        info!(
            "Connection {} from {} disconnected after {}s",
            connection_id,
            closed.peer,
            open_for.num_seconds()
        );
    }

    // Removing the entry dropped the sender, so the writer ends after the backlog
    if drain_pending {
        tokio::select! {
            _ = &mut outgoing => {},
            _ = shutdown.cancelled() => {},
        }
    }
}

enum Line {
    Request(String),
    Malformed(String),
}

async fn read_lines(
    mut reader: OwnedReadHalf,
    connection_id: ConnectionId,
    mut framer: LineFramer,
    buffer_size: usize,
    lines: mpsc::Sender<Line>,
) {
    let mut buffer = vec![0u8; buffer_size];
    loop {
        let read = match reader.read(&mut buffer).await {
            Ok(0) => {
                debug!("Connection {} reached end of stream", connection_id);
                return;
            }
            Ok(read) => read,
            Err(e) => {
                warn!("Read error on {}: {}", connection_id, e);
                return;
            }
        };

        let frames = match framer.push(&buffer[..read]) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Closing {}: {}", connection_id, e);
                return;
            }
        };

        for frame in frames {
            let line = match frame {
                Frame::Message(text) => Line::Request(text),
                Frame::Malformed(reason) => Line::Malformed(reason),
            };
            // Waits while the executor is behind, which pauses reading
            if lines.send(line).await.is_err() {
                return;
            }
        }
    }
}

/// Runs this connection's requests one at a time, in arrival order.
async fn execute_lines(
    mut lines: mpsc::Receiver<Line>,
    dispatcher: CommandDispatcher,
    services: GameServices,
) {
    let connection_id = dispatcher.connection_id();
    while let Some(line) = lines.recv().await {
        let response = match line {
            Line::Malformed(reason) => ServerResponse::from(ServerError::transport(reason)),
            Line::Request(text) => {
                let job = dispatcher.clone();
                match services.worker_pool.execute(move || job.handle_line(&text)).await {
                    Ok(response) => response,
                    Err(WorkerPoolError::Closed) => return,
                    Err(e) => {
                        error!("Request on {} failed: {}", connection_id, e);
                        ServerResponse::from(ServerError::Internal)
                    }
                }
            }
        };

        services
            .connections
            .set_connection_user(connection_id, dispatcher.current_username())
            .await;

        if services
            .connections
            .send_to_connection(connection_id, response)
            .await
            .is_err()
        {
            return;
        }
    }
}

async fn write_responses(
    mut writer: OwnedWriteHalf,
    connection_id: ConnectionId,
    mut responses: mpsc::Receiver<ServerResponse>,
) {
    while let Some(first) = responses.recv().await {
        let mut batch = Vec::new();
        let mut next = Some(first);
        // Drain whatever is already queued, then flush once
        while let Some(response) = next {
            match serde_json::to_vec(&response) {
                Ok(mut bytes) => {
                    bytes.push(b'\n');
                    batch.extend_from_slice(&bytes);
                }
                Err(e) => error!("Failed to serialize response: {:?}", e),
            }
            next = responses.try_recv().ok();
        }

        if let Err(e) = writer.write_all(&batch).await {
            warn!("Failed to write to {}: {}", connection_id, e);
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!("Failed to flush {}: {}", connection_id, e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_backoff_grows_and_caps() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(5), Duration::from_millis(160));
        assert_eq!(accept_backoff(8), Duration::from_secs(1));
        assert_eq!(accept_backoff(u32::MAX), Duration::from_secs(1));
    }
}
