//! IPC server implementation.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::IpcResult;
use crate::events::{Event, EventType};
use crate::messages::{ErrorInfo, Method, Request, Response};

/// Longest request line accepted from a client.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// A request handed to the daemon, with the channel its response goes back on.
pub type RequestEnvelope = (u64, Request, mpsc::Sender<Response>);

/// IPC server that listens for client connections.
pub struct IpcServer {
    listener: UnixListener,
    clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
    next_client_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
    request_tx: mpsc::Sender<RequestEnvelope>,
}

#[derive(Default)]
struct ClientHandle {
    subscriptions: HashSet<EventType>,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be created.
    pub async fn bind(socket_path: &Path) -> IpcResult<(Self, mpsc::Receiver<RequestEnvelope>)> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(?socket_path, "IPC server listening");

        let (event_tx, _) = broadcast::channel(256);
        let (request_tx, request_rx) = mpsc::channel(64);

        Ok((
            Self {
                listener,
                clients: Arc::new(RwLock::new(HashMap::new())),
                next_client_id: AtomicU64::new(1),
                event_tx,
                request_tx,
            },
            request_rx,
        ))
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, "Client connected");

                    let clients = Arc::clone(&self.clients);
                    let event_rx = self.event_tx.subscribe();
                    let request_tx = self.request_tx.clone();
                    let shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_client(client_id, stream, clients, event_rx, request_tx, shutdown).await
                        {
                            error!(client_id, error = %e, "Client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
        info!("IPC server stopped");
    }

    /// Broadcast an event to all subscribed clients.
    pub fn broadcast(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get a clone of the event sender for broadcasting from other tasks.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn handle_client(
        client_id: u64,
        stream: UnixStream,
        clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
        mut event_rx: broadcast::Receiver<Event>,
        request_tx: mpsc::Sender<RequestEnvelope>,
        shutdown: CancellationToken,
    ) -> IpcResult<()> {
        clients.write().await.insert(client_id, ClientHandle::default());
        let result = Self::serve_client(client_id, stream, &clients, &mut event_rx, &request_tx, &shutdown).await;
        clients.write().await.remove(&client_id);

        info!(client_id, "Client handler exiting");
        result
    }

    async fn serve_client(
        client_id: u64,
        stream: UnixStream,
        clients: &RwLock<HashMap<u64, ClientHandle>>,
        event_rx: &mut broadcast::Receiver<Event>,
        request_tx: &mpsc::Sender<RequestEnvelope>,
        shutdown: &CancellationToken,
    ) -> IpcResult<()> {
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let (response_tx, mut response_rx) = mpsc::channel::<Response>(16);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),

                // Read request from client
                line = framed.next() => {
                    let line = match line {
                        None => {
                            debug!(client_id, "Client disconnected");
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(line)) => line,
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    let request = match serde_json::from_str::<Request>(&line) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(client_id, error = %e, "Invalid request format");
                            let response =
                                Response::error(0, ErrorInfo::new(ErrorInfo::BAD_REQUEST, format!("Invalid request: {e}")));
                            framed.send(serde_json::to_string(&response)?).await?;
                            continue;
                        }
                    };
                    debug!(client_id, request_id = request.id, "Received request");

                    let subscription = match &request.method {
                        Method::Subscribe { events } => Some((events.clone(), true)),
                        Method::Unsubscribe { events } => Some((events.clone(), false)),
                        _ => None,
                    };
                    if let Some((events, subscribe)) = subscription {
                        update_subscriptions(clients, client_id, &events, subscribe).await;
                        let response = Response::ok(request.id, json!({ "success": true }));
                        framed.send(serde_json::to_string(&response)?).await?;
                    } else if request_tx.send((client_id, request, response_tx.clone())).await.is_err() {
                        warn!(client_id, "Request handler is gone");
                        return Ok(());
                    }
                }

                // Send response to client
                Some(response) = response_rx.recv() => {
                    framed.send(serde_json::to_string(&response)?).await?;
                }

                // Forward events to client
                Ok(event) = event_rx.recv() => {
                    let subscribed = clients
                        .read()
                        .await
                        .get(&client_id)
                        .is_some_and(|handle| handle.subscriptions.contains(&event.event));
                    if subscribed {
                        framed.send(serde_json::to_string(&event)?).await?;
                    }
                }
            }
        }
    }
}

async fn update_subscriptions(
    clients: &RwLock<HashMap<u64, ClientHandle>>,
    client_id: u64,
    events: &[EventType],
    subscribe: bool,
) {
    let mut clients = clients.write().await;
    let Some(handle) = clients.get_mut(&client_id) else {
        return;
    };
    for event in events {
        if subscribe {
            handle.subscriptions.insert(*event);
        } else {
            handle.subscriptions.remove(event);
        }
    }
    debug!(client_id, ?events, subscribe, "Subscriptions updated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::IpcClient;
    use crate::events::DevicesChangedData;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn start() -> (tempfile::TempDir, Arc<IpcServer>, mpsc::Receiver<RequestEnvelope>, CancellationToken) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (server, requests) = IpcServer::bind(&dir.path().join("daemon.sock")).await.expect("Failed to bind");
        let server = Arc::new(server);
        let token = CancellationToken::new();
        let runner = Arc::clone(&server);
        let run_token = token.clone();
        tokio::spawn(async move { runner.run(run_token).await });
        (dir, server, requests, token)
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (dir, _server, mut requests, token) = start().await;
        tokio::spawn(async move {
            while let Some((_, request, reply)) = requests.recv().await {
                let _ = reply.send(Response::ok(request.id, json!({ "echo": request.id }))).await;
            }
        });

        let client = IpcClient::connect(&dir.path().join("daemon.sock")).await.expect("Failed to connect");
        let value = client.call(Method::ListPipelines).await.expect("Request failed");
        assert_eq!(value, json!({ "echo": 1 }));
        token.cancel();
    }

    #[tokio::test]
    async fn test_events_reach_subscribers_only() {
        let (dir, server, _requests, token) = start().await;
        let mut client = IpcClient::connect(&dir.path().join("daemon.sock")).await.expect("Failed to connect");

        client.call(Method::Subscribe { events: vec![EventType::JobEvent] }).await.expect("Subscribe failed");

        let devices = DevicesChangedData { backend: "pulseaudio".into(), count: 2 };
        server.broadcast(Event::new(EventType::DevicesChanged, &devices).unwrap());
        server.broadcast(Event { event: EventType::JobEvent, data: json!({ "job_id": 4 }) });

        let event = tokio::time::timeout(Duration::from_secs(5), client.events().recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Event channel closed");
        assert_eq!(event.event, EventType::JobEvent);
        assert_eq!(event.data["job_id"], 4);
        token.cancel();
    }

    #[tokio::test]
    async fn test_malformed_line_gets_bad_request() {
        let (dir, _server, _requests, token) = start().await;
        let stream = UnixStream::connect(dir.path().join("daemon.sock")).await.expect("Failed to connect");
        let (reader, mut writer) = stream.into_split();

        writer.write_all(b"not json\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();

        let response: Response = serde_json::from_str(&line).expect("Failed to parse response");
        assert_eq!(response.id, 0);
        assert_eq!(response.result.unwrap_err().code, ErrorInfo::BAD_REQUEST);
        token.cancel();
    }
}
