//! TCP transport carrying newline-delimited JSON envelopes.
//!
//! Each node writes on connections it dialed and reads on every connection.
//! A line on the wire is `{"from": "<address>", "body": "<payload>"}`.
//!
//! Every peer gets its own writer task fed by an unbounded queue, so
//! [`Transport::send`] only enqueues. Connecting, reconnecting and slow
//! writes happen inside that task and never hold up sends to other peers.

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use netroute_wire::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Attempts per line before it is dropped
const MAX_WRITE_ATTEMPTS: u32 = 2;

/// One line on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Envelope {
    from: Address,
    body: String,
}

type PeerQueue = mpsc::UnboundedSender<Vec<u8>>;

/// TCP transport bound to one listening socket
#[derive(Debug, Clone)]
pub struct TcpTransport {
    local_address: Address,
    peers: Arc<Mutex<HashMap<Address, PeerQueue>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl TcpTransport {
    /// Listen on `listen` and advertise ourselves to peers as `advertised`
    pub async fn bind(
        listen: &str,
        advertised: Address,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let listener = TcpListener::bind(listen).await?;
        Ok(Self::from_listener(listener, advertised))
    }

    /// Build a transport around an already bound listener and start accepting
    pub fn from_listener(
        listener: TcpListener,
        advertised: Address,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            local_address: advertised,
            peers: Arc::new(Mutex::new(HashMap::new())),
            events,
        };

        if let Ok(addr) = listener.local_addr() {
            info!("Listening for peers on {} as {}", addr, transport.local_address);
        }
        tokio::spawn(accept_loop(listener, transport.events.clone()));

        (transport, rx)
    }

    /// Start a writer for every neighbor that dials right away, retrying with
    /// backoff. The first successful connection to each raises
    /// [`TransportEvent::NeighborReachable`].
    pub async fn dial_neighbors<I>(&self, neighbors: I)
    where
        I: IntoIterator<Item = Address>,
    {
        let mut peers = self.peers.lock().await;
        for neighbor in neighbors {
            if peers.get(&neighbor).is_some_and(|queue| !queue.is_closed()) {
                debug!("Writer for {} already running", neighbor);
                continue;
            }
            let queue = spawn_peer(neighbor.clone(), self.events.clone(), true);
            peers.insert(neighbor, queue);
        }
    }

    /// Queue of the writer for `to`, started lazily on first use
    async fn queue_for(&self, to: &Address) -> PeerQueue {
        let mut peers = self.peers.lock().await;
        match peers.get(to) {
            Some(queue) if !queue.is_closed() => queue.clone(),
            _ => {
                let queue = spawn_peer(to.clone(), self.events.clone(), false);
                peers.insert(to.clone(), queue.clone());
                queue
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_address(&self) -> &Address {
        &self.local_address
    }

    async fn send(&self, to: &Address, payload: String) -> Result<(), TransportError> {
        let envelope = Envelope {
            from: self.local_address.clone(),
            body: payload,
        };
        let mut line = serde_json::to_vec(&envelope)?;
        line.push(b'\n');

        self.queue_for(to)
            .await
            .send(line)
            .map_err(|_| TransportError::Closed(to.clone()))
    }
}

fn spawn_peer(
    target: Address,
    events: mpsc::UnboundedSender<TransportEvent>,
    announce: bool,
) -> PeerQueue {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_peer(target, rx, events, announce));
    tx
}

/// Writer task for one peer. Dialed neighbors connect immediately; other
/// peers connect when their first line is queued.
async fn run_peer(
    target: Address,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut announce: bool,
) {
    let mut writer: Option<OwnedWriteHalf> = None;
    let mut pending: Option<(Vec<u8>, u32)> = None;
    let mut backoff = INITIAL_BACKOFF;

    if !announce {
        match queue.recv().await {
            Some(line) => pending = Some((line, 0)),
            None => return,
        }
    }

    loop {
        let mut stream = match writer.take() {
            Some(stream) => stream,
            None => match TcpStream::connect(target.as_str()).await {
                Ok(stream) => {
                    info!("TCP connection established to {}", target);
                    backoff = INITIAL_BACKOFF;

                    let (read_half, write_half) = stream.into_split();
                    tokio::spawn(read_loop(read_half, events.clone()));

                    if announce {
                        announce = false;
                        let event = TransportEvent::NeighborReachable {
                            address: target.clone(),
                        };
                        if events.send(event).is_err() {
                            debug!("Node gone, closing writer to {}", target);
                            return;
                        }
                    }
                    write_half
                }
                Err(e) => {
                    if events.is_closed() {
                        return;
                    }
                    warn!("Failed to connect to {}: {}; retrying in {:?}", target, e, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            },
        };

        let (line, attempts) = match pending.take() {
            Some(pending) => pending,
            None => match queue.recv().await {
                Some(line) => (line, 0),
                None => {
                    debug!("Transport dropped, closing writer to {}", target);
                    return;
                }
            },
        };

        match stream.write_all(&line).await {
            Ok(()) => writer = Some(stream),
            Err(e) if attempts + 1 < MAX_WRITE_ATTEMPTS => {
                debug!("Write to {} failed ({}), reconnecting", target, e);
                pending = Some((line, attempts + 1));
            }
            Err(e) => {
                warn!("Dropping payload for {} after {} failed writes: {}", target, MAX_WRITE_ATTEMPTS, e);
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<TransportEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Accepted connection from {}", peer);
                tokio::spawn(read_loop(stream, events.clone()));
            }
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
            }
        }

        if events.is_closed() {
            debug!("Node gone, no longer accepting connections");
            return;
        }
    }
}

async fn read_loop<R>(reader: R, events: mpsc::UnboundedSender<TransportEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Peer closed connection");
                return;
            }
            Err(e) => {
                warn!("Connection read failed: {}", e);
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => {
                let event = TransportEvent::Received {
                    from: envelope.from,
                    payload: envelope.body,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Err(e) => warn!("Dropping undecodable envelope: {}", e),
        }
    }
}
