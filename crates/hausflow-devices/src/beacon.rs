/*!
 * Beacon transport.
 *
 * Beacon relays connect over TCP and stream fixed 16-byte frames: six bytes
 * of physical address, one class tag and nine bytes of class payload. Every
 * connection is also a sink for outbound frames, which are written to all
 * connected relays at once.
 */
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use hausflow_core::logging::component_span;

use crate::registry::DeviceRegistry;

/// Size of every beacon frame
pub const FRAME_LEN: usize = 16;

/// Outbound frames buffered per relay before further frames are dropped
pub const WRITE_QUEUE_LEN: usize = 64;

/// Reassembles a byte stream into fixed-size frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: BytesMut,
}

impl FrameAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::with_capacity(self.pending.len() / FRAME_LEN);
        while self.pending.len() >= FRAME_LEN {
            frames.push(self.pending.split_to(FRAME_LEN).freeze());
        }
        frames
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Outbound path to the physical devices
pub trait BeaconSink: Send + Sync + std::fmt::Debug {
    /// Write `frame` to every connected relay, returning how many accepted it.
    /// Zero means there is no path to any device. A relay whose write queue
    /// is full does not count.
    fn broadcast(&self, frame: &[u8]) -> usize;
}

/// The set of live relay connections
#[derive(Debug, Default)]
pub struct ConnectionSet {
    next_id: AtomicU64,
    writers: Mutex<HashMap<u64, mpsc::Sender<Bytes>>>,
}

impl ConnectionSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's writer queue, returning its key
    pub fn insert(&self, writer: mpsc::Sender<Bytes>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, writer);
        id
    }

    /// Forget a connection
    pub fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no relay is connected
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::Sender<Bytes>>> {
        self.writers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BeaconSink for ConnectionSet {
    fn broadcast(&self, frame: &[u8]) -> usize {
        let frame = Bytes::copy_from_slice(frame);
        let writers = self.lock();
        let written = writers
            .values()
            .filter(|writer| writer.try_send(frame.clone()).is_ok())
            .count();
        debug!("Broadcast {} byte frame to {} relays", frame.len(), written);
        written
    }
}

/// TCP server accepting beacon relays
#[derive(Debug)]
pub struct BeaconServer {
    listener: TcpListener,
    connections: Arc<ConnectionSet>,
    registry: Arc<DeviceRegistry>,
}

impl BeaconServer {
    /// Bind the listener
    pub async fn bind(
        addr: SocketAddr,
        connections: Arc<ConnectionSet>,
        registry: Arc<DeviceRegistry>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Beacon server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            connections,
            registry,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept relays until the task is dropped
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let span = component_span("beacon", Some(&peer.to_string()));
                    tokio::spawn(
                        serve_connection(stream, peer, self.connections.clone(), self.registry.clone())
                            .instrument(span),
                    );
                }
                Err(e) => {
                    warn!("Failed to accept beacon connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    connections: Arc<ConnectionSet>,
    registry: Arc<DeviceRegistry>,
) {
    info!("Beacon relay connected from {}", peer);

    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(WRITE_QUEUE_LEN);
    let id = connections.insert(tx);

    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            writer.write_all(&frame).await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut assembler = FrameAssembler::new();
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("Beacon relay {} closed the connection", peer);
                    break;
                }
                Ok(n) => {
                    for frame in assembler.push(&buf[..n]) {
                        registry.ingest_beacon_frame(&frame);
                    }
                }
                Err(e) => {
                    warn!("Read from beacon relay {} failed: {}", peer, e);
                    break;
                }
            },
            written = &mut write_task => {
                match written {
                    Ok(Err(e)) => warn!("Write to beacon relay {} failed: {}", peer, e),
                    Err(e) => warn!("Writer for beacon relay {} stopped: {}", peer, e),
                    Ok(Ok(())) => {}
                }
                break;
            }
        }
    }

    connections.remove(id);
    write_task.abort();
    info!(
        "Beacon relay {} disconnected ({} bytes of partial frame dropped)",
        peer,
        assembler.pending_len()
    );
}
