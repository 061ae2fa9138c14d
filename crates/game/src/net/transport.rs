use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::watch;

use super::protocol::MAX_DATAGRAM_SIZE;
use super::stats::NetworkStats;
use super::tracking::{ReceiveTracker, SendSequence, SequenceOutcome};

const ERROR_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub channel_capacity: usize,
    pub receive_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub max_datagram_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            receive_timeout: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(1),
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("no usable address for {host}:{port}")]
    NoAddress { host: String, port: u16 },
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to start receive loop: {0}")]
    Spawn(io::Error),
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Datagram(Vec<u8>),
    Error {
        kind: io::ErrorKind,
        message: String,
    },
    Disconnected,
}

impl TransportEvent {
    fn from_io(error: &io::Error) -> Self {
        Self::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    fn from_transport(error: &TransportError) -> Self {
        let kind = match error {
            TransportError::Io(e) | TransportError::Spawn(e) => e.kind(),
            TransportError::Resolve { source, .. } => source.kind(),
            TransportError::NoAddress { .. } => io::ErrorKind::AddrNotAvailable,
            TransportError::NotConnected => io::ErrorKind::NotConnected,
        };
        Self::Error {
            kind,
            message: error.to_string(),
        }
    }
}

struct Connection {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    events: mpsc::Receiver<TransportEvent>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

pub struct Transport {
    config: TransportConfig,
    connection: Option<Connection>,
    send_sequence: SendSequence,
    receive_tracker: ReceiveTracker,
    stats: NetworkStats,
    overflow_drops: Arc<AtomicU64>,
    local_events: VecDeque<TransportEvent>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            connection: None,
            send_sequence: SendSequence::new(),
            receive_tracker: ReceiveTracker::new(),
            stats: NetworkStats::default(),
            overflow_drops: Arc::new(AtomicU64::new(0)),
            local_events: VecDeque::new(),
        }
    }

    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.connection.is_some() {
            self.disconnect();
        }

        self.send_sequence.reset();
        self.receive_tracker.reset();
        self.stats = NetworkStats::default();
        self.overflow_drops = Arc::new(AtomicU64::new(0));

        match self.open(host, port) {
            Ok(connection) => {
                log::info!(
                    "Transport connected to {} from {}",
                    connection.remote_addr,
                    connection
                        .socket
                        .local_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_default()
                );
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                log::warn!("Transport connect to {}:{} failed: {}", host, port, e);
                self.local_events
                    .push_back(TransportEvent::from_transport(&e));
                Err(e)
            }
        }
    }

    fn open(&self, host: &str, port: u16) -> Result<Connection, TransportError> {
        let remote_addr = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                port,
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::NoAddress {
                host: host.to_string(),
                port,
            })?;

        let bind_addr = if remote_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(remote_addr)?;
        socket.set_nonblocking(true)?;

        let recv_socket = socket.try_clone()?;
        let (events_tx, events) = mpsc::channel(self.config.channel_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = spawn_receive_loop(
            recv_socket,
            events_tx,
            shutdown_rx,
            self.config.clone(),
            Arc::clone(&self.overflow_drops),
        )
        .map_err(TransportError::Spawn)?;

        Ok(Connection {
            socket,
            remote_addr,
            events,
            shutdown,
            worker,
        })
    }

    pub fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let result = match &self.connection {
            Some(connection) => connection.socket.send(data).map_err(TransportError::Io),
            None => Err(TransportError::NotConnected),
        };

        match result {
            Ok(bytes) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += bytes as u64;
                Ok(bytes)
            }
            Err(e) => {
                log::debug!("Send failed: {}", e);
                self.local_events
                    .push_back(TransportEvent::from_transport(&e));
                Err(e)
            }
        }
    }

    pub fn next_send_sequence(&mut self) -> u32 {
        self.send_sequence.next()
    }

    /// Drains everything the receive loop has handed over since the last call.
    pub fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events: Vec<TransportEvent> = self.local_events.drain(..).collect();
        let mut worker_gone = false;

        if let Some(connection) = &mut self.connection {
            loop {
                match connection.events.try_recv() {
                    Ok(event) => {
                        if let TransportEvent::Datagram(data) = &event {
                            self.stats.packets_received += 1;
                            self.stats.bytes_received += data.len() as u64;
                        }
                        events.push(event);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        worker_gone = true;
                        break;
                    }
                }
            }
        }

        self.stats.packets_dropped = self.overflow_drops.load(Ordering::Relaxed);

        if worker_gone {
            log::warn!("Receive loop stopped unexpectedly");
            self.disconnect();
            events.extend(self.local_events.drain(..));
        }

        events
    }

    pub fn update_received_sequence(&mut self, sequence: u32) -> SequenceOutcome {
        let outcome = self.receive_tracker.update(sequence);
        match outcome {
            SequenceOutcome::Accepted { gap } if gap > 0 => {
                log::debug!("Sequence gap of {} before {}", gap, sequence);
                self.stats.packets_lost += gap as u64;
            }
            SequenceOutcome::Stale => {
                log::trace!(
                    "Stale sequence {} (last {})",
                    sequence,
                    self.receive_tracker.last_received()
                );
                self.stats.packets_stale += 1;
            }
            _ => {}
        }
        outcome
    }

    pub fn last_received_sequence(&self) -> u32 {
        self.receive_tracker.last_received()
    }

    pub fn disconnect(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let _ = connection.shutdown.send(true);
        join_with_timeout(connection.worker, self.config.shutdown_timeout);
        drop(connection.events);
        drop(connection.socket);

        log::info!("Transport disconnected from {}", connection.remote_addr);
        self.local_events.push_back(TransportEvent::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(|c| c.remote_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection
            .as_ref()
            .and_then(|c| c.socket.local_addr().ok())
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut NetworkStats {
        &mut self.stats
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn spawn_receive_loop(
    socket: UdpSocket,
    events: mpsc::Sender<TransportEvent>,
    shutdown: watch::Receiver<bool>,
    config: TransportConfig,
    overflow_drops: Arc<AtomicU64>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("transport-recv".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::error!("Failed to build receive runtime: {}", e);
                    let _ = events.try_send(TransportEvent::from_io(&e));
                    return;
                }
            };

            runtime.block_on(receive_loop(
                socket,
                events,
                shutdown,
                config,
                overflow_drops,
            ));
        })
}

async fn receive_loop(
    socket: UdpSocket,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
    config: TransportConfig,
    overflow_drops: Arc<AtomicU64>,
) {
    let socket = match tokio::net::UdpSocket::from_std(socket) {
        Ok(socket) => socket,
        Err(e) => {
            log::error!("Failed to register receive socket: {}", e);
            let _ = events.try_send(TransportEvent::from_io(&e));
            return;
        }
    };

    let mut buffer = vec![0u8; config.max_datagram_size];

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            result = tokio::time::timeout(config.receive_timeout, socket.recv(&mut buffer)) => {
                match result {
                    Err(_elapsed) => continue,
                    Ok(Ok(size)) => {
                        let datagram = buffer[..size].to_vec();
                        match events.try_send(TransportEvent::Datagram(datagram)) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                let dropped = overflow_drops.fetch_add(1, Ordering::Relaxed) + 1;
                                log::warn!("Inbound queue full, dropped datagram ({} total)", dropped);
                            }
                            Err(TrySendError::Closed(_)) => break,
                        }
                    }
                    Ok(Err(e)) => {
                        log::debug!("Receive error: {}", e);
                        if let Err(TrySendError::Closed(_)) = events.try_send(TransportEvent::from_io(&e)) {
                            break;
                        }
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    log::debug!("Receive loop exiting");
}

fn join_with_timeout(worker: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;

    while !worker.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("Receive loop did not stop within {:?}, detaching", timeout);
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }

    if worker.join().is_err() {
        log::error!("Receive loop panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_connection() {
        let mut transport = Transport::default();

        assert!(matches!(
            transport.send(&[1, 2, 3]),
            Err(TransportError::NotConnected)
        ));

        let events = transport.poll_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TransportEvent::Error {
                kind: io::ErrorKind::NotConnected,
                ..
            }
        ));
    }

    #[test]
    fn test_sequence_stats() {
        let mut transport = Transport::default();

        assert_eq!(
            transport.update_received_sequence(1),
            SequenceOutcome::Accepted { gap: 0 }
        );
        assert_eq!(
            transport.update_received_sequence(2),
            SequenceOutcome::Accepted { gap: 0 }
        );
        assert_eq!(
            transport.update_received_sequence(5),
            SequenceOutcome::Accepted { gap: 2 }
        );
        assert_eq!(transport.update_received_sequence(3), SequenceOutcome::Stale);

        assert_eq!(transport.last_received_sequence(), 5);
        assert_eq!(transport.stats().packets_lost, 2);
        assert_eq!(transport.stats().packets_stale, 1);
    }

    #[test]
    fn test_disconnect_without_connection_is_silent() {
        let mut transport = Transport::default();
        transport.disconnect();
        assert!(transport.poll_events().is_empty());
    }
}
