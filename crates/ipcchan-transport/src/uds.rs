use std::collections::HashMap;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use ipcchan_channel::Packet;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::error::{FrameError, Result, TransportError};
use crate::frame::{FrameConfig, PacketCodec};
use crate::traits::{inbound_channel, Inbound, InboundRx, InboundTx, PeerId, Transport, WindowId};

/// Outbound queue of one connection and the task writing it to the socket.
#[derive(Debug)]
struct Route {
    tx: mpsc::UnboundedSender<Packet>,
    writer: JoinHandle<()>,
}

type Routes = Arc<Mutex<HashMap<PeerId, Route>>>;

fn lock_routes(routes: &Routes) -> MutexGuard<'_, HashMap<PeerId, Route>> {
    routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Outbound side of the socket transport.
///
/// Each connected peer has a writer task draining its own queue, so `post`
/// never blocks on socket I/O.
#[derive(Debug, Clone, Default)]
pub struct SocketTransport {
    routes: Routes,
}

impl SocketTransport {
    /// Peers with a live connection.
    pub fn peers(&self) -> Vec<PeerId> {
        lock_routes(&self.routes).keys().cloned().collect()
    }

    /// Drop the route to `peer`; its connection shuts down once queued
    /// packets are flushed.
    pub fn disconnect(&self, peer: &PeerId) -> bool {
        lock_routes(&self.routes).remove(peer).is_some()
    }

    /// Drop every route and wait until each connection has written out
    /// what was queued for it.
    pub async fn shutdown(&self) {
        let writers: Vec<(PeerId, JoinHandle<()>)> = lock_routes(&self.routes)
            .drain()
            .map(|(peer, route)| (peer, route.writer))
            .collect();
        for (peer, writer) in writers {
            if let Err(err) = writer.await {
                warn!(%peer, error = %err, "writer task failed");
            }
        }
    }
}

impl Transport for SocketTransport {
    fn post(&self, peer: &PeerId, packet: Packet) -> Result<()> {
        let routes = lock_routes(&self.routes);
        let route = routes
            .get(peer)
            .ok_or_else(|| TransportError::PeerNotConnected(peer.clone()))?;
        route
            .tx
            .send(packet)
            .map_err(|_| TransportError::PeerNotConnected(peer.clone()))
    }
}

/// Unix domain socket listener for the main process.
///
/// Every accepted connection becomes a window peer named `window-<n>`.
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
    /// Identity of the socket file we created; cleanup skips anything else.
    created_inode: Option<(u64, u64)>,
    transport: SocketTransport,
    next_window_id: AtomicU64,
    frame_config: FrameConfig,
}

impl SocketListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// If the path already exists and is a socket, it is removed first
    /// (stale socket cleanup). Must be called within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let std_listener = std::os::unix::net::UnixListener::bind(&path).map_err(bind_err)?;
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let listener = UnixListener::from_std(std_listener).map_err(bind_err)?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            created_inode: Some((created.dev(), created.ino())),
            path,
            transport: SocketTransport::default(),
            next_window_id: AtomicU64::new(1),
            frame_config: FrameConfig::default(),
        })
    }

    /// Override the frame codec configuration for accepted connections.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Transport that posts to the accepted window connections.
    pub fn transport(&self) -> SocketTransport {
        self.transport.clone()
    }

    /// Accept the next connection and start pumping it into `inbound`.
    pub async fn accept(&self, inbound: &InboundTx) -> Result<WindowId> {
        let (stream, _addr) = self.listener.accept().await.map_err(TransportError::Accept)?;
        let n = self.next_window_id.fetch_add(1, Ordering::Relaxed);
        let window = WindowId::new(format!("window-{n}"));
        debug!(%window, "accepted connection");

        spawn_connection(
            stream,
            PeerId::Window(window.clone()),
            self.transport.routes.clone(),
            inbound.clone(),
            self.frame_config.clone(),
            true,
        );
        Ok(window)
    }

    /// Accept connections until accepting fails.
    pub async fn run(&self, inbound: InboundTx) -> Result<()> {
        loop {
            self.accept(&inbound).await?;
        }
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

/// Connect to a main process as a window.
pub async fn connect(path: impl AsRef<Path>) -> Result<(SocketTransport, InboundRx)> {
    connect_with_config(path, FrameConfig::default()).await
}

/// Connect with an explicit frame codec configuration.
pub async fn connect_with_config(
    path: impl AsRef<Path>,
    config: FrameConfig,
) -> Result<(SocketTransport, InboundRx)> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path)
        .await
        .map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(?path, "connected to unix domain socket");

    let transport = SocketTransport::default();
    let (inbound_tx, inbound_rx) = inbound_channel();
    spawn_connection(
        stream,
        PeerId::Main,
        transport.routes.clone(),
        inbound_tx,
        config,
        false,
    );
    Ok((transport, inbound_rx))
}

fn spawn_connection(
    stream: UnixStream,
    peer: PeerId,
    routes: Routes,
    inbound: InboundTx,
    config: FrameConfig,
    announce: bool,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Packet>();

    let mut sink = FramedWrite::new(write_half, PacketCodec::with_config(config.clone()));
    let writer_peer = peer.clone();
    let writer = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            let kind = packet.kind();
            let channel = packet.channel().map(str::to_owned);
            match sink.send(packet).await {
                Ok(()) => {}
                Err(FrameError::Io(err)) => {
                    warn!(peer = %writer_peer, error = %err, "socket write failed");
                    break;
                }
                Err(err) => {
                    warn!(
                        peer = %writer_peer,
                        kind,
                        channel = channel.as_deref(),
                        error = %err,
                        "dropping unencodable packet"
                    );
                }
            }
        }
        debug!(peer = %writer_peer, "writer finished");
    });

    // The route and the open event exist before any inbound packet is forwarded.
    lock_routes(&routes).insert(peer.clone(), Route { tx, writer });
    if announce {
        let _ = inbound.send(Inbound::PeerOpened(peer.clone()));
    }

    let mut stream = FramedRead::new(read_half, PacketCodec::with_config(config));
    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            match item {
                Ok(packet) => {
                    let event = Inbound::Packet {
                        from: peer.clone(),
                        packet,
                    };
                    if inbound.send(event).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%peer, error = %err, "closing connection after frame error");
                    break;
                }
            }
        }
        lock_routes(&routes).remove(&peer);
        debug!(%peer, "connection closed");
        let _ = inbound.send(Inbound::PeerClosed(peer));
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/ipcchan-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    async fn next(rx: &mut InboundRx) -> Inbound {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("inbound event should arrive")
            .expect("inbound queue should be open")
    }

    #[tokio::test]
    async fn window_and_main_exchange_packets() {
        let dir = temp_dir("exchange");
        let sock_path = dir.join("main.sock");
        let listener = SocketListener::bind(&sock_path).unwrap();
        let main_transport = listener.transport();
        let (main_tx, mut main_rx) = inbound_channel();

        let (window_transport, mut window_rx) = connect(&sock_path).await.unwrap();
        let window = listener.accept(&main_tx).await.unwrap();
        assert_eq!(window.as_str(), "window-1");
        let window_peer = PeerId::Window(window);

        assert_eq!(
            next(&mut main_rx).await,
            Inbound::PeerOpened(window_peer.clone())
        );

        let hello = Packet::Message {
            channel: "ping".to_string(),
            payload: "\"hello\"".to_string(),
        };
        window_transport.post(&PeerId::Main, hello.clone()).unwrap();
        assert_eq!(
            next(&mut main_rx).await,
            Inbound::Packet {
                from: window_peer.clone(),
                packet: hello,
            }
        );

        main_transport.post(&window_peer, Packet::Ready).unwrap();
        assert_eq!(
            next(&mut window_rx).await,
            Inbound::Packet {
                from: PeerId::Main,
                packet: Packet::Ready,
            }
        );

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn disconnect_reports_peer_closed_on_both_sides() {
        let dir = temp_dir("disconnect");
        let sock_path = dir.join("main.sock");
        let listener = SocketListener::bind(&sock_path).unwrap();
        let (main_tx, mut main_rx) = inbound_channel();

        let (window_transport, mut window_rx) = connect(&sock_path).await.unwrap();
        let window = listener.accept(&main_tx).await.unwrap();
        let window_peer = PeerId::Window(window);
        assert_eq!(
            next(&mut main_rx).await,
            Inbound::PeerOpened(window_peer.clone())
        );

        assert!(window_transport.disconnect(&PeerId::Main));
        assert_eq!(
            next(&mut main_rx).await,
            Inbound::PeerClosed(window_peer.clone())
        );
        assert_eq!(next(&mut window_rx).await, Inbound::PeerClosed(PeerId::Main));
        assert!(listener.transport().peers().is_empty());

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_packets() {
        let dir = temp_dir("shutdown");
        let sock_path = dir.join("main.sock");
        let listener = SocketListener::bind(&sock_path).unwrap();
        let (main_tx, mut main_rx) = inbound_channel();

        let (window_transport, _window_rx) = connect(&sock_path).await.unwrap();
        let window = listener.accept(&main_tx).await.unwrap();
        let window_peer = PeerId::Window(window);
        assert_eq!(
            next(&mut main_rx).await,
            Inbound::PeerOpened(window_peer.clone())
        );

        for n in 0..8 {
            let packet = Packet::Message {
                channel: "count".to_string(),
                payload: n.to_string(),
            };
            window_transport.post(&PeerId::Main, packet).unwrap();
        }
        window_transport.shutdown().await;
        assert!(window_transport.peers().is_empty());

        for n in 0..8 {
            match next(&mut main_rx).await {
                Inbound::Packet {
                    packet: Packet::Message { payload, .. },
                    ..
                } => assert_eq!(payload, n.to_string()),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(next(&mut main_rx).await, Inbound::PeerClosed(window_peer));

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn oversized_packet_is_dropped_and_the_connection_survives() {
        let dir = temp_dir("oversized");
        let sock_path = dir.join("main.sock");
        let listener = SocketListener::bind(&sock_path).unwrap();
        let (main_tx, mut main_rx) = inbound_channel();

        let config = FrameConfig {
            max_payload_size: 128,
        };
        let (window_transport, _window_rx) = connect_with_config(&sock_path, config).await.unwrap();
        let window = listener.accept(&main_tx).await.unwrap();
        let window_peer = PeerId::Window(window);
        assert_eq!(
            next(&mut main_rx).await,
            Inbound::PeerOpened(window_peer.clone())
        );

        let big = Packet::Message {
            channel: "bulk".to_string(),
            payload: format!("\"{}\"", "x".repeat(512)),
        };
        let small = Packet::Message {
            channel: "bulk".to_string(),
            payload: "1".to_string(),
        };
        window_transport.post(&PeerId::Main, big).unwrap();
        window_transport.post(&PeerId::Main, small.clone()).unwrap();

        assert_eq!(
            next(&mut main_rx).await,
            Inbound::Packet {
                from: window_peer,
                packet: small,
            }
        );

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_cleans_up_on_drop() {
        let dir = temp_dir("cleanup");
        let sock_path = dir.join("main.sock");

        let listener = SocketListener::bind(&sock_path).unwrap();
        assert!(sock_path.exists());
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let dir = temp_dir("stale");
        let sock_path = dir.join("main.sock");
        let stale = std::os::unix::net::UnixListener::bind(&sock_path).unwrap();
        drop(stale);
        assert!(sock_path.exists());

        let listener = SocketListener::bind(&sock_path).unwrap();
        assert_eq!(listener.path(), sock_path.as_path());

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = SocketListener::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(sock_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_rejects_long_paths() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = SocketListener::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[tokio::test]
    async fn connect_to_missing_socket_fails() {
        let dir = temp_dir("missing");
        let result = connect(dir.join("absent.sock")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
