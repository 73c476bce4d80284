//! TCP Ingress Proxy Implementation
//!
//! Listens on the configured address; each accepted connection becomes one
//! packet stream: START, one DATA frame per socket read, then END on EOF or
//! ERROR on a failed read. Every frame lands on the gateway's shared ingress
//! queue, where mix-net clients pick them up one per round.

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use mixgate_core::{Gateway, GatewayError};
use mixgate_proto::{PacketHeader, PacketType, RESERVED_STREAM_ID};

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to bind to {address}: {reason}")]
    BindError { address: String, reason: String },

    #[error("Gateway error: {0}")]
    GatewayError(#[from] GatewayError),
}

#[derive(Debug, Clone)]
pub struct IngressProxyConfig {
    pub bind_addr: SocketAddr,
}

/// TCP listener feeding the gateway's ingress queue
pub struct IngressProxy {
    config: IngressProxyConfig,
    gateway: Arc<Gateway>,
}

impl IngressProxy {
    pub fn new(config: IngressProxyConfig, gateway: Arc<Gateway>) -> Self {
        Self { config, gateway }
    }

    async fn bind(&self) -> Result<TcpListener, IngressError> {
        // SO_REUSEADDR so a restart is not blocked by sockets in TIME_WAIT
        let socket = Socket::new(
            Domain::for_address(self.config.bind_addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;

        socket
            .bind(&self.config.bind_addr.into())
            .map_err(|e| IngressError::BindError {
                address: self.config.bind_addr.to_string(),
                reason: e.to_string(),
            })?;

        socket.listen(128)?;
        socket.set_nonblocking(true)?;

        let std_listener: std::net::TcpListener = socket.into();
        Ok(TcpListener::from_std(std_listener)?)
    }

    /// Run the accept loop for the process lifetime.
    ///
    /// Per-connection errors are logged and do not stop the listener; only
    /// the listen socket dying ends the loop.
    pub async fn start(self) -> Result<(), IngressError> {
        let listener = self.bind().await?;
        let addr = listener.local_addr()?;

        info!("Ingress proxy listening on {}", addr);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let gateway = self.gateway.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, gateway).await {
                            error!("Error handling ingress connection from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept ingress connection: {}", e);
                }
            }
        }
    }
}

/// Packetize one TCP connection into a START / DATA / END|ERROR stream
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    gateway: Arc<Gateway>,
) -> Result<(), IngressError> {
    let stream_id = generate_stream_id();
    let mut sequence: u64 = 0;

    debug!(
        "Accepted ingress connection from {} (stream {})",
        peer_addr, stream_id
    );

    gateway.submit_packet(
        &PacketHeader::new(PacketType::Start, stream_id, sequence),
        &[],
    )?;
    sequence += 1;

    let mut buffer = vec![0u8; gateway.max_data_size()];
    loop {
        match stream.read(&mut buffer).await {
            Ok(0) => {
                debug!("Finished receiving ingress stream {}", stream_id);
                gateway.submit_packet(
                    &PacketHeader::new(PacketType::End, stream_id, sequence),
                    &[],
                )?;
                return Ok(());
            }
            Ok(n) => {
                debug!("Read {} bytes from {} (stream {})", n, peer_addr, stream_id);
                gateway.submit_packet(
                    &PacketHeader::new(PacketType::Data, stream_id, sequence),
                    &buffer[..n],
                )?;
                sequence += 1;
            }
            Err(e) => {
                debug!("Error receiving ingress stream {}: {}", stream_id, e);
                gateway.submit_packet(
                    &PacketHeader::new(PacketType::Error, stream_id, sequence),
                    &[],
                )?;
                return Ok(());
            }
        }
    }
}

/// Fresh random stream id; zero is reserved, so re-roll until non-zero
fn generate_stream_id() -> u64 {
    loop {
        let id = rand::random::<u64>();
        if id != RESERVED_STREAM_ID {
            return id;
        }
    }
}
