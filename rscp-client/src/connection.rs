//! Transport abstraction and the TCP implementation.

use crate::error::ClientError;
use rscp_protocol::DEFAULT_PORT;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default read chunk size (4 KiB), matching the receive buffer growth step.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Minimum read chunk size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read chunk size (64 KiB).
pub const MAX_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Power station host name or address.
    pub host: String,
    /// RSCP port.
    pub port: u16,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for a single read.
    pub read_timeout: Duration,
    /// Timeout for writing one request.
    pub write_timeout: Duration,
    /// Read chunk size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// `host:port` string accepted by `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Byte transport used by the session.
///
/// `recv` returning `Ok(0)` means the peer closed the connection.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&mut self, data: &[u8]) -> Result<(), ClientError>;

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ClientError>;

    async fn close(&mut self) -> Result<(), ClientError>;
}

/// Transport over any tokio byte stream, with per-operation timeouts.
pub struct StreamTransport<S> {
    stream: Option<S>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl StreamTransport<TcpStream> {
    /// Opens a TCP connection to the power station.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let addr = config.addr();
        tracing::debug!("Connecting to {}...", addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                tracing::warn!("Connection to {} timed out", addr);
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::Io(e)
            })?;

        // Requests are small and strictly request/response
        stream.set_nodelay(true).ok();

        tracing::info!("Connected to {}", addr);
        Ok(Self::new(stream, config))
    }
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S, config: &ConnectionConfig) -> Self {
        Self {
            stream: Some(stream),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> Result<&mut S, ClientError> {
        self.stream.as_mut().ok_or(ClientError::NotConnected)
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn send(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let timeout = self.write_timeout;
        let stream = self.stream_mut()?;

        tokio::time::timeout(timeout, async {
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(|_| {
            tracing::warn!("Write timed out after {:?}", timeout);
            ClientError::Timeout
        })??;

        tracing::debug!("Sent {} bytes", data.len());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ClientError> {
        let timeout = self.read_timeout;
        let stream = self.stream_mut()?;

        let n = tokio::time::timeout(timeout, stream.read(buf))
            .await
            .map_err(|_| {
                tracing::warn!("Read timed out after {:?}", timeout);
                ClientError::Timeout
            })??;

        tracing::debug!("Read {} bytes from socket", n);
        Ok(n)
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Shutting down connection");
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("s10.local");
        assert_eq!(config.port, 5033);
        assert_eq!(config.addr(), "s10.local:5033");
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = ConnectionConfig::new("s10.local").with_read_buffer_size(100); // Below minimum
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::new("s10.local").with_read_buffer_size(10 * 1024 * 1024); // Above maximum
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[tokio::test]
    async fn test_send_and_recv() {
        let mock = Builder::new().write(b"request").read(b"reply").build();
        let mut transport = StreamTransport::new(mock, &ConnectionConfig::new("mock"));

        transport.send(b"request").await.unwrap();
        let mut buf = [0u8; 16];
        let n = transport.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"reply");

        // Script exhausted: peer closed
        assert_eq!(transport.recv(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_error_surfaces_as_io() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut transport = StreamTransport::new(mock, &ConnectionConfig::new("mock"));

        let mut buf = [0u8; 16];
        assert!(matches!(
            transport.recv(&mut buf).await,
            Err(ClientError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let mock = Builder::new().wait(Duration::from_secs(5)).build();
        let config = ConnectionConfig::new("mock").with_read_timeout(Duration::from_millis(20));
        let mut transport = StreamTransport::new(mock, &config);

        let mut buf = [0u8; 16];
        assert!(matches!(
            transport.recv(&mut buf).await,
            Err(ClientError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let mock = Builder::new().build();
        let mut transport = StreamTransport::new(mock, &ConnectionConfig::new("mock"));
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send(b"x").await,
            Err(ClientError::NotConnected)
        ));
        // Closing twice is harmless
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let config = ConnectionConfig::new("127.0.0.1").with_port(port);
        let mut transport = StreamTransport::connect(&config).await.unwrap();
        transport.send(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        let mut read = 0;
        while read < 4 {
            let n = transport.recv(&mut buf[read..]).await.unwrap();
            assert!(n > 0);
            read += n;
        }
        assert_eq!(&buf, b"ping");

        transport.close().await.unwrap();
        server.await.unwrap();
    }
}
