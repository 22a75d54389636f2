//! Authenticate-then-request session loop.

use crate::cipher::{pad_to_block, BlockCipher, ChainedCipher};
use crate::connection::{
    Transport, DEFAULT_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE, MIN_READ_BUFFER_SIZE,
};
use crate::error::ClientError;
use crate::reassembler::Reassembler;
use crate::report::ReportSink;
use crate::request::{authentication_request, DataRequest};
use crate::router::Router;
use rscp_protocol::{Frame, Tlv, MAX_FRAME_SIZE};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// Terminal. The cipher chain is lost; reconnect with a new session.
    Closed,
}

/// Portal credentials sent in the authentication request.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Append a CRC-32 to request frames.
    pub with_crc: bool,
    /// Upper bound of request/response round trips per run.
    pub max_cycles: usize,
    /// Pause between round trips.
    pub cycle_interval: Duration,
    /// Largest response frame accepted.
    pub max_frame_size: usize,
    /// Transport read chunk size.
    pub read_buffer_size: usize,
    /// Frames expected per response.
    pub frames_per_response: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            with_crc: true,
            max_cycles: 2,
            cycle_interval: Duration::from_secs(1),
            max_frame_size: MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            frames_per_response: 1,
        }
    }
}

impl SessionOptions {
    pub fn with_crc(mut self, with_crc: bool) -> Self {
        self.with_crc = with_crc;
        self
    }

    pub fn with_max_cycles(mut self, cycles: usize) -> Self {
        self.max_cycles = cycles;
        self
    }

    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.min(MAX_FRAME_SIZE);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// Outcome of [`Session::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles: usize,
    pub frames: usize,
    pub authenticated: bool,
    pub access_level: Option<u8>,
}

/// One connection to the power station.
pub struct Session<T, C> {
    transport: T,
    cipher: ChainedCipher<C>,
    reassembler: Reassembler,
    router: Router,
    credentials: Credentials,
    options: SessionOptions,
    state: SessionState,
}

impl<T, C> Session<T, C>
where
    T: Transport,
    C: BlockCipher,
{
    pub fn new(transport: T, cipher: C, credentials: Credentials, options: SessionOptions) -> Self {
        let cipher = ChainedCipher::new(cipher);
        let reassembler = Reassembler::new(cipher.block_size(), options.max_frame_size);
        Self {
            transport,
            cipher,
            reassembler,
            router: Router::new(),
            credentials,
            options,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs up to `max_cycles` round trips: authentication first, then `request`.
    ///
    /// A rejected authentication (level 0) is retried on the next cycle.
    pub async fn run<S>(
        &mut self,
        request: &DataRequest,
        sink: &mut S,
    ) -> Result<RunSummary, ClientError>
    where
        S: ReportSink + ?Sized,
    {
        self.router.set_history(request.history);
        let mut summary = RunSummary::default();

        for cycle in 0..self.options.max_cycles {
            if cycle > 0 && !self.options.cycle_interval.is_zero() {
                tokio::time::sleep(self.options.cycle_interval).await;
            }

            let tree = match self.state {
                SessionState::Unauthenticated => {
                    tracing::info!("Generating authentication request");
                    authentication_request(&self.credentials.user, &self.credentials.password)
                }
                SessionState::Authenticated => {
                    tracing::info!("Generating data request");
                    request.to_tlv()
                }
                SessionState::Closed => break,
            };

            summary.frames += self.round_trip(&tree, sink).await?;
            summary.cycles += 1;
        }

        summary.authenticated = self.state == SessionState::Authenticated;
        summary.access_level = self.router.access_level();
        Ok(summary)
    }

    /// Sends one request tree and routes every response frame.
    ///
    /// Any error closes the session.
    pub async fn round_trip<S>(&mut self, request: &Tlv, sink: &mut S) -> Result<usize, ClientError>
    where
        S: ReportSink + ?Sized,
    {
        if self.state == SessionState::Closed {
            return Err(ClientError::Closed);
        }

        match self.exchange(request, sink).await {
            Ok(frames) => Ok(frames),
            Err(e) => {
                if e.is_corrupt_stream() {
                    tracing::error!("Corrupt response stream, closing session: {}", e);
                } else {
                    tracing::error!("Round trip failed, closing session: {}", e);
                }
                self.state = SessionState::Closed;
                if let Err(close_err) = self.transport.close().await {
                    tracing::debug!("Close after failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn exchange<S>(&mut self, request: &Tlv, sink: &mut S) -> Result<usize, ClientError>
    where
        S: ReportSink + ?Sized,
    {
        let mut bytes = Frame::build(request, self.options.with_crc)?;
        pad_to_block(&mut bytes, self.cipher.block_size());
        tracing::trace!("Request frame: {}", hex::encode(&bytes));

        self.cipher.encrypt(&mut bytes)?;
        self.transport.send(&bytes).await?;

        let router = &mut self.router;
        let mut handler = |frame: Frame| router.route_frame(frame, sink);
        let frames = self
            .reassembler
            .receive(
                &mut self.transport,
                &mut self.cipher,
                self.options.read_buffer_size,
                self.options.frames_per_response,
                &mut handler,
            )
            .await?;

        if self.state == SessionState::Unauthenticated && self.router.is_authenticated() {
            tracing::info!("Authenticated");
            self.state = SessionState::Authenticated;
        }
        Ok(frames)
    }

    /// Closes the transport. The session cannot be reused.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.state = SessionState::Closed;
        self.transport.close().await
    }
}
