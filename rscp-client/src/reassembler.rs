//! Stream reassembler.
//!
//! Turns an arbitrary sequence of transport reads into complete, decrypted,
//! validated frames. Ciphertext is decrypted exactly once, as soon as a whole
//! block is available; the unaligned tail waits in a raw buffer. Frames are
//! parsed from the plaintext buffer and consumed rounded up to the block size,
//! so the cipher padding never reaches the parser twice.

use crate::cipher::{round_up, BlockCipher, ChainedCipher};
use crate::connection::Transport;
use crate::error::ClientError;
use bytes::{Buf, BytesMut};
use rscp_protocol::{Frame, FrameHeader};

/// Receive buffer growth increment.
pub const BUFFER_GROWTH_STEP: usize = 4096;

/// Reassembler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// Waiting for bytes from the transport.
    Receiving,
    /// Parsing and dispatching buffered frames.
    Draining,
    /// A fatal error ended the stream.
    Stopped,
}

/// Growable byte buffer with a hard size limit.
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: BytesMut,
    limit: usize,
}

impl ReceiveBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: BytesMut::new(),
            limit,
        }
    }

    /// Appends bytes, growing in [`BUFFER_GROWTH_STEP`] increments up to the limit.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let needed = self.data.len() + bytes.len();
        if needed > self.limit {
            return Err(ClientError::FrameTooLarge {
                size: needed,
                max: self.limit,
            });
        }
        if needed > self.data.capacity() {
            let target = round_up(needed, BUFFER_GROWTH_STEP).min(self.limit);
            self.data.reserve(target - self.data.len());
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Drops `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        self.data.advance(n);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Frame reassembler for one connection.
#[derive(Debug)]
pub struct Reassembler {
    block_size: usize,
    max_frame_size: usize,
    /// Ciphertext not yet forming a whole block.
    raw: BytesMut,
    /// Decrypted bytes awaiting a complete frame.
    plain: ReceiveBuffer,
    frames: usize,
    state: ReceiveState,
}

impl Reassembler {
    pub fn new(block_size: usize, max_frame_size: usize) -> Self {
        // Room for one padded frame plus an unaligned tail
        let limit = round_up(max_frame_size, block_size) + block_size;
        Self {
            block_size,
            max_frame_size,
            raw: BytesMut::with_capacity(block_size),
            plain: ReceiveBuffer::with_limit(limit),
            frames: 0,
            state: ReceiveState::Receiving,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Total frames dispatched over the life of this reassembler.
    pub fn frames_processed(&self) -> usize {
        self.frames
    }

    /// Bytes of a partial frame still buffered.
    pub fn pending(&self) -> usize {
        self.raw.len() + self.plain.len()
    }

    /// Feeds received ciphertext, dispatching every completed frame to `handler`.
    ///
    /// Returns the number of frames dispatched. Any error stops the reassembler.
    pub fn feed<C, F>(
        &mut self,
        cipher: &mut ChainedCipher<C>,
        bytes: &[u8],
        handler: &mut F,
    ) -> Result<usize, ClientError>
    where
        C: BlockCipher,
        F: FnMut(Frame) -> Result<(), ClientError>,
    {
        if self.state == ReceiveState::Stopped {
            return Err(ClientError::Closed);
        }

        let result = self.feed_chunks(cipher, bytes, handler);
        self.state = match result {
            Ok(_) => ReceiveState::Receiving,
            Err(ref e) => {
                tracing::error!("Receive stream stopped: {}", e);
                ReceiveState::Stopped
            }
        };
        result
    }

    fn feed_chunks<C, F>(
        &mut self,
        cipher: &mut ChainedCipher<C>,
        mut bytes: &[u8],
        handler: &mut F,
    ) -> Result<usize, ClientError>
    where
        C: BlockCipher,
        F: FnMut(Frame) -> Result<(), ClientError>,
    {
        let block = cipher.block_size();
        let mut dispatched = 0;

        while !bytes.is_empty() {
            let room = self.plain.limit().saturating_sub(self.pending());
            if room == 0 {
                return Err(ClientError::FrameTooLarge {
                    size: self.pending() + bytes.len(),
                    max: self.max_frame_size,
                });
            }

            let take = room.min(bytes.len());
            self.raw.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];

            let aligned = self.raw.len() - self.raw.len() % block;
            if aligned > 0 {
                let mut ciphertext = self.raw.split_to(aligned);
                cipher.decrypt(&mut ciphertext)?;
                self.plain.extend(&ciphertext)?;
                tracing::debug!(
                    "Decrypted {} bytes, {} buffered, {} raw",
                    aligned,
                    self.plain.len(),
                    self.raw.len()
                );
            }

            self.state = ReceiveState::Draining;
            dispatched += self.drain(handler)?;
        }

        Ok(dispatched)
    }

    fn drain<F>(&mut self, handler: &mut F) -> Result<usize, ClientError>
    where
        F: FnMut(Frame) -> Result<(), ClientError>,
    {
        let mut dispatched = 0;

        loop {
            let header = match FrameHeader::peek(self.plain.as_slice())? {
                Some(header) => header,
                None => break,
            };
            let frame_len = header.frame_len();
            if frame_len > self.max_frame_size {
                return Err(ClientError::FrameTooLarge {
                    size: frame_len,
                    max: self.max_frame_size,
                });
            }

            let (frame, consumed) = match Frame::parse(self.plain.as_slice())? {
                Some(parsed) => parsed,
                None => break,
            };

            // Plaintext only ever holds whole blocks, so the padding is present
            let padded = round_up(consumed, self.block_size).min(self.plain.len());
            self.plain.consume(padded);
            self.frames += 1;
            dispatched += 1;

            tracing::debug!(
                "Frame {} complete: {} bytes ({} padded), {} values",
                self.frames,
                consumed,
                padded,
                frame.values.len()
            );

            handler(frame)?;
        }

        Ok(dispatched)
    }

    /// Reads from `transport` until at least `min_frames` more frames were
    /// dispatched and no partial frame is pending.
    pub async fn receive<T, C, F>(
        &mut self,
        transport: &mut T,
        cipher: &mut ChainedCipher<C>,
        read_buffer_size: usize,
        min_frames: usize,
        handler: &mut F,
    ) -> Result<usize, ClientError>
    where
        T: Transport,
        C: BlockCipher,
        F: FnMut(Frame) -> Result<(), ClientError>,
    {
        let start = self.frames;
        let mut chunk = vec![0u8; read_buffer_size];

        while self.frames - start < min_frames || self.pending() > 0 {
            if self.state == ReceiveState::Stopped {
                return Err(ClientError::Closed);
            }

            let n = match transport.recv(&mut chunk).await {
                Ok(0) => {
                    tracing::debug!("Peer closed with {} bytes pending", self.pending());
                    self.state = ReceiveState::Stopped;
                    return Err(ClientError::ConnectionClosed);
                }
                Ok(n) => n,
                Err(e) => {
                    self.state = ReceiveState::Stopped;
                    return Err(e);
                }
            };

            self.feed(cipher, &chunk[..n], handler)?;
        }

        Ok(self.frames - start)
    }
}
