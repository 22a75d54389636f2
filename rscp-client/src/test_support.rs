//! In-memory peers for unit tests.

use crate::cipher::{pad_to_block, BlockCipher, ChainedCipher};
use crate::connection::Transport;
use crate::error::ClientError;
use rscp_protocol::{Frame, Tlv};
use std::collections::VecDeque;

/// CBC over a one-byte XOR "block cipher" with 32 byte blocks.
///
/// Trivially weak, but it chains exactly like the device cipher and has the
/// device's block width.
#[derive(Debug, Clone)]
pub struct XorCipher {
    key: u8,
}

impl XorCipher {
    pub const BLOCK_SIZE: usize = 32;

    pub fn new(key: u8) -> Self {
        Self { key }
    }
}

impl BlockCipher for XorCipher {
    fn block_size(&self) -> usize {
        Self::BLOCK_SIZE
    }

    fn encrypt_blocks(&self, iv: &[u8], data: &mut [u8]) {
        let mut prev = iv.to_vec();
        for block in data.chunks_exact_mut(Self::BLOCK_SIZE) {
            for (b, p) in block.iter_mut().zip(&prev) {
                *b ^= p ^ self.key;
            }
            prev.copy_from_slice(block);
        }
    }

    fn decrypt_blocks(&self, iv: &[u8], data: &mut [u8]) {
        let mut prev = iv.to_vec();
        for block in data.chunks_exact_mut(Self::BLOCK_SIZE) {
            let current = block.to_vec();
            for (b, p) in block.iter_mut().zip(&prev) {
                *b ^= p ^ self.key;
            }
            prev = current;
        }
    }
}

/// Serializes, pads and encrypts one frame the way the peer does.
pub fn encrypt_frame<C: BlockCipher>(cipher: &mut ChainedCipher<C>, root: &Tlv) -> Vec<u8> {
    let mut bytes = Frame::build(root, true).unwrap();
    pad_to_block(&mut bytes, cipher.block_size());
    cipher.encrypt(&mut bytes).unwrap();
    bytes.to_vec()
}

/// Decrypts and parses every frame in a request written by the client.
pub fn decrypt_frames<C: BlockCipher>(cipher: &mut ChainedCipher<C>, sent: &[u8]) -> Vec<Frame> {
    let mut plain = sent.to_vec();
    cipher.decrypt(&mut plain).unwrap();

    let block = cipher.block_size();
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < plain.len() {
        let (frame, consumed) = Frame::parse(&plain[offset..]).unwrap().unwrap();
        offset += crate::cipher::round_up(consumed, block);
        frames.push(frame);
    }
    frames
}

/// One scripted outcome of [`Transport::recv`].
#[derive(Debug)]
pub enum ScriptedRead {
    Data(Vec<u8>),
    Timeout,
}

/// Transport replaying a fixed list of reads and recording every write.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    reads: VecDeque<ScriptedRead>,
    pub sent: Vec<Vec<u8>>,
    pub closed: bool,
}

impl ScriptedTransport {
    pub fn new(reads: Vec<Vec<u8>>) -> Self {
        Self {
            reads: reads.into_iter().map(ScriptedRead::Data).collect(),
            sent: Vec::new(),
            closed: false,
        }
    }

    /// Queues a read that fails the way an elapsed read deadline does.
    pub fn push_timeout(&mut self) {
        self.reads.push_back(ScriptedRead::Timeout);
    }
}

impl Transport for ScriptedTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::NotConnected);
        }
        self.sent.push(data.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ClientError> {
        if self.closed {
            return Err(ClientError::NotConnected);
        }
        let mut next = match self.reads.pop_front() {
            None => return Ok(0),
            Some(ScriptedRead::Timeout) => return Err(ClientError::Timeout),
            Some(ScriptedRead::Data(bytes)) => bytes,
        };
        let n = next.len().min(buf.len());
        buf[..n].copy_from_slice(&next[..n]);
        if n < next.len() {
            self.reads.push_front(ScriptedRead::Data(next.split_off(n)));
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.closed = true;
        Ok(())
    }
}
