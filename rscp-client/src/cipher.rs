//! Chained block cipher session.
//!
//! The power station encrypts the whole TCP stream as one CBC chain per
//! direction. The IV is never reset between frames: after every call it is the
//! last ciphertext block produced (send side) or consumed (receive side).

use crate::error::ClientError;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use bytes::BytesMut;
use std::fmt;

/// Key length expected by the device.
pub const KEY_SIZE: usize = 32;

/// Byte used to pad short keys and to seed both IVs.
pub const SEED_BYTE: u8 = 0xFF;

/// Block cipher chaining primitive.
///
/// Implementations run CBC over `data` in place, starting from `iv`. Callers
/// guarantee `iv.len() == block_size()` and that `data` is block aligned.
pub trait BlockCipher {
    fn block_size(&self) -> usize;

    fn encrypt_blocks(&self, iv: &[u8], data: &mut [u8]);

    fn decrypt_blocks(&self, iv: &[u8], data: &mut [u8]);
}

/// Derives the 32 byte key from the shared AES password.
///
/// Longer passwords are truncated, shorter ones are padded with `0xFF`.
pub fn derive_key(password: &str) -> [u8; KEY_SIZE] {
    let mut key = [SEED_BYTE; KEY_SIZE];
    let bytes = password.as_bytes();
    let len = bytes.len().min(KEY_SIZE);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

/// Rounds `len` up to the next multiple of `block`.
pub fn round_up(len: usize, block: usize) -> usize {
    len.div_ceil(block) * block
}

/// Zero-pads `data` to a multiple of `block`.
pub fn pad_to_block(data: &mut BytesMut, block: usize) {
    let padded = round_up(data.len(), block);
    data.resize(padded, 0);
}

pub(crate) fn xor_in_place(block: &mut [u8], mask: &[u8]) {
    for (b, m) in block.iter_mut().zip(mask) {
        *b ^= m;
    }
}

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-256 in CBC mode.
#[derive(Clone)]
pub struct Aes256Cbc {
    cipher: Aes256,
}

impl Aes256Cbc {
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256::new(GenericArray::from_slice(key)),
        }
    }

    pub fn from_password(password: &str) -> Self {
        Self::new(&derive_key(password))
    }
}

impl fmt::Debug for Aes256Cbc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aes256Cbc").finish_non_exhaustive()
    }
}

impl BlockCipher for Aes256Cbc {
    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn encrypt_blocks(&self, iv: &[u8], data: &mut [u8]) {
        let mut prev = [0u8; AES_BLOCK_SIZE];
        prev.copy_from_slice(iv);
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            xor_in_place(block, &prev);
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
            prev.copy_from_slice(block);
        }
    }

    fn decrypt_blocks(&self, iv: &[u8], data: &mut [u8]) {
        let mut prev = [0u8; AES_BLOCK_SIZE];
        prev.copy_from_slice(iv);
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let mut current = [0u8; AES_BLOCK_SIZE];
            current.copy_from_slice(block);
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
            xor_in_place(block, &prev);
            prev = current;
        }
    }
}

/// Per-connection cipher state: one primitive, independent send and receive IVs.
pub struct ChainedCipher<C> {
    cipher: C,
    send_iv: Vec<u8>,
    recv_iv: Vec<u8>,
}

impl<C: BlockCipher> ChainedCipher<C> {
    /// Creates the state for a fresh connection, both IVs seeded with `0xFF`.
    pub fn new(cipher: C) -> Self {
        let block = cipher.block_size();
        Self {
            cipher,
            send_iv: vec![SEED_BYTE; block],
            recv_iv: vec![SEED_BYTE; block],
        }
    }

    pub fn block_size(&self) -> usize {
        self.cipher.block_size()
    }

    pub fn send_iv(&self) -> &[u8] {
        &self.send_iv
    }

    pub fn recv_iv(&self) -> &[u8] {
        &self.recv_iv
    }

    fn check_aligned(&self, data: &[u8]) -> Result<(), ClientError> {
        let block = self.block_size();
        if data.len() % block != 0 {
            return Err(ClientError::Alignment {
                len: data.len(),
                block,
            });
        }
        Ok(())
    }

    /// Encrypts padded plaintext in place with the send chain.
    pub fn encrypt(&mut self, data: &mut [u8]) -> Result<(), ClientError> {
        self.check_aligned(data)?;
        if data.is_empty() {
            return Ok(());
        }

        self.cipher.encrypt_blocks(&self.send_iv, data);
        let block = self.block_size();
        self.send_iv.copy_from_slice(&data[data.len() - block..]);
        Ok(())
    }

    /// Decrypts aligned ciphertext in place with the receive chain.
    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<(), ClientError> {
        self.check_aligned(data)?;
        if data.is_empty() {
            return Ok(());
        }

        let block = self.block_size();
        let last = data[data.len() - block..].to_vec();
        self.cipher.decrypt_blocks(&self.recv_iv, data);
        self.recv_iv = last;
        Ok(())
    }
}

impl<C> fmt::Debug for ChainedCipher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedCipher")
            .field("block_size", &self.send_iv.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::XorCipher;
    use proptest::prelude::*;

    #[test]
    fn test_derive_key() {
        let key = derive_key("abc");
        assert_eq!(&key[..3], b"abc");
        assert!(key[3..].iter().all(|&b| b == 0xFF));

        let long = "x".repeat(40);
        assert_eq!(derive_key(&long), [b'x'; KEY_SIZE]);
    }

    #[test]
    fn test_pad_to_block() {
        let mut data = BytesMut::from(&[1u8; 33][..]);
        pad_to_block(&mut data, 16);
        assert_eq!(data.len(), 48);
        assert!(data[33..].iter().all(|&b| b == 0));

        let mut aligned = BytesMut::from(&[1u8; 32][..]);
        pad_to_block(&mut aligned, 16);
        assert_eq!(aligned.len(), 32);
    }

    #[test]
    fn test_aes_cbc_known_answer() {
        // NIST SP 800-38A F.2.5, first two blocks
        let key: [u8; 32] =
            hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
                .unwrap()
                .try_into()
                .unwrap();
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let mut data =
            hex::decode("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51")
                .unwrap();

        let cipher = Aes256Cbc::new(&key);
        cipher.encrypt_blocks(&iv, &mut data);
        assert_eq!(
            hex::encode(&data),
            "f58c4c04d6e5f1ba779eabfb5f7bfbd69cfc4e967edb808d679f777bc6702c7d"
        );

        cipher.decrypt_blocks(&iv, &mut data);
        assert_eq!(
            hex::encode(&data),
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51"
        );
    }

    #[test]
    fn test_initial_ivs_seeded() {
        let cipher = ChainedCipher::new(Aes256Cbc::from_password("pw"));
        assert_eq!(cipher.send_iv(), &[0xFF; 16]);
        assert_eq!(cipher.recv_iv(), &[0xFF; 16]);
    }

    #[test]
    fn test_iv_tracks_last_ciphertext_block() {
        let mut sender = ChainedCipher::new(Aes256Cbc::from_password("pw"));
        let mut receiver = ChainedCipher::new(Aes256Cbc::from_password("pw"));

        let mut data = vec![7u8; 48];
        sender.encrypt(&mut data).unwrap();
        assert_eq!(sender.send_iv(), &data[32..]);

        let ciphertext = data.clone();
        receiver.decrypt(&mut data).unwrap();
        assert_eq!(receiver.recv_iv(), &ciphertext[32..]);
        assert_eq!(data, vec![7u8; 48]);
        // Receive chain is independent of the send chain
        assert_eq!(receiver.send_iv(), &[0xFF; 16]);
    }

    #[test]
    fn test_alignment_errors() {
        let mut cipher = ChainedCipher::new(Aes256Cbc::from_password("pw"));
        let mut data = vec![0u8; 17];
        assert!(matches!(
            cipher.encrypt(&mut data),
            Err(ClientError::Alignment { len: 17, block: 16 })
        ));
        assert!(matches!(
            cipher.decrypt(&mut data),
            Err(ClientError::Alignment { len: 17, block: 16 })
        ));
        // Failed calls leave the chains untouched
        assert_eq!(cipher.send_iv(), &[0xFF; 16]);
        assert_eq!(cipher.recv_iv(), &[0xFF; 16]);
    }

    #[test]
    fn test_empty_input_keeps_iv() {
        let mut cipher = ChainedCipher::new(XorCipher::new(0x5A));
        cipher.encrypt(&mut [0u8; 0]).unwrap();
        cipher.decrypt(&mut [0u8; 0]).unwrap();
        assert_eq!(cipher.send_iv(), &[0xFF; 32]);
    }

    #[test]
    fn test_chain_spans_frames() {
        // Two frames sent back to back do not encrypt like two fresh messages
        let mut cipher = ChainedCipher::new(Aes256Cbc::from_password("pw"));
        let mut first = vec![1u8; 16];
        let mut second = vec![1u8; 16];
        cipher.encrypt(&mut first).unwrap();
        cipher.encrypt(&mut second).unwrap();
        assert_ne!(first, second);
    }

    proptest! {
        #[test]
        fn prop_split_encryption_matches_whole(
            blocks in 1usize..8,
            split in 0usize..8,
            seed in any::<u8>(),
        ) {
            let split = split.min(blocks) * AES_BLOCK_SIZE;
            let plaintext: Vec<u8> = (0..blocks * AES_BLOCK_SIZE)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();

            let mut whole = plaintext.clone();
            let mut one = ChainedCipher::new(Aes256Cbc::from_password("secret"));
            one.encrypt(&mut whole).unwrap();

            let mut parts = plaintext.clone();
            let mut two = ChainedCipher::new(Aes256Cbc::from_password("secret"));
            let (head, tail) = parts.split_at_mut(split);
            two.encrypt(head).unwrap();
            two.encrypt(tail).unwrap();

            prop_assert_eq!(&whole, &parts);
            prop_assert_eq!(one.send_iv(), two.send_iv());

            let mut receiver = ChainedCipher::new(Aes256Cbc::from_password("secret"));
            let (head, tail) = parts.split_at_mut(split);
            receiver.decrypt(head).unwrap();
            receiver.decrypt(tail).unwrap();
            prop_assert_eq!(&parts, &plaintext);
            prop_assert_eq!(receiver.recv_iv(), &whole[whole.len() - AES_BLOCK_SIZE..]);
        }
    }
}
