//! Rijndael with a 256 bit block, as used by the power station.
//!
//! AES fixes the Rijndael block at 128 bits; the device runs the original
//! cipher with 32 byte blocks and a 32 byte key. The round function is the
//! shared Rijndael one, parameterised by the number of state columns, so the
//! 4-column instance is plain AES-256.

use crate::cipher::{derive_key, xor_in_place, BlockCipher, KEY_SIZE};
use std::fmt;

/// Block size of the device cipher in bytes.
pub const RIJNDAEL_BLOCK_SIZE: usize = 32;

/// Key length in 32 bit words.
const KEY_WORDS: usize = KEY_SIZE / 4;

const fn xtime(a: u8) -> u8 {
    (a << 1) ^ if a & 0x80 != 0 { 0x1B } else { 0 }
}

const fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut r = 0;
    while b != 0 {
        if b & 1 != 0 {
            r ^= a;
        }
        a = xtime(a);
        b >>= 1;
    }
    r
}

/// S-box from the multiplicative inverse and the affine map, walking GF(2^8)
/// with generator 3.
const fn build_sbox() -> [u8; 256] {
    let mut sbox = [0u8; 256];
    let mut p: u8 = 1;
    let mut q: u8 = 1;
    loop {
        // p *= 3
        p ^= (p << 1) ^ if p & 0x80 != 0 { 0x1B } else { 0 };
        // q /= 3
        q ^= q << 1;
        q ^= q << 2;
        q ^= q << 4;
        if q & 0x80 != 0 {
            q ^= 0x09;
        }
        let x = q ^ q.rotate_left(1) ^ q.rotate_left(2) ^ q.rotate_left(3) ^ q.rotate_left(4);
        sbox[p as usize] = x ^ 0x63;
        if p == 1 {
            break;
        }
    }
    sbox[0] = 0x63;
    sbox
}

const fn invert(sbox: &[u8; 256]) -> [u8; 256] {
    let mut inv = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        inv[sbox[i] as usize] = i as u8;
        i += 1;
    }
    inv
}

const SBOX: [u8; 256] = build_sbox();
const INV_SBOX: [u8; 256] = invert(&SBOX);

/// Rijndael with a 256 bit key and `columns` state columns (4 or 8).
#[derive(Clone)]
struct Rijndael {
    columns: usize,
    rounds: usize,
    shifts: [usize; 4],
    round_keys: Vec<u8>,
}

impl Rijndael {
    fn new(key: &[u8; KEY_SIZE], columns: usize) -> Self {
        debug_assert!(columns == 4 || columns == 8);
        let rounds = KEY_WORDS.max(columns) + 6;
        let shifts = if columns == 8 { [0, 1, 3, 4] } else { [0, 1, 2, 3] };

        let words = columns * (rounds + 1);
        let mut round_keys = vec![0u8; words * 4];
        round_keys[..KEY_SIZE].copy_from_slice(key);

        let mut rcon = 1u8;
        for i in KEY_WORDS..words {
            let mut t = [0u8; 4];
            t.copy_from_slice(&round_keys[(i - 1) * 4..i * 4]);
            if i % KEY_WORDS == 0 {
                t.rotate_left(1);
                for b in t.iter_mut() {
                    *b = SBOX[*b as usize];
                }
                t[0] ^= rcon;
                rcon = xtime(rcon);
            } else if i % KEY_WORDS == 4 {
                for b in t.iter_mut() {
                    *b = SBOX[*b as usize];
                }
            }
            for (j, b) in t.iter().enumerate() {
                round_keys[i * 4 + j] = round_keys[(i - KEY_WORDS) * 4 + j] ^ b;
            }
        }

        Self {
            columns,
            rounds,
            shifts,
            round_keys,
        }
    }

    fn block_size(&self) -> usize {
        self.columns * 4
    }

    fn add_round_key(&self, state: &mut [u8], round: usize) {
        let size = self.block_size();
        xor_in_place(state, &self.round_keys[round * size..(round + 1) * size]);
    }

    fn shift_rows(&self, state: &mut [u8]) {
        let mut tmp = [0u8; RIJNDAEL_BLOCK_SIZE];
        tmp[..state.len()].copy_from_slice(state);
        for r in 1..4 {
            for c in 0..self.columns {
                state[4 * c + r] = tmp[4 * ((c + self.shifts[r]) % self.columns) + r];
            }
        }
    }

    fn inv_shift_rows(&self, state: &mut [u8]) {
        let mut tmp = [0u8; RIJNDAEL_BLOCK_SIZE];
        tmp[..state.len()].copy_from_slice(state);
        for r in 1..4 {
            for c in 0..self.columns {
                state[4 * ((c + self.shifts[r]) % self.columns) + r] = tmp[4 * c + r];
            }
        }
    }

    fn encrypt_block(&self, state: &mut [u8]) {
        self.add_round_key(state, 0);
        for round in 1..=self.rounds {
            for b in state.iter_mut() {
                *b = SBOX[*b as usize];
            }
            self.shift_rows(state);
            if round != self.rounds {
                for col in state.chunks_exact_mut(4) {
                    let a = [col[0], col[1], col[2], col[3]];
                    for r in 0..4 {
                        col[r] = gf_mul(a[r], 2) ^ gf_mul(a[(r + 1) % 4], 3) ^ a[(r + 2) % 4] ^ a[(r + 3) % 4];
                    }
                }
            }
            self.add_round_key(state, round);
        }
    }

    fn decrypt_block(&self, state: &mut [u8]) {
        self.add_round_key(state, self.rounds);
        for round in (0..self.rounds).rev() {
            self.inv_shift_rows(state);
            for b in state.iter_mut() {
                *b = INV_SBOX[*b as usize];
            }
            self.add_round_key(state, round);
            if round != 0 {
                for col in state.chunks_exact_mut(4) {
                    let a = [col[0], col[1], col[2], col[3]];
                    for r in 0..4 {
                        col[r] = gf_mul(a[r], 14)
                            ^ gf_mul(a[(r + 1) % 4], 11)
                            ^ gf_mul(a[(r + 2) % 4], 13)
                            ^ gf_mul(a[(r + 3) % 4], 9);
                    }
                }
            }
        }
    }
}

/// Rijndael-256/256 in CBC mode, the device's stream cipher.
#[derive(Clone)]
pub struct Rijndael256Cbc {
    cipher: Rijndael,
}

impl Rijndael256Cbc {
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Rijndael::new(key, RIJNDAEL_BLOCK_SIZE / 4),
        }
    }

    pub fn from_password(password: &str) -> Self {
        Self::new(&derive_key(password))
    }
}

impl fmt::Debug for Rijndael256Cbc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rijndael256Cbc").finish_non_exhaustive()
    }
}

impl BlockCipher for Rijndael256Cbc {
    fn block_size(&self) -> usize {
        RIJNDAEL_BLOCK_SIZE
    }

    fn encrypt_blocks(&self, iv: &[u8], data: &mut [u8]) {
        let mut prev = [0u8; RIJNDAEL_BLOCK_SIZE];
        prev.copy_from_slice(iv);
        for block in data.chunks_exact_mut(RIJNDAEL_BLOCK_SIZE) {
            xor_in_place(block, &prev);
            self.cipher.encrypt_block(block);
            prev.copy_from_slice(block);
        }
    }

    fn decrypt_blocks(&self, iv: &[u8], data: &mut [u8]) {
        let mut prev = [0u8; RIJNDAEL_BLOCK_SIZE];
        prev.copy_from_slice(iv);
        for block in data.chunks_exact_mut(RIJNDAEL_BLOCK_SIZE) {
            let mut current = [0u8; RIJNDAEL_BLOCK_SIZE];
            current.copy_from_slice(block);
            self.cipher.decrypt_block(block);
            xor_in_place(block, &prev);
            prev = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::ChainedCipher;
    use aes::cipher::generic_array::GenericArray;
    use aes::cipher::{BlockEncrypt, KeyInit};
    use proptest::prelude::*;

    fn key(hex_key: &str) -> [u8; KEY_SIZE] {
        hex::decode(hex_key).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_sbox() {
        assert_eq!(SBOX[0x00], 0x63);
        assert_eq!(SBOX[0x01], 0x7C);
        assert_eq!(SBOX[0x53], 0xED);
        assert_eq!(SBOX[0xFF], 0x16);
        assert!((0..=255u8).all(|b| INV_SBOX[SBOX[b as usize] as usize] == b));
    }

    #[test]
    fn test_four_columns_is_aes256() {
        // FIPS-197 C.3
        let cipher = Rijndael::new(
            &key("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"),
            4,
        );
        let mut block = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        cipher.encrypt_block(&mut block);
        assert_eq!(hex::encode(&block), "8ea2b7ca516745bfeafc49904b496089");

        cipher.decrypt_block(&mut block);
        assert_eq!(hex::encode(&block), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn test_256_bit_block_known_answer() {
        let cipher = Rijndael::new(&[0u8; KEY_SIZE], 8);
        let mut block = [0u8; RIJNDAEL_BLOCK_SIZE];
        cipher.encrypt_block(&mut block);
        assert_eq!(
            hex::encode(block),
            "c6227e7740b7e53b5cb77865278eab0726f62366d9aabad908936123a1fc8af3"
        );

        let cipher = Rijndael::new(
            &key("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"),
            8,
        );
        let mut block: Vec<u8> = (0..32).collect();
        cipher.encrypt_block(&mut block);
        assert_eq!(
            hex::encode(&block),
            "623d2bd4ca3796dc3d02ecf2f37fb637fd3da58509cebb67ab9265b04db51e7d"
        );
        cipher.decrypt_block(&mut block);
        assert_eq!(block, (0..32).collect::<Vec<u8>>());
    }

    #[test]
    fn test_device_chain_known_answer() {
        let mut sender = ChainedCipher::new(Rijndael256Cbc::from_password("secret"));
        assert_eq!(sender.block_size(), 32);

        let mut data: Vec<u8> = (0..64).collect();
        sender.encrypt(&mut data).unwrap();
        assert_eq!(
            hex::encode(&data),
            "80ec1a1ca14ea2bbeb516a8e52da513193f867e1f6619535d0fc848c125baf99\
             d88a21cb94347077acf95470bf969f186495c796fbf6d45ba2cf3223f4cc7242"
        );

        let mut receiver = ChainedCipher::new(Rijndael256Cbc::from_password("secret"));
        receiver.decrypt(&mut data[..32]).unwrap();
        receiver.decrypt(&mut data[32..]).unwrap();
        assert_eq!(data, (0..64).collect::<Vec<u8>>());
    }

    proptest! {
        #[test]
        fn prop_four_columns_match_aes(
            key_bytes in prop::array::uniform32(any::<u8>()),
            block in prop::array::uniform16(any::<u8>()),
        ) {
            let mut ours = block;
            Rijndael::new(&key_bytes, 4).encrypt_block(&mut ours);

            let mut theirs = GenericArray::clone_from_slice(&block);
            aes::Aes256::new(GenericArray::from_slice(&key_bytes)).encrypt_block(&mut theirs);

            prop_assert_eq!(&ours[..], theirs.as_slice());
        }

        #[test]
        fn prop_256_bit_block_roundtrip(
            key_bytes in prop::array::uniform32(any::<u8>()),
            block in prop::array::uniform32(any::<u8>()),
        ) {
            let cipher = Rijndael::new(&key_bytes, 8);
            let mut data = block;
            cipher.encrypt_block(&mut data);
            prop_assert_ne!(data, block);
            cipher.decrypt_block(&mut data);
            prop_assert_eq!(data, block);
        }
    }
}
