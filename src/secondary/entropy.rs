//! Trained order-0 entropy coder
//!
//! The statistical secondary encoder: a canonical prefix code built from the
//! byte frequencies of the training residue. Every byte value receives one
//! extra count so the whole alphabet stays encodable regardless of what the
//! residue happened to contain. The trained state serializes as a 256-entry
//! code-length table; the payload is framed with a varint original length so
//! decoding can enforce the caller's output cap.

use crate::error::{PbcError, Result};
use crate::varint::VarInt;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Upper bound on canonical code lengths; lengths beyond this are repaired
/// back under the Kraft limit after tree construction
const MAX_CODE_LEN: u8 = 16;

/// Serialized state size: one code length per byte value
const TABLE_BYTES: usize = 256;

/// Canonical order-0 prefix coder with trained code lengths
#[derive(Debug, Clone)]
pub struct EntropyCoder {
    /// Code length per byte value, all in `1..=MAX_CODE_LEN`
    code_lengths: [u8; 256],
    /// Canonical code bits per byte value (MSB-first)
    codes: [u32; 256],
    /// Symbols ordered by (length, value) for canonical decoding
    decode_symbols: [u8; 256],
    /// First canonical code of each length
    first_code: [u32; MAX_CODE_LEN as usize + 1],
    /// Index into `decode_symbols` of the first symbol of each length
    first_index: [usize; MAX_CODE_LEN as usize + 1],
    /// Symbols per length
    count_by_len: [u32; MAX_CODE_LEN as usize + 1],
}

impl EntropyCoder {
    /// Train the coder on the concatenated residue bytes.
    pub fn train(residue: &[u8]) -> Self {
        let mut frequencies = [1u32; 256];
        for &byte in residue {
            frequencies[byte as usize] = frequencies[byte as usize].saturating_add(1);
        }
        let code_lengths = build_code_lengths(&frequencies);
        Self::from_code_lengths(code_lengths)
    }

    /// Rebuild the coder from a serialized code-length table.
    pub fn deserialize(blob: &[u8]) -> Result<Self> {
        if blob.len() < TABLE_BYTES {
            return Err(PbcError::secondary_failed(
                "entropy state shorter than the code-length table",
            ));
        }
        let mut code_lengths = [0u8; 256];
        code_lengths.copy_from_slice(&blob[..TABLE_BYTES]);

        let mut kraft = 0u64;
        for &len in &code_lengths {
            if len == 0 || len > MAX_CODE_LEN {
                return Err(PbcError::secondary_failed(format!(
                    "entropy code length {} out of range",
                    len
                )));
            }
            kraft += 1u64 << (MAX_CODE_LEN - len);
        }
        if kraft > 1u64 << MAX_CODE_LEN {
            return Err(PbcError::secondary_failed(
                "entropy code lengths violate the prefix property",
            ));
        }

        Ok(Self::from_code_lengths(code_lengths))
    }

    /// Serialize the trained state: the raw code-length table.
    pub fn serialize(&self) -> Vec<u8> {
        self.code_lengths.to_vec()
    }

    /// Encode `input`, or decline when the result would not shrink it.
    pub fn encode(&self, input: &[u8]) -> Option<Vec<u8>> {
        if input.is_empty() {
            return None;
        }

        let mut out = Vec::with_capacity(input.len());
        VarInt::write_to_vec(&mut out, input.len() as u32);

        let mut acc = 0u64;
        let mut acc_bits = 0u32;
        for &byte in input {
            let len = self.code_lengths[byte as usize] as u32;
            acc = (acc << len) | self.codes[byte as usize] as u64;
            acc_bits += len;
            while acc_bits >= 8 {
                acc_bits -= 8;
                out.push((acc >> acc_bits) as u8);
                if out.len() >= input.len() {
                    return None;
                }
            }
        }
        if acc_bits > 0 {
            out.push((acc << (8 - acc_bits)) as u8);
        }

        if out.len() < input.len() {
            Some(out)
        } else {
            None
        }
    }

    /// Decode an encoded buffer, bounding the output to `max_out` bytes.
    pub fn decode(&self, input: &[u8], max_out: usize) -> Result<Vec<u8>> {
        let (original_len, header) = VarInt::decode(input)?;
        let original_len = original_len as usize;
        if original_len > max_out {
            return Err(PbcError::decompress_failed(
                "entropy payload exceeds output cap",
            ));
        }

        let mut out = Vec::with_capacity(original_len);
        let mut code = 0u32;
        let mut len = 0u8;
        for &byte in &input[header..] {
            for bit_pos in (0..8).rev() {
                code = (code << 1) | ((byte >> bit_pos) & 1) as u32;
                len += 1;
                if len > MAX_CODE_LEN {
                    return Err(PbcError::decompress_failed("entropy code out of range"));
                }
                let li = len as usize;
                if self.count_by_len[li] > 0 && code.wrapping_sub(self.first_code[li]) < self.count_by_len[li] {
                    let offset = (code - self.first_code[li]) as usize;
                    out.push(self.decode_symbols[self.first_index[li] + offset]);
                    if out.len() == original_len {
                        return Ok(out);
                    }
                    code = 0;
                    len = 0;
                }
            }
        }

        Err(PbcError::decompress_failed("entropy stream truncated"))
    }

    /// Build all encode/decode tables from a validated length table.
    fn from_code_lengths(code_lengths: [u8; 256]) -> Self {
        let mut count_by_len = [0u32; MAX_CODE_LEN as usize + 1];
        for &len in &code_lengths {
            count_by_len[len as usize] += 1;
        }

        // Canonical first codes per length
        let mut first_code = [0u32; MAX_CODE_LEN as usize + 1];
        let mut next_code = [0u32; MAX_CODE_LEN as usize + 1];
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LEN as usize {
            code = (code + count_by_len[len - 1]) << 1;
            first_code[len] = code;
            next_code[len] = code;
        }

        let mut first_index = [0usize; MAX_CODE_LEN as usize + 1];
        let mut index = 0usize;
        for len in 1..=MAX_CODE_LEN as usize {
            first_index[len] = index;
            index += count_by_len[len] as usize;
        }

        let mut codes = [0u32; 256];
        let mut decode_symbols = [0u8; 256];
        let mut fill = first_index;
        for symbol in 0..256usize {
            let len = code_lengths[symbol] as usize;
            codes[symbol] = next_code[len];
            next_code[len] += 1;
            decode_symbols[fill[len]] = symbol as u8;
            fill[len] += 1;
        }

        Self {
            code_lengths,
            codes,
            decode_symbols,
            first_code,
            first_index,
            count_by_len,
        }
    }
}

/// Derive prefix-code lengths from frequencies, limited to `MAX_CODE_LEN`.
fn build_code_lengths(frequencies: &[u32; 256]) -> [u8; 256] {
    #[derive(PartialEq, Eq)]
    struct Node {
        weight: u64,
        symbols: Vec<u8>,
    }
    impl Ord for Node {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.weight
                .cmp(&other.weight)
                .then_with(|| self.symbols.cmp(&other.symbols))
        }
    }
    impl PartialOrd for Node {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut lengths = [0u8; 256];
    let mut heap: BinaryHeap<Reverse<Node>> = (0..256u16)
        .map(|s| {
            Reverse(Node {
                weight: frequencies[s as usize] as u64,
                symbols: vec![s as u8],
            })
        })
        .collect();

    // Each merge deepens every symbol the two nodes contain by one level
    while heap.len() > 1 {
        let Reverse(left) = heap.pop().expect("heap has two nodes");
        let Reverse(right) = heap.pop().expect("heap has two nodes");
        for &s in left.symbols.iter().chain(right.symbols.iter()) {
            lengths[s as usize] = lengths[s as usize].saturating_add(1);
        }
        let mut symbols = left.symbols;
        symbols.extend_from_slice(&right.symbols);
        heap.push(Reverse(Node {
            weight: left.weight + right.weight,
            symbols,
        }));
    }

    // Clamp overlong codes, then restore the Kraft equality by deepening
    // the shallowest remaining codes
    let mut kraft = 0u64;
    for len in lengths.iter_mut() {
        if *len > MAX_CODE_LEN {
            *len = MAX_CODE_LEN;
        }
        kraft += 1u64 << (MAX_CODE_LEN - *len);
    }
    while kraft > 1u64 << MAX_CODE_LEN {
        let symbol = (0..256usize)
            .filter(|&s| lengths[s] < MAX_CODE_LEN)
            .max_by_key(|&s| lengths[s])
            .expect("some code is shorter than the limit");
        kraft -= 1u64 << (MAX_CODE_LEN - lengths[symbol] - 1);
        lengths[symbol] += 1;
    }

    lengths
}
