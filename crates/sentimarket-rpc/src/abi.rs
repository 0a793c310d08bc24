//! Minimal Solidity ABI codec
//!
//! Covers what the marketplace contract needs: static words (`uint256`,
//! `address`, `bool`, `bytes32`), dynamic `string` values, function
//! selectors, event topics and `Error(string)` revert payloads.

use alloy_primitives::{keccak256, Address, B256, U256};
use sentimarket_types::MarketError;
use thiserror::Error;

/// Selector of the standard `Error(string)` revert payload
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const WORD: usize = 32;

/// ABI decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("abi data truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("abi value does not fit in {target}")]
    Overflow { target: &'static str },

    #[error("abi string is not valid utf-8")]
    InvalidUtf8,

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl From<AbiError> for MarketError {
    fn from(error: AbiError) -> Self {
        MarketError::rpc("abi", error.to_string())
    }
}

/// A single ABI-encodable value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(U256),
    Address(Address),
    Bool(bool),
    FixedBytes(B256),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Self::String(_))
    }
}

/// First four bytes of the keccak hash of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `topic0` of an event signature
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Calldata for `signature` called with `args`
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend_from_slice(&encode_params(args));
    out
}

/// Encode values using the head/tail layout.
///
/// Dynamic values put an offset word in the head and their payload in the tail.
pub fn encode_params(args: &[Token]) -> Vec<u8> {
    let head_size = args.len() * WORD;
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for arg in args {
        if arg.is_dynamic() {
            head.extend_from_slice(&u256_word(U256::from(head_size + tail.len())));
            if let Token::String(text) = arg {
                tail.extend_from_slice(&encode_dynamic_bytes(text.as_bytes()));
            }
        } else {
            head.extend_from_slice(&static_word(arg));
        }
    }

    head.extend_from_slice(&tail);
    head
}

fn static_word(token: &Token) -> [u8; WORD] {
    match token {
        Token::Uint(value) => u256_word(*value),
        Token::Address(address) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(address.as_slice());
            word
        }
        Token::Bool(flag) => u256_word(U256::from(u8::from(*flag))),
        Token::FixedBytes(bytes) => bytes.0,
        Token::String(_) => [0u8; WORD],
    }
}

fn u256_word(value: U256) -> [u8; WORD] {
    value.to_be_bytes::<WORD>()
}

/// Length word followed by the payload zero-padded to a word boundary
fn encode_dynamic_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD + bytes.len() + WORD);
    out.extend_from_slice(&u256_word(U256::from(bytes.len())));
    out.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

/// Reads head words and dynamic values out of ABI-encoded return data
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], AbiError> {
        let end = offset.checked_add(len).ok_or(AbiError::Overflow { target: "usize" })?;
        self.data.get(offset..end).ok_or(AbiError::Truncated {
            offset,
            needed: len,
            available: self.data.len(),
        })
    }

    /// Raw 32-byte word at head position `index`
    pub fn word(&self, index: usize) -> Result<[u8; WORD], AbiError> {
        let bytes = self.slice(index * WORD, WORD)?;
        let mut word = [0u8; WORD];
        word.copy_from_slice(bytes);
        Ok(word)
    }

    pub fn uint(&self, index: usize) -> Result<U256, AbiError> {
        Ok(U256::from_be_bytes(self.word(index)?))
    }

    pub fn uint_u64(&self, index: usize) -> Result<u64, AbiError> {
        u64::try_from(self.uint(index)?).map_err(|_| AbiError::Overflow { target: "u64" })
    }

    pub fn address(&self, index: usize) -> Result<Address, AbiError> {
        let word = self.word(index)?;
        Ok(Address::from_slice(&word[12..]))
    }

    pub fn bool(&self, index: usize) -> Result<bool, AbiError> {
        Ok(!self.uint(index)?.is_zero())
    }

    pub fn fixed_bytes(&self, index: usize) -> Result<B256, AbiError> {
        Ok(B256::from(self.word(index)?))
    }

    /// Dynamic `string` whose offset word sits at head position `index`
    pub fn string(&self, index: usize) -> Result<String, AbiError> {
        let offset = to_usize(self.uint(index)?)?;
        let len_word = self.slice(offset, WORD)?;
        let len = to_usize(U256::from_be_slice(len_word))?;
        let bytes = self.slice(offset + WORD, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
    }
}

fn to_usize(value: U256) -> Result<usize, AbiError> {
    u64::try_from(value)
        .ok()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or(AbiError::Overflow { target: "usize" })
}

/// Decode the message of an `Error(string)` revert payload
pub fn decode_revert(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    Decoder::new(payload).string(0).ok()
}

/// Decode `0x`-prefixed (or bare) hex
pub fn decode_hex(raw: &str) -> Result<Vec<u8>, AbiError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(body).map_err(|e| AbiError::InvalidHex(e.to_string()))
}

/// Encode bytes as `0x`-prefixed hex
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_values() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(selector("Error(string)"), ERROR_STRING_SELECTOR);
    }

    #[test]
    fn encodes_uint_and_string_with_tail_offset() {
        let data = encode_params(&[
            Token::Uint(U256::from(1u64)),
            Token::String("great product".to_string()),
        ]);
        // head (2 words) + length word + one padded payload word
        assert_eq!(data.len(), 4 * WORD);
        let decoder = Decoder::new(&data);
        assert_eq!(decoder.uint(0).unwrap(), U256::from(1u64));
        assert_eq!(decoder.uint(1).unwrap(), U256::from(64u64));
        assert_eq!(decoder.string(1).unwrap(), "great product");
    }

    #[test]
    fn decodes_agent_tuple() {
        let owner = Address::repeat_byte(0xab);
        let data = encode_params(&[
            Token::Address(owner),
            Token::String("https://example.com/model".to_string()),
            Token::Uint(U256::from(200u64)),
            Token::Bool(true),
        ]);
        let decoder = Decoder::new(&data);
        assert_eq!(decoder.address(0).unwrap(), owner);
        assert_eq!(decoder.string(1).unwrap(), "https://example.com/model");
        assert_eq!(decoder.uint_u64(2).unwrap(), 200);
        assert!(decoder.bool(3).unwrap());
    }

    #[test]
    fn decodes_revert_reason() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend_from_slice(&encode_params(&[Token::String(
            "Insufficient payment".to_string(),
        )]));
        assert_eq!(decode_revert(&data).as_deref(), Some("Insufficient payment"));
        assert_eq!(decode_revert(&[0xde, 0xad]), None);
    }

    #[test]
    fn truncated_data_is_an_error() {
        let decoder = Decoder::new(&[0u8; 16]);
        assert!(matches!(decoder.uint(0), Err(AbiError::Truncated { .. })));
    }

    #[test]
    fn hex_helpers() {
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(encode_hex(&[0xab]), "0xab");
        assert!(decode_hex("0xzz").is_err());
    }
}
