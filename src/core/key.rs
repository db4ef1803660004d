// Store-assigned book keys: 12 bytes rendered as 24 lowercase hex chars.
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::error::{Error, ErrorKind};

const KEY_BYTES: usize = 12;
const KEY_HEX_LEN: usize = KEY_BYTES * 2;
const COUNTER_MASK: u32 = 0x00ff_ffff;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BookKey([u8; KEY_BYTES]);

struct KeySeed {
    process: [u8; 5],
    counter: AtomicU32,
}

impl BookKey {
    /// Layout: 4-byte big-endian unix seconds, 5 process-unique random bytes,
    /// 3-byte counter.
    pub fn generate() -> Result<Self, Error> {
        let seed = key_seed()?;
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or_default();
        let counter = seed.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0u8; KEY_BYTES];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&seed.process);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Ok(Self(bytes))
    }

    pub fn parse(input: &str) -> Result<Self, Error> {
        let invalid = || {
            Error::new(ErrorKind::Usage)
                .with_message("invalid book key")
                .with_key(input)
                .with_hint("Book keys are 24 hexadecimal characters.")
        };
        if input.len() != KEY_HEX_LEN || !input.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; KEY_BYTES];
        for (idx, chunk) in input.as_bytes().chunks(2).enumerate() {
            let high = hex_value(chunk[0]).ok_or_else(invalid)?;
            let low = hex_value(chunk[1]).ok_or_else(invalid)?;
            bytes[idx] = (high << 4) | low;
        }
        Ok(Self(bytes))
    }

    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for BookKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BookKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BookKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn key_seed() -> Result<&'static KeySeed, Error> {
    static SEED: OnceLock<KeySeed> = OnceLock::new();
    if let Some(seed) = SEED.get() {
        return Ok(seed);
    }
    let mut random = [0u8; 8];
    getrandom::fill(&mut random).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to gather key randomness")
            .with_source(std::io::Error::other(err.to_string()))
    })?;
    let mut process = [0u8; 5];
    process.copy_from_slice(&random[0..5]);
    let start = u32::from_be_bytes([0, random[5], random[6], random[7]]);
    Ok(SEED.get_or_init(|| KeySeed {
        process,
        counter: AtomicU32::new(start),
    }))
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
