//! Finalized log container.
//!
//! Layout (little-endian):
//! - magic `FTLG` (4 bytes), version (u16), flags (u16), message count (u32)
//! - one `(offset u32, length u32)` entry per message, offsets relative to the
//!   payload start
//! - payload: the JSON encoded [`PoseMessage`]s back to back
//! - CRC-32 (IEEE) over everything before it

use std::path::Path;

use super::{MessageSpan, PoseMessage};
use crate::{Result, TrackerError};

pub const LOG_MAGIC: [u8; 4] = *b"FTLG";
pub const LOG_VERSION: u16 = 1;

const HEADER_LEN: usize = 12;
const ENTRY_LEN: usize = 8;
const CRC_LEN: usize = 4;

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        let idx = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[idx];
    }
    crc ^ 0xFFFF_FFFF
}

pub(crate) fn finish(payload: &[u8], spans: &[MessageSpan]) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(HEADER_LEN + spans.len() * ENTRY_LEN + payload.len() + CRC_LEN);
    out.extend_from_slice(&LOG_MAGIC);
    out.extend_from_slice(&LOG_VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    // Buffers refuse appends past u32 offsets, so the count fits as well.
    out.extend_from_slice(&(spans.len() as u32).to_le_bytes());
    for span in spans {
        out.extend_from_slice(&span.offset.to_le_bytes());
        out.extend_from_slice(&span.len.to_le_bytes());
    }
    out.extend_from_slice(payload);
    let crc = crc32(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Verified view over a log container.
#[derive(Debug, Clone, Copy)]
pub struct LogReader<'a> {
    table: &'a [u8],
    payload: &'a [u8],
    count: usize,
}

impl<'a> LogReader<'a> {
    /// Checks framing, every message span and the checksum.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + CRC_LEN {
            return Err(TrackerError::container("log is shorter than its header"));
        }
        if bytes[..4] != LOG_MAGIC {
            return Err(TrackerError::container("missing log file identifier"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != LOG_VERSION {
            return Err(TrackerError::container(format!(
                "unsupported log version {version}"
            )));
        }

        let body_len = bytes.len() - CRC_LEN;
        let expected = read_u32(bytes, body_len);
        let actual = crc32(&bytes[..body_len]);
        if expected != actual {
            return Err(TrackerError::container(format!(
                "checksum mismatch (stored {expected:#010x}, computed {actual:#010x})"
            )));
        }

        let count = read_u32(bytes, 8) as usize;
        let table_end = count
            .checked_mul(ENTRY_LEN)
            .and_then(|len| len.checked_add(HEADER_LEN))
            .filter(|&end| end <= body_len)
            .ok_or_else(|| TrackerError::container("message table overruns the log"))?;

        let reader = Self {
            table: &bytes[HEADER_LEN..table_end],
            payload: &bytes[table_end..body_len],
            count,
        };
        for index in 0..count {
            reader.span(index)?;
        }
        Ok(reader)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn span(&self, index: usize) -> Result<&'a [u8]> {
        let at = index * ENTRY_LEN;
        let offset = read_u32(self.table, at) as usize;
        let len = read_u32(self.table, at + 4) as usize;
        offset
            .checked_add(len)
            .and_then(|end| self.payload.get(offset..end))
            .ok_or_else(|| {
                TrackerError::container(format!("message {index} lies outside the payload"))
            })
    }

    /// Decodes message `index`.
    pub fn message(&self, index: usize) -> Result<PoseMessage> {
        if index >= self.count {
            return Err(TrackerError::container(format!(
                "message {index} out of range (log holds {})",
                self.count
            )));
        }
        Ok(serde_json::from_slice(self.span(index)?)?)
    }

    pub fn messages(&self) -> impl Iterator<Item = Result<PoseMessage>> + '_ {
        (0..self.count).map(move |index| self.message(index))
    }
}

/// Reads and verifies a saved log, decoding every message.
pub fn read_log_file(path: impl AsRef<Path>) -> Result<Vec<PoseMessage>> {
    let bytes = std::fs::read(path)?;
    let reader = LogReader::new(&bytes)?;
    reader.messages().collect()
}
