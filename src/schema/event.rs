//! Call detail events
//!
//! One event updates exactly one analytics record, the caller's.

use serde::{Deserialize, Serialize};

use super::error::{SchemaError, SchemaResult};

/// A single call detail record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Event {
    pub call_id: u64,
    pub caller_id: u64,
    pub callee_id: u64,
    pub cost: f64,
    pub duration: u32,
    pub long_distance: bool,
    #[serde(default)]
    pub caller_place: u64,
    #[serde(default)]
    pub callee_place: u64,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

impl Event {
    /// Serialized size in bytes
    pub const SIZE: usize = 8 + 8 + 8 + 8 + 4 + 1 + 8 + 8 + 8;

    pub fn new(caller_id: u64, timestamp: i64) -> Self {
        Self {
            caller_id,
            timestamp,
            ..Self::default()
        }
    }

    /// Builder method: set duration and cost
    pub fn call(mut self, duration: u32, cost: f64) -> Self {
        self.duration = duration;
        self.cost = cost;
        self
    }

    /// Builder method: mark as a long distance call
    pub fn long_distance(mut self, long_distance: bool) -> Self {
        self.long_distance = long_distance;
        self
    }

    /// Fixed little-endian layout used by the batch ingest path
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.call_id.to_le_bytes());
        out[8..16].copy_from_slice(&self.caller_id.to_le_bytes());
        out[16..24].copy_from_slice(&self.callee_id.to_le_bytes());
        out[24..32].copy_from_slice(&self.cost.to_le_bytes());
        out[32..36].copy_from_slice(&self.duration.to_le_bytes());
        out[36] = self.long_distance as u8;
        out[37..45].copy_from_slice(&self.caller_place.to_le_bytes());
        out[45..53].copy_from_slice(&self.callee_place.to_le_bytes());
        out[53..61].copy_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> SchemaResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SchemaError::MalformedEvent(format!(
                "expected {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let u64_at = |o: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[o..o + 8]);
            b
        };
        let mut dur = [0u8; 4];
        dur.copy_from_slice(&bytes[32..36]);
        Ok(Self {
            call_id: u64::from_le_bytes(u64_at(0)),
            caller_id: u64::from_le_bytes(u64_at(8)),
            callee_id: u64::from_le_bytes(u64_at(16)),
            cost: f64::from_le_bytes(u64_at(24)),
            duration: u32::from_le_bytes(dur),
            long_distance: bytes[36] != 0,
            caller_place: u64::from_le_bytes(u64_at(37)),
            callee_place: u64::from_le_bytes(u64_at(45)),
            timestamp: i64::from_le_bytes(u64_at(53)),
        })
    }

    /// Decode a concatenation of fixed-size events
    pub fn decode_batch(bytes: &[u8]) -> SchemaResult<Vec<Self>> {
        if bytes.len() % Self::SIZE != 0 {
            return Err(SchemaError::MalformedEvent(format!(
                "batch of {} bytes is not a multiple of {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        bytes.chunks_exact(Self::SIZE).map(Self::from_bytes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_layout() {
        let event = Event {
            call_id: 9,
            caller_id: 42,
            callee_id: 43,
            cost: 1.25,
            duration: 300,
            long_distance: true,
            caller_place: 1,
            callee_place: 2,
            timestamp: 1_325_376_000_000,
        };
        let bytes = event.to_bytes();
        assert_eq!(bytes.len(), 61);
        assert_eq!(bytes[36], 1);
        assert_eq!(Event::from_bytes(&bytes).unwrap(), event);
    }

    #[test]
    fn test_decode_batch_rejects_partial() {
        let mut bytes = Event::new(1, 0).to_bytes().to_vec();
        bytes.extend_from_slice(&Event::new(2, 0).to_bytes());
        assert_eq!(Event::decode_batch(&bytes).unwrap().len(), 2);

        bytes.pop();
        assert!(Event::decode_batch(&bytes).is_err());
    }
}
