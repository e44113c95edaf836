//! Heartbeat Wire Protocol
//!
//! Fixed-layout heartbeat datagrams exchanged between the pair members:
//! an 8-byte checksummed frame header followed by the payload.
//!
//! Payload layout, all integers little-endian:
//!
//! ```text
//! cluster_id     u32
//! sender_role    u8       (0 = INIT, 1 = ACTIVE, 2 = STANDBY)
//! serial_len     u8       (at most 31)
//! sender_serial  serial_len bytes, UTF-8
//! timestamp      i64      (seconds since epoch)
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::cluster::state::{Role, MAX_SERIAL_LEN};
use crate::error::{Error, Result};

/// One heartbeat, sent every interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatMessage {
    pub cluster_id: u32,
    pub sender_role: Role,
    pub sender_serial: String,
    /// Seconds since the Unix epoch at the sender
    pub timestamp: i64,
}

impl HeartbeatMessage {
    /// Encode the payload
    pub fn encode(&self) -> Vec<u8> {
        let serial = self.sender_serial.as_bytes();
        let serial_len = serial.len().min(MAX_SERIAL_LEN);

        let mut buf = BytesMut::with_capacity(4 + 1 + 1 + serial_len + 8);
        buf.put_u32_le(self.cluster_id);
        buf.put_u8(self.sender_role.as_wire());
        buf.put_u8(serial_len as u8);
        buf.put_slice(&serial[..serial_len]);
        buf.put_i64_le(self.timestamp);
        buf.to_vec()
    }

    /// Decode a payload produced by `encode`
    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.remaining() < 6 {
            return Err(Error::MalformedFrame("payload too short".into()));
        }

        let cluster_id = payload.get_u32_le();
        let sender_role = Role::from_wire(payload.get_u8())?;

        let serial_len = payload.get_u8() as usize;
        if serial_len > MAX_SERIAL_LEN {
            return Err(Error::MalformedFrame(format!(
                "serial length {} exceeds {}",
                serial_len, MAX_SERIAL_LEN
            )));
        }
        if payload.remaining() < serial_len + 8 {
            return Err(Error::MalformedFrame("truncated payload".into()));
        }
        let mut serial_bytes = vec![0u8; serial_len];
        payload.copy_to_slice(&mut serial_bytes);
        let sender_serial = String::from_utf8(serial_bytes)
            .map_err(|_| Error::MalformedFrame("serial is not valid UTF-8".into()))?;

        let timestamp = payload.get_i64_le();
        if payload.has_remaining() {
            return Err(Error::MalformedFrame("trailing bytes after payload".into()));
        }

        Ok(Self {
            cluster_id,
            sender_role,
            sender_serial,
            timestamp,
        })
    }
}

/// Frame header for heartbeat datagrams
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Payload length
    pub length: u32,
    /// Payload checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Create a header for the given payload
    pub fn new(payload: &[u8]) -> Self {
        Self {
            length: payload.len() as u32,
            checksum: crc32fast::hash(payload),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            length: u32::from_le_bytes(bytes[0..4].try_into().expect("header slice")),
            checksum: u32::from_le_bytes(bytes[4..8].try_into().expect("header slice")),
        }
    }
}

/// Encode a full datagram: frame header plus payload
pub fn encode_frame(msg: &HeartbeatMessage) -> Vec<u8> {
    let payload = msg.encode();
    let header = FrameHeader::new(&payload);

    let mut frame = Vec::with_capacity(FrameHeader::SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Decode a datagram produced by `encode_frame`
pub fn decode_frame(frame: &[u8]) -> Result<HeartbeatMessage> {
    if frame.len() < FrameHeader::SIZE {
        return Err(Error::MalformedFrame("datagram shorter than header".into()));
    }

    let mut header_bytes = [0u8; FrameHeader::SIZE];
    header_bytes.copy_from_slice(&frame[..FrameHeader::SIZE]);
    let header = FrameHeader::from_bytes(&header_bytes);

    let payload = &frame[FrameHeader::SIZE..];
    if payload.len() != header.length as usize {
        return Err(Error::MalformedFrame(format!(
            "length mismatch: header says {}, payload is {}",
            header.length,
            payload.len()
        )));
    }

    if crc32fast::hash(payload) != header.checksum {
        return Err(Error::ChecksumMismatch);
    }

    HeartbeatMessage::decode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HeartbeatMessage {
        HeartbeatMessage {
            cluster_id: 7,
            sender_role: Role::Active,
            sender_serial: "FX4720A100".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_payload_round_trip() {
        let msg = sample();
        let restored = HeartbeatMessage::decode(&msg.encode()).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn test_payload_layout() {
        let payload = sample().encode();
        // cluster_id
        assert_eq!(&payload[0..4], &7u32.to_le_bytes());
        // role byte
        assert_eq!(payload[4], 1);
        // serial length prefix
        assert_eq!(payload[5], 10);
        assert_eq!(&payload[6..16], b"FX4720A100");
        // timestamp
        assert_eq!(&payload[16..24], &1_700_000_000i64.to_le_bytes());
        assert_eq!(payload.len(), 24);
    }

    #[test]
    fn test_frame_round_trip() {
        let msg = sample();
        let restored = decode_frame(&encode_frame(&msg)).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn test_negative_timestamp_survives() {
        let msg = HeartbeatMessage {
            timestamp: -1,
            ..sample()
        };
        assert_eq!(decode_frame(&encode_frame(&msg)).unwrap().timestamp, -1);
    }

    #[test]
    fn test_encode_clamps_overlong_serial() {
        let msg = HeartbeatMessage {
            sender_serial: "S".repeat(64),
            ..sample()
        };
        let restored = HeartbeatMessage::decode(&msg.encode()).unwrap();
        assert_eq!(restored.sender_serial.len(), MAX_SERIAL_LEN);
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        assert!(matches!(
            HeartbeatMessage::decode(&[0u8; 5]),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_role_byte() {
        let mut payload = sample().encode();
        payload[4] = 3;
        assert!(matches!(
            HeartbeatMessage::decode(&payload),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_serial_len() {
        let mut payload = sample().encode();
        payload[5] = 32;
        assert!(matches!(
            HeartbeatMessage::decode(&payload),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_serial() {
        let payload = sample().encode();
        assert!(matches!(
            HeartbeatMessage::decode(&payload[..payload.len() - 9]),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut payload = sample().encode();
        payload.push(0);
        assert!(matches!(
            HeartbeatMessage::decode(&payload),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_frame_rejects_corrupted_payload() {
        let mut frame = encode_frame(&sample());
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(matches!(decode_frame(&frame), Err(Error::ChecksumMismatch)));
    }

    #[test]
    fn test_frame_rejects_length_mismatch() {
        let mut frame = encode_frame(&sample());
        frame.truncate(frame.len() - 2);
        assert!(matches!(decode_frame(&frame), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_frame_rejects_runt_datagram() {
        assert!(matches!(
            decode_frame(&[0u8; 4]),
            Err(Error::MalformedFrame(_))
        ));
    }
}
