//! Binary codec for command and event frames.
//!
//! Every frame shares one header; all integers are little-endian.
//!
//! ```text
//! offset  size  field
//! 0       4     frame_len       total frame size including this header
//! 4       4     crc32           CRC32 of bytes [8..frame_len]
//! 8       1     version         WIRE_VERSION; 0 is rejected
//! 9       1     tag             command 0x01..=0x03, event 0x81..=0x85
//! 10      8     correlation_id
//! 18      ..    payload         per-tag fixed fields
//! ```
//!
//! Payload fields are fixed width: ids and timestamps are `u64`, statuses
//! are one byte. Decoders read the fields they know and skip whatever
//! follows inside the frame, so a newer encoder may append fields to an
//! existing message without breaking older decoders.

use crate::error::{DecodeError, DecodeResult};
use crate::message::{Command, CommandFrame, Event, EventFrame};
use crate::types::{CorrelationId, Entity, EntityId, OwnerId, Status};
use byteorder::{ByteOrder, LittleEndian};

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 4 + 4 + 1 + 1 + 8; // 18 bytes

/// Version written by this encoder.
pub const WIRE_VERSION: u8 = 1;

/// Tag bytes. Commands and events use disjoint ranges so a frame sent in the
/// wrong direction is rejected instead of misread.
mod tag {
    pub const CREATE: u8 = 0x01;
    pub const UPDATE_STATUS: u8 = 0x02;
    pub const GET: u8 = 0x03;

    pub const CREATED: u8 = 0x81;
    pub const UPDATED: u8 = 0x82;
    pub const INFO: u8 = 0x83;
    pub const NOT_FOUND: u8 = 0x84;
    pub const STATUS_REGRESSED: u8 = 0x85;
}

/// Encode a command frame.
///
/// Encoding is total and deterministic: the same frame always yields the
/// same bytes.
pub fn encode_command(frame: &CommandFrame) -> Vec<u8> {
    match frame.command {
        Command::Create { owner_id } => {
            let mut w = FrameWriter::new(tag::CREATE, frame.correlation_id);
            w.put_u64(owner_id.as_u64());
            w.finish()
        }
        Command::UpdateStatus { entity_id, status } => {
            let mut w = FrameWriter::new(tag::UPDATE_STATUS, frame.correlation_id);
            w.put_u64(entity_id.as_u64());
            w.put_u8(status.as_u8());
            w.finish()
        }
        Command::Get { entity_id } => {
            let mut w = FrameWriter::new(tag::GET, frame.correlation_id);
            w.put_u64(entity_id.as_u64());
            w.finish()
        }
    }
}

/// Decode a command frame.
pub fn decode_command(bytes: &[u8]) -> DecodeResult<CommandFrame> {
    let (tag, correlation_id, mut r) = open_frame(bytes)?;

    let command = match tag {
        tag::CREATE => Command::Create {
            owner_id: OwnerId::new(r.u64("owner_id")?),
        },
        tag::UPDATE_STATUS => Command::UpdateStatus {
            entity_id: EntityId::new(r.u64("entity_id")?),
            status: r.status("status")?,
        },
        tag::GET => Command::Get {
            entity_id: EntityId::new(r.u64("entity_id")?),
        },
        other => {
            return Err(DecodeError::UnknownTag {
                kind: "command",
                tag: other,
            });
        }
    };

    Ok(CommandFrame {
        correlation_id,
        command,
    })
}

/// Encode an event frame.
pub fn encode_event(frame: &EventFrame) -> Vec<u8> {
    let cid = frame.correlation_id;
    match &frame.event {
        Event::Created {
            entity_id,
            owner_id,
            status,
            created_at_ms,
        } => {
            let mut w = FrameWriter::new(tag::CREATED, cid);
            w.put_u64(entity_id.as_u64());
            w.put_u64(owner_id.as_u64());
            w.put_u8(status.as_u8());
            w.put_u64(*created_at_ms);
            w.finish()
        }
        Event::Updated {
            entity_id,
            status,
            updated_at_ms,
        } => {
            let mut w = FrameWriter::new(tag::UPDATED, cid);
            w.put_u64(entity_id.as_u64());
            w.put_u8(status.as_u8());
            w.put_u64(*updated_at_ms);
            w.finish()
        }
        Event::Info { entity } => {
            let mut w = FrameWriter::new(tag::INFO, cid);
            w.put_u64(entity.id.as_u64());
            w.put_u64(entity.owner_id.as_u64());
            w.put_u8(entity.status.as_u8());
            w.put_u64(entity.created_at_ms);
            w.put_u64(entity.updated_at_ms);
            w.finish()
        }
        Event::NotFound { entity_id } => {
            let mut w = FrameWriter::new(tag::NOT_FOUND, cid);
            w.put_u64(entity_id.as_u64());
            w.finish()
        }
        Event::StatusRegressed {
            entity_id,
            current,
            requested,
        } => {
            let mut w = FrameWriter::new(tag::STATUS_REGRESSED, cid);
            w.put_u64(entity_id.as_u64());
            w.put_u8(current.as_u8());
            w.put_u8(requested.as_u8());
            w.finish()
        }
    }
}

/// Decode an event frame.
pub fn decode_event(bytes: &[u8]) -> DecodeResult<EventFrame> {
    let (tag, correlation_id, mut r) = open_frame(bytes)?;

    let event = match tag {
        tag::CREATED => Event::Created {
            entity_id: EntityId::new(r.u64("entity_id")?),
            owner_id: OwnerId::new(r.u64("owner_id")?),
            status: r.status("status")?,
            created_at_ms: r.u64("created_at_ms")?,
        },
        tag::UPDATED => Event::Updated {
            entity_id: EntityId::new(r.u64("entity_id")?),
            status: r.status("status")?,
            updated_at_ms: r.u64("updated_at_ms")?,
        },
        tag::INFO => Event::Info {
            entity: Entity {
                id: EntityId::new(r.u64("entity_id")?),
                owner_id: OwnerId::new(r.u64("owner_id")?),
                status: r.status("status")?,
                created_at_ms: r.u64("created_at_ms")?,
                updated_at_ms: r.u64("updated_at_ms")?,
            },
        },
        tag::NOT_FOUND => Event::NotFound {
            entity_id: EntityId::new(r.u64("entity_id")?),
        },
        tag::STATUS_REGRESSED => Event::StatusRegressed {
            entity_id: EntityId::new(r.u64("entity_id")?),
            current: r.status("current")?,
            requested: r.status("requested")?,
        },
        other => {
            return Err(DecodeError::UnknownTag {
                kind: "event",
                tag: other,
            });
        }
    };

    Ok(EventFrame {
        correlation_id,
        event,
    })
}

/// Length of the first frame in `bytes`, if the length prefix is present.
///
/// Lets a stream reader split concatenated frames without decoding them.
pub fn frame_len(bytes: &[u8]) -> Option<usize> {
    (bytes.len() >= 4).then(|| LittleEndian::read_u32(&bytes[..4]) as usize)
}

/// Validate the header of the first frame in `bytes` and return its tag,
/// correlation id, and a reader positioned at the payload.
fn open_frame(bytes: &[u8]) -> DecodeResult<(u8, CorrelationId, FrameReader<'_>)> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated {
            field: "header",
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let declared = LittleEndian::read_u32(&bytes[0..4]) as usize;
    if declared < HEADER_SIZE || declared > bytes.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            available: bytes.len(),
        });
    }
    let frame = &bytes[..declared];

    let expected = LittleEndian::read_u32(&frame[4..8]);
    let actual = crc32fast::hash(&frame[8..]);
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    let version = frame[8];
    if version == 0 {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let tag = frame[9];
    let correlation_id = CorrelationId::new(LittleEndian::read_u64(&frame[10..18]));

    Ok((tag, correlation_id, FrameReader::new(&frame[HEADER_SIZE..])))
}

/// Appends fixed-width fields after a frame header and seals the frame.
struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    fn new(tag: u8, correlation_id: CorrelationId) -> Self {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 40);
        // frame_len and crc32 are filled in by `finish`.
        buf.extend_from_slice(&[0u8; 8]);
        buf.push(WIRE_VERSION);
        buf.push(tag);
        let mut cid = [0u8; 8];
        LittleEndian::write_u64(&mut cid, correlation_id.as_u64());
        buf.extend_from_slice(&cid);
        Self { buf }
    }

    fn put_u64(&mut self, value: u64) {
        let mut bytes = [0u8; 8];
        LittleEndian::write_u64(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        let crc = crc32fast::hash(&self.buf[8..]);
        LittleEndian::write_u32(&mut self.buf[0..4], len);
        LittleEndian::write_u32(&mut self.buf[4..8], crc);
        self.buf
    }
}

/// Reads fixed-width payload fields, naming the field on failure.
struct FrameReader<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    fn take(&mut self, field: &'static str, needed: usize) -> DecodeResult<&'a [u8]> {
        let available = self.payload.len() - self.pos;
        if available < needed {
            return Err(DecodeError::Truncated {
                field,
                needed,
                available,
            });
        }
        let slice = &self.payload[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn u64(&mut self, field: &'static str) -> DecodeResult<u64> {
        self.take(field, 8).map(LittleEndian::read_u64)
    }

    fn u8(&mut self, field: &'static str) -> DecodeResult<u8> {
        self.take(field, 1).map(|b| b[0])
    }

    fn status(&mut self, field: &'static str) -> DecodeResult<Status> {
        let value = self.u8(field)?;
        let status = Status::from_u8(value);
        if !status.is_valid() {
            return Err(DecodeError::InvalidStatus { field, value });
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u64) -> CorrelationId {
        CorrelationId::new(n)
    }

    /// Append `extra` to the payload of an encoded frame and reseal it, the
    /// way a newer encoder with an added field would.
    fn reseal_with(mut bytes: Vec<u8>, extra: &[u8]) -> Vec<u8> {
        bytes.extend_from_slice(extra);
        let len = bytes.len() as u32;
        let crc = crc32fast::hash(&bytes[8..]);
        LittleEndian::write_u32(&mut bytes[0..4], len);
        LittleEndian::write_u32(&mut bytes[4..8], crc);
        bytes
    }

    #[test]
    fn create_command_layout() {
        let frame = CommandFrame::new(
            cid(9),
            Command::Create {
                owner_id: OwnerId::new(42),
            },
        );
        let bytes = encode_command(&frame);

        assert_eq!(bytes.len(), HEADER_SIZE + 8);
        assert_eq!(frame_len(&bytes), Some(bytes.len()));
        assert_eq!(bytes[8], WIRE_VERSION);
        assert_eq!(bytes[9], tag::CREATE);
        assert_eq!(LittleEndian::read_u64(&bytes[10..18]), 9);
        assert_eq!(LittleEndian::read_u64(&bytes[18..26]), 42);
        assert_eq!(decode_command(&bytes).unwrap(), frame);
    }

    #[test]
    fn encoding_is_deterministic() {
        let frame = CommandFrame::new(
            cid(3),
            Command::UpdateStatus {
                entity_id: EntityId::new(1),
                status: Status::Assembled,
            },
        );
        assert_eq!(encode_command(&frame), encode_command(&frame));
    }

    #[test]
    fn info_event_carries_whole_entity() {
        let entity = Entity {
            id: EntityId::new(5),
            owner_id: OwnerId::new(7),
            status: Status::Sourced,
            created_at_ms: 1_000,
            updated_at_ms: 2_000,
        };
        let frame = EventFrame::new(cid(11), Event::Info { entity });
        let decoded = decode_event(&encode_event(&frame)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn status_regressed_event() {
        let frame = EventFrame::new(
            cid(2),
            Event::StatusRegressed {
                entity_id: EntityId::new(1),
                current: Status::Completed,
                requested: Status::Sourced,
            },
        );
        assert_eq!(decode_event(&encode_event(&frame)).unwrap(), frame);
    }

    #[test]
    fn checksum_detects_corruption() {
        let mut bytes = encode_command(&CommandFrame::new(
            cid(1),
            Command::Get {
                entity_id: EntityId::new(3),
            },
        ));
        bytes[HEADER_SIZE] ^= 0xFF;

        assert!(matches!(
            decode_command(&bytes),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn short_buffer_is_truncated_header() {
        let err = decode_command(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                field: "header",
                needed: HEADER_SIZE,
                available: 3
            }
        );
    }

    #[test]
    fn declared_length_beyond_buffer() {
        let mut bytes = encode_command(&CommandFrame::new(
            cid(1),
            Command::Create {
                owner_id: OwnerId::new(1),
            },
        ));
        LittleEndian::write_u32(&mut bytes[0..4], 500);
        assert!(matches!(
            decode_command(&bytes),
            Err(DecodeError::LengthMismatch { declared: 500, .. })
        ));
    }

    #[test]
    fn missing_payload_field_is_named() {
        // A Create frame sealed with no payload at all.
        let mut w = FrameWriter::new(tag::CREATE, cid(4));
        w.buf.truncate(HEADER_SIZE);
        let bytes = w.finish();

        let err = decode_command(&bytes).unwrap_err();
        assert_eq!(err.field(), Some("owner_id"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut w = FrameWriter::new(tag::UPDATE_STATUS, cid(4));
        w.put_u64(1);
        w.put_u8(Status::Unknown.as_u8());
        let bytes = w.finish();

        assert_eq!(
            decode_command(&bytes).unwrap_err(),
            DecodeError::InvalidStatus {
                field: "status",
                value: 0
            }
        );
    }

    #[test]
    fn event_frame_is_not_a_command() {
        let bytes = encode_event(&EventFrame::new(
            cid(1),
            Event::NotFound {
                entity_id: EntityId::new(999),
            },
        ));
        assert_eq!(
            decode_command(&bytes).unwrap_err(),
            DecodeError::UnknownTag {
                kind: "command",
                tag: tag::NOT_FOUND
            }
        );
    }

    #[test]
    fn trailing_fields_from_newer_encoders_are_ignored() {
        let frame = CommandFrame::new(
            cid(8),
            Command::Create {
                owner_id: OwnerId::new(77),
            },
        );
        let bytes = reseal_with(encode_command(&frame), &[0xAB; 12]);

        assert_eq!(decode_command(&bytes).unwrap(), frame);
    }

    #[test]
    fn newer_version_is_accepted_version_zero_is_not() {
        let frame = CommandFrame::new(
            cid(8),
            Command::Get {
                entity_id: EntityId::new(2),
            },
        );

        let mut bytes = encode_command(&frame);
        bytes[8] = 2;
        let bytes = reseal_with(bytes, &[]);
        assert_eq!(decode_command(&bytes).unwrap(), frame);

        let mut bytes = encode_command(&frame);
        bytes[8] = 0;
        let bytes = reseal_with(bytes, &[]);
        assert_eq!(
            decode_command(&bytes).unwrap_err(),
            DecodeError::UnsupportedVersion(0)
        );
    }

    #[test]
    fn concatenated_frames_split_by_length() {
        let a = encode_event(&EventFrame::new(
            cid(1),
            Event::NotFound {
                entity_id: EntityId::new(1),
            },
        ));
        let b = encode_event(&EventFrame::new(
            cid(2),
            Event::Updated {
                entity_id: EntityId::new(2),
                status: Status::Completed,
                updated_at_ms: 5,
            },
        ));
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let first_len = frame_len(&stream).unwrap();
        assert_eq!(first_len, a.len());
        assert_eq!(decode_event(&stream).unwrap().correlation_id, cid(1));
        assert_eq!(
            decode_event(&stream[first_len..]).unwrap().correlation_id,
            cid(2)
        );
    }
}
