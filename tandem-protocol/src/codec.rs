//! Record and frame codec
//!
//! Both wire layouts are schema-driven: fixed-width integer fields in
//! network byte order, written and read field by field, never transcribed
//! from an in-memory struct layout. Decode length-checks before
//! interpreting any field; malformed input is classified, not partially
//! read.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frames::{Frame, KIND_EXECUTE, KIND_FOCUS, KIND_PING};
use crate::records::{FileIdentity, Pedigree, Presence, SessionRecord, WindowHandle};

/// Exact encoded size of a session record
pub const SESSION_RECORD_LEN: usize = 68;

/// Frame lengths are rounded up to this alignment so that frames from
/// independent senders concatenate cleanly in one property
pub const FRAME_ALIGN: usize = 8;

/// Frame header: total length (u16) + kind tag (u16)
pub const FRAME_HEADER_LEN: usize = 4;

/// Maximum encoded frame size; command lines are short
const MAX_FRAME_SIZE: usize = 16 * 1024;

const FLAG_OBSCURED: u16 = 1 << 0;
const FLAG_ICONIFIED: u16 = 1 << 1;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("session record of {got} bytes, expected {expected}")]
    BadRecordLength { expected: usize, got: usize },

    #[error("frame length {len} would overrun the batch ({remaining} bytes remaining)")]
    FrameOverrun { len: usize, remaining: usize },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed frame payload: {0}")]
    BadPayload(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ==================== Session record ====================

impl SessionRecord {
    /// Encode to the fixed 68-byte wire layout
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SESSION_RECORD_LEN);

        buf.put_u16(self.version);
        buf.put_u16(self.presence.screen);
        buf.put_u32(self.uid);
        buf.put_u32(self.presence.view.raw());

        let mut flags = 0u16;
        if self.presence.obscured {
            flags |= FLAG_OBSCURED;
        }
        if self.presence.iconified {
            flags |= FLAG_ICONIFIED;
        }
        buf.put_u16(flags);
        buf.put_u16(0); // reserved

        buf.put_u64(self.file.dev);
        buf.put_u64(self.file.ino);
        buf.put_i64(self.file.ctime);
        buf.put_u64(self.file.size);
        buf.put_u32(self.file.host);

        buf.put_u32(self.pedigree.pid);
        buf.put_u32(self.pedigree.pgrp);
        buf.put_u32(self.pedigree.shell_pid);
        buf.put_u32(self.pedigree.shell_pgrp);

        debug_assert_eq!(buf.len(), SESSION_RECORD_LEN);
        buf.freeze()
    }

    /// Decode from a property read. Anything other than exactly
    /// [`SESSION_RECORD_LEN`] bytes is rejected up front; a record written
    /// by a different build of the structure must not be field-guessed.
    pub fn decode(data: &[u8]) -> Result<SessionRecord, CodecError> {
        if data.len() != SESSION_RECORD_LEN {
            return Err(CodecError::BadRecordLength {
                expected: SESSION_RECORD_LEN,
                got: data.len(),
            });
        }

        let mut buf = data;
        let version = buf.get_u16();
        let screen = buf.get_u16();
        let uid = buf.get_u32();
        let view = WindowHandle(buf.get_u32());
        let flags = buf.get_u16();
        let _reserved = buf.get_u16();

        let file = FileIdentity {
            dev: buf.get_u64(),
            ino: buf.get_u64(),
            ctime: buf.get_i64(),
            size: buf.get_u64(),
            host: buf.get_u32(),
        };

        let pedigree = Pedigree {
            pid: buf.get_u32(),
            pgrp: buf.get_u32(),
            shell_pid: buf.get_u32(),
            shell_pgrp: buf.get_u32(),
        };

        Ok(SessionRecord {
            version,
            uid,
            file,
            pedigree,
            presence: Presence {
                screen,
                view,
                obscured: flags & FLAG_OBSCURED != 0,
                iconified: flags & FLAG_ICONIFIED != 0,
            },
        })
    }
}

// ==================== Message frames ====================

/// Codec for message frames on the command channel.
///
/// Encoding appends one aligned, length-prefixed frame; decoding consumes
/// one frame per call and returns `Ok(None)` once the batch is exhausted.
/// A declared length that would walk past the end of the batch is a
/// protocol violation ([`CodecError::FrameOverrun`]); the caller must stop
/// processing that batch.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let mut payload = BytesMut::new();
        match &item {
            Frame::Execute { command } => {
                payload.put_slice(command.as_bytes());
                payload.put_u8(0);
            }
            Frame::Ping {
                reply_window,
                reply_property,
            } => {
                payload.put_u32(reply_window.raw());
                payload.put_slice(reply_property.as_bytes());
                payload.put_u8(0);
            }
            Frame::Focus { prefer_input } => {
                payload.put_u8(*prefer_input as u8);
            }
            Frame::Unknown { .. } => {
                return Err(CodecError::BadPayload("unknown frames are never encoded"));
            }
        }

        let unpadded = FRAME_HEADER_LEN + payload.len();
        let total = unpadded.div_ceil(FRAME_ALIGN) * FRAME_ALIGN;
        if total > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: total,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(total);
        dst.put_u16(total as u16);
        dst.put_u16(item.kind());
        dst.put_slice(&payload);
        dst.put_bytes(0, total - unpadded);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }
        if src.len() < FRAME_HEADER_LEN {
            return Err(CodecError::FrameOverrun {
                len: src.len(),
                remaining: src.len(),
            });
        }

        let total = u16::from_be_bytes([src[0], src[1]]) as usize;
        let kind = u16::from_be_bytes([src[2], src[3]]);

        if total < FRAME_HEADER_LEN || total % FRAME_ALIGN != 0 || total > src.len() {
            return Err(CodecError::FrameOverrun {
                len: total,
                remaining: src.len(),
            });
        }

        let mut body = src.split_to(total);
        body.advance(FRAME_HEADER_LEN);

        let frame = match kind {
            KIND_EXECUTE => Frame::Execute {
                command: read_cstr(&body)?.to_owned(),
            },
            KIND_PING => {
                if body.len() < 4 {
                    return Err(CodecError::BadPayload("ping payload truncated"));
                }
                let reply_window = WindowHandle(body.get_u32());
                Frame::Ping {
                    reply_window,
                    reply_property: read_cstr(&body)?.to_owned(),
                }
            }
            KIND_FOCUS => {
                if body.is_empty() {
                    return Err(CodecError::BadPayload("focus payload truncated"));
                }
                Frame::Focus {
                    prefer_input: body[0] != 0,
                }
            }
            other => Frame::Unknown { kind: other },
        };

        Ok(Some(frame))
    }
}

/// Encode a batch of frames into one contiguous buffer, ready for a
/// single append to a command property
pub fn encode_frames(frames: &[Frame]) -> Result<Bytes, CodecError> {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    for frame in frames {
        codec.encode(frame.clone(), &mut buf)?;
    }
    Ok(buf.freeze())
}

fn read_cstr(data: &[u8]) -> Result<&str, CodecError> {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::BadPayload("missing NUL terminator"))?;
    std::str::from_utf8(&data[..end]).map_err(|_| CodecError::BadPayload("invalid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> SessionRecord {
        SessionRecord {
            version: crate::PROTOCOL_VERSION,
            uid: 1000,
            file: FileIdentity {
                dev: 0x0801,
                ino: 131_072,
                host: 0xfeed_beef,
                ctime: 1_700_000_000,
                size: 8_192,
            },
            pedigree: Pedigree {
                pid: 4242,
                pgrp: 4242,
                shell_pid: 4300,
                shell_pgrp: 4300,
            },
            presence: Presence {
                screen: 1,
                view: WindowHandle(0x1c0_0021),
                obscured: true,
                iconified: false,
            },
        }
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample_record();
        let bytes = record.encode();
        assert_eq!(bytes.len(), SESSION_RECORD_LEN);
        assert_eq!(SessionRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_record_wrong_size_rejected() {
        let bytes = sample_record().encode();
        let err = SessionRecord::decode(&bytes[..SESSION_RECORD_LEN - 1]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::BadRecordLength { expected: SESSION_RECORD_LEN, got } if got == SESSION_RECORD_LEN - 1
        ));
        assert!(SessionRecord::decode(&[]).is_err());

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(SessionRecord::decode(&long).is_err());
    }

    #[test]
    fn test_record_is_network_order() {
        let bytes = sample_record().encode();
        // version is the first field, big-endian
        assert_eq!(
            u16::from_be_bytes([bytes[0], bytes[1]]),
            crate::PROTOCOL_VERSION
        );
    }

    #[test]
    fn test_frame_roundtrip_each_kind() {
        let frames = vec![
            Frame::Execute {
                command: "edit /tmp/notes".into(),
            },
            Frame::Ping {
                reply_window: WindowHandle(0x77),
                reply_property: "TANDEM_REPLY".into(),
            },
            Frame::Focus { prefer_input: true },
            Frame::Focus {
                prefer_input: false,
            },
        ];

        let mut buf = BytesMut::from(&encode_frames(&frames).unwrap()[..]);
        let mut codec = FrameCodec::new();
        let mut decoded = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            decoded.push(frame);
        }
        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_frames_are_aligned() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Frame::Execute {
                    command: "x".into(),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(buf.len() % FRAME_ALIGN, 0);

        // Declared length matches buffer length exactly
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]) as usize, buf.len());
    }

    #[test]
    fn test_batch_preserves_append_order() {
        let frames: Vec<Frame> = (0..5)
            .map(|i| Frame::Execute {
                command: format!("cmd-{}", i),
            })
            .collect();
        let mut buf = BytesMut::from(&encode_frames(&frames).unwrap()[..]);
        let mut codec = FrameCodec::new();
        for expected in &frames {
            assert_eq!(codec.decode(&mut buf).unwrap().as_ref(), Some(expected));
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_overrun_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(64); // declares 64 bytes, batch has 8
        buf.put_u16(KIND_FOCUS);
        buf.put_bytes(0, 4);

        let err = FrameCodec::new().decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            CodecError::FrameOverrun {
                len: 64,
                remaining: 8
            }
        ));
    }

    #[test]
    fn test_unaligned_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(6);
        buf.put_u16(KIND_FOCUS);
        buf.put_bytes(0, 2);
        assert!(matches!(
            FrameCodec::new().decode(&mut buf),
            Err(CodecError::FrameOverrun { .. })
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let mut buf = BytesMut::from(&[0u8, 8][..]);
        assert!(matches!(
            FrameCodec::new().decode(&mut buf),
            Err(CodecError::FrameOverrun { .. })
        ));
    }

    #[test]
    fn test_unknown_kind_is_skipped_not_fatal() {
        let mut buf = BytesMut::new();
        // A well-formed frame of an unrecognized kind, then a real one
        buf.put_u16(8);
        buf.put_u16(999);
        buf.put_bytes(0xab, 4);
        FrameCodec::new()
            .encode(Frame::Focus { prefer_input: true }, &mut buf)
            .unwrap();

        let mut codec = FrameCodec::new();
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Unknown { kind: 999 })
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Focus { prefer_input: true })
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_missing_nul_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(8);
        buf.put_u16(KIND_EXECUTE);
        buf.put_slice(b"abcd"); // no terminator
        assert!(matches!(
            FrameCodec::new().decode(&mut buf),
            Err(CodecError::BadPayload(_))
        ));
    }

    #[test]
    fn test_unknown_frames_never_encoded() {
        let mut buf = BytesMut::new();
        assert!(FrameCodec::new()
            .encode(Frame::Unknown { kind: 7 }, &mut buf)
            .is_err());
    }
}
