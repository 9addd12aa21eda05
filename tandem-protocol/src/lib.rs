//! tandem-protocol: wire definitions for view synchronization
//!
//! This crate defines the two binary records exchanged through the shared
//! property store (the per-view session record and the self-delimiting
//! message frame), the well-known property names they live under, and the
//! codec that moves them to and from bytes in network byte order.

pub mod codec;
pub mod frames;
pub mod props;
pub mod records;

// Re-export main types at crate root
pub use codec::{CodecError, FrameCodec, FRAME_ALIGN, FRAME_HEADER_LEN, SESSION_RECORD_LEN};
pub use frames::Frame;
pub use records::{FileIdentity, Pedigree, Presence, SessionRecord, WindowHandle};

/// Current protocol version
pub const PROTOCOL_VERSION: u16 = 2;

/// First protocol version whose file identity is matched on
/// inode + creation time + size; records below this version fall back to
/// the legacy dev + inode + host rule.
pub const PROTOCOL_VERSION_IDENTITY: u16 = 2;
