//! Message frame types
//!
//! A frame is one self-length-delimited message inside a peer's command
//! property. A property may hold any number of concatenated frames; a
//! reader consumes frames until the declared byte length is exhausted,
//! never relying on a trailing terminator.

use crate::records::WindowHandle;

/// Wire kind tags
pub const KIND_EXECUTE: u16 = 1;
pub const KIND_PING: u16 = 2;
pub const KIND_FOCUS: u16 = 3;

/// One message on the command channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Hand a command line to the receiver's interpreter as if typed
    Execute { command: String },
    /// Ask the receiver to append its own window handle to
    /// `reply_property` on `reply_window`, so the sender learns who
    /// actually answered
    Ping {
        reply_window: WindowHandle,
        reply_property: String,
    },
    /// Ask the receiver to take local input focus, optionally on its
    /// input-oriented sub-view rather than the main view
    Focus { prefer_input: bool },
    /// A kind this build does not understand. Carried so the receiver can
    /// log it and schedule a full redraw instead of crashing; never encoded.
    Unknown { kind: u16 },
}

impl Frame {
    /// Wire kind tag of this frame
    pub fn kind(&self) -> u16 {
        match self {
            Frame::Execute { .. } => KIND_EXECUTE,
            Frame::Ping { .. } => KIND_PING,
            Frame::Focus { .. } => KIND_FOCUS,
            Frame::Unknown { kind } => *kind,
        }
    }
}
