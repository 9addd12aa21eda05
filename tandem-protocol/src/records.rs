//! Session record types
//!
//! One session record exists per live, registered view, keyed by that
//! view's window handle in the shared store. A record whose back-reference
//! no longer matches the window that owns it is stale and must be deleted,
//! never trusted.

use crate::PROTOCOL_VERSION;

/// A server-assigned 32-bit window id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u32);

impl WindowHandle {
    /// The null handle
    pub const NONE: WindowHandle = WindowHandle(0);

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Best-effort distributed file identifier.
///
/// No stable global file id exists across hosts, so the record carries the
/// fields that together distinguish one file from another well enough:
/// device, inode, a hash of the host's network identity, creation time,
/// and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
    pub host: u32,
    pub ctime: i64,
    pub size: u64,
}

impl FileIdentity {
    /// Current match rule: inode + creation time + size
    pub fn matches(&self, other: &FileIdentity) -> bool {
        self.ino == other.ino && self.ctime == other.ctime && self.size == other.size
    }

    /// Legacy match rule (records older than
    /// [`crate::PROTOCOL_VERSION_IDENTITY`]): dev + inode + host hash
    pub fn matches_legacy(&self, other: &FileIdentity) -> bool {
        self.dev == other.dev && self.ino == other.ino && self.host == other.host
    }

    /// Identity published by a view that hosts a subordinate shell instead
    /// of a file: the controlling terminal's device and inode. This is what
    /// terminal-based discovery matches against.
    pub fn for_terminal(dev: u64, ino: u64, host: u32) -> Self {
        Self {
            dev,
            ino,
            host,
            ctime: 0,
            size: 0,
        }
    }
}

/// Process pedigree of the session's owner.
///
/// `shell_pid`/`shell_pgrp` are zero unless the view hosts a subordinate
/// shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pedigree {
    pub pid: u32,
    pub pgrp: u32,
    pub shell_pid: u32,
    pub shell_pgrp: u32,
}

impl Pedigree {
    /// Does `pid` name either the editor process or its subordinate shell?
    pub fn matches_pid(&self, pid: u32) -> bool {
        pid != 0 && (self.pid == pid || self.shell_pid == pid)
    }

    /// Does `pgrp` name either process group?
    pub fn matches_pgrp(&self, pgrp: u32) -> bool {
        pgrp != 0 && (self.pgrp == pgrp || self.shell_pgrp == pgrp)
    }

    /// Whether the view hosts a subordinate shell
    pub fn has_shell(&self) -> bool {
        self.shell_pid != 0
    }
}

/// On-screen presence of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    /// Display sequence number (which screen of the server)
    pub screen: u16,
    /// Back-reference: the view window that owns this record. Discovery
    /// reads records off frame windows; the back-reference is what ties a
    /// record to the view that wrote it.
    pub view: WindowHandle,
    pub obscured: bool,
    pub iconified: bool,
}

impl Presence {
    pub fn new(screen: u16, view: WindowHandle) -> Self {
        Self {
            screen,
            view,
            obscured: false,
            iconified: false,
        }
    }
}

/// One attached view's entry in the shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    /// Protocol version tag, for forward compatibility
    pub version: u16,
    /// Owning user id; cross-user access is refused at discovery time
    pub uid: u32,
    pub file: FileIdentity,
    pub pedigree: Pedigree,
    pub presence: Presence,
}

impl SessionRecord {
    /// Synthesize a default record for a view with no existing entry
    pub fn new(uid: u32, view: WindowHandle) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            uid,
            file: FileIdentity::default(),
            pedigree: Pedigree::default(),
            presence: Presence::new(0, view),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_handle_display() {
        assert_eq!(WindowHandle(0x1c0_0021).to_string(), "0x01c00021");
        assert!(WindowHandle::NONE.is_none());
    }

    #[test]
    fn test_identity_match_rules() {
        let a = FileIdentity {
            dev: 5,
            ino: 100,
            host: 0xdead,
            ctime: 1_700_000_000,
            size: 4096,
        };

        // Same file seen through a different mount: dev differs, current
        // rule still matches, legacy rule does not.
        let remounted = FileIdentity { dev: 9, ..a };
        assert!(a.matches(&remounted));
        assert!(!a.matches_legacy(&remounted));

        // Truncated file: size differs, current rule rejects.
        let truncated = FileIdentity { size: 0, ..a };
        assert!(!a.matches(&truncated));
        assert!(a.matches_legacy(&truncated));
    }

    #[test]
    fn test_pedigree_matching() {
        let p = Pedigree {
            pid: 100,
            pgrp: 100,
            shell_pid: 200,
            shell_pgrp: 200,
        };
        assert!(p.matches_pid(100));
        assert!(p.matches_pid(200));
        assert!(!p.matches_pid(300));
        assert!(!p.matches_pid(0));
        assert!(p.matches_pgrp(200));
        assert!(p.has_shell());
        assert!(!Pedigree::default().has_shell());
    }
}
