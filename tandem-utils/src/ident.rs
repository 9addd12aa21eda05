//! Process, terminal, and file identity helpers
//!
//! Discovery and session records are keyed on OS-level identity: who we
//! are (uid/pid), which terminal we were launched from, and which file a
//! buffer holds. Everything here is a thin wrapper over libc.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// The calling process's identity, captured once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub uid: u32,
    pub euid: u32,
    pub pid: u32,
    pub pgrp: u32,
}

impl ProcessIdentity {
    /// Capture the current process's identity
    pub fn current() -> Self {
        // SAFETY: these getters cannot fail and take no pointers
        unsafe {
            Self {
                uid: libc::getuid(),
                euid: libc::geteuid(),
                pid: libc::getpid() as u32,
                pgrp: libc::getpgrp() as u32,
            }
        }
    }

    /// Whether `uid` is this process's real or effective user id
    pub fn owns_uid(&self, uid: u32) -> bool {
        uid == self.uid || uid == self.euid
    }
}

/// Device and inode of a controlling terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtyIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl TtyIdentity {
    /// Identity of the calling process's controlling terminal, if any
    pub fn controlling_terminal() -> Option<Self> {
        let st = stat_path(Path::new("/dev/tty")).ok()?;
        Some(Self {
            dev: st.dev,
            ino: st.ino,
        })
    }
}

/// Raw stat fields used to build a file identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub ctime: i64,
    pub size: u64,
}

/// Stat a path and extract the identity-relevant fields
pub fn stat_path(path: &Path) -> io::Result<FileStat> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;

    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: cpath is a valid NUL-terminated string, st is a valid out-pointer
    let rc = unsafe { libc::stat(cpath.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(FileStat {
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
        ctime: st.st_ctime as i64,
        size: st.st_size as u64,
    })
}

/// Stable 32-bit hash of this host's network identity (uname nodename).
///
/// FNV-1a rather than the stdlib hasher: peers on different architectures
/// must agree on the value.
pub fn host_hash() -> u32 {
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    // SAFETY: uts is a valid out-pointer
    if unsafe { libc::uname(&mut uts) } != 0 {
        return 0;
    }

    let name: Vec<u8> = uts
        .nodename
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    fnv1a32(&name)
}

fn fnv1a32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in data {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
