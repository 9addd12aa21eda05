//! Peer discovery
//!
//! There is no central directory service: discovery enumerates every
//! top-level window the server knows, reads whatever session records it
//! finds, and validates each before trusting it. Windows that vanish
//! mid-enumeration are skipped, stale records are purged in passing, and
//! the surviving candidates are matched against the caller's criteria in
//! priority order.

use tracing::{debug, trace};

use tandem_protocol::{FileIdentity, SessionRecord, WindowHandle};
use tandem_utils::{ProcessIdentity, TtyIdentity};

use crate::registry::SessionRegistry;
use crate::store::{PropertyStore, StoreError};

/// One discovery criterion. When a caller can supply several (a helper
/// tool tries pedigree before its controlling terminal), use
/// [`find_first`] with the criteria in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerQuery {
    /// An explicit window handle (view or frame)
    Window(WindowHandle),
    /// Match pid or pgrp against the session's editor or subordinate
    /// shell pedigree
    Pedigree { pid: Option<u32>, pgrp: Option<u32> },
    /// Match the caller's controlling terminal against sessions hosting a
    /// subordinate shell (their published identity is the terminal's
    /// device and inode). Fallback for tools with no editor pedigree.
    Terminal(TtyIdentity),
    /// Any live session at all
    Any,
}

/// A validated discovery hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub view: WindowHandle,
    pub frame: WindowHandle,
    pub record: SessionRecord,
}

/// Discovery error
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("no matching session")]
    NotFound,

    #[error("session belongs to uid {theirs}, not uid {ours}")]
    PermissionDenied { theirs: u32, ours: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Find the peer matching `query`, enforcing that its owner is the
/// calling user (real or effective uid). Cross-user matches are refused
/// loudly, never silently skipped.
pub fn find_peer<S: PropertyStore>(
    store: &S,
    registry: &SessionRegistry<'_, S>,
    query: &PeerQuery,
    me: &ProcessIdentity,
) -> Result<Discovered, DiscoverError> {
    let candidates = collect_valid(store, registry)?;

    let hit = candidates
        .into_iter()
        .find(|c| matches_query(c, query))
        .ok_or(DiscoverError::NotFound)?;

    check_owner(&hit, me)?;
    debug!(view = %hit.view, ?query, "peer discovered");
    Ok(hit)
}

/// Try several criteria in priority order, returning the first hit.
/// `NotFound` falls through to the next criterion; a permission refusal
/// aborts immediately.
pub fn find_first<S: PropertyStore>(
    store: &S,
    registry: &SessionRegistry<'_, S>,
    queries: &[PeerQuery],
    me: &ProcessIdentity,
) -> Result<Discovered, DiscoverError> {
    for query in queries {
        match find_peer(store, registry, query, me) {
            Err(DiscoverError::NotFound) => continue,
            other => return other,
        }
    }
    Err(DiscoverError::NotFound)
}

/// Find a session already editing the file named by `file`. Used at
/// file-open time to surface "this file is already being edited" before a
/// redundant view is created. Records below `identity_floor` (normally
/// [`tandem_protocol::PROTOCOL_VERSION_IDENTITY`], configurable) are
/// matched with the legacy dev+inode+host rule.
pub fn find_open_copy<S: PropertyStore>(
    store: &S,
    registry: &SessionRegistry<'_, S>,
    file: &FileIdentity,
    me: &ProcessIdentity,
    identity_floor: u16,
) -> Result<Discovered, DiscoverError> {
    let candidates = collect_valid(store, registry)?;

    let hit = candidates
        .into_iter()
        .find(|c| {
            if c.record.version >= identity_floor {
                c.record.file.matches(file)
            } else {
                c.record.file.matches_legacy(file)
            }
        })
        .ok_or(DiscoverError::NotFound)?;

    check_owner(&hit, me)?;
    Ok(hit)
}

/// Enumerate the server's top-level windows and keep every candidate
/// whose record survives validation. A half-updated world is expected:
/// gone windows and absent or undecodable records are skipped silently,
/// stale ones are purged by `validate`.
fn collect_valid<S: PropertyStore>(
    store: &S,
    registry: &SessionRegistry<'_, S>,
) -> Result<Vec<Discovered>, DiscoverError> {
    let mut out = Vec::new();

    for frame in store.windows()? {
        let raw = match registry.read_raw(frame) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(StoreError::WindowGone(w)) => {
                trace!(window = %w, "window vanished during enumeration");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let record = match SessionRecord::decode(&raw) {
            Ok(record) => record,
            Err(e) => {
                debug!(frame = %frame, error = %e, "skipping undecodable record");
                continue;
            }
        };

        let view = record.presence.view;
        if !registry.validate(view, frame)? {
            continue;
        }

        out.push(Discovered {
            view,
            frame,
            record,
        });
    }

    Ok(out)
}

fn matches_query(candidate: &Discovered, query: &PeerQuery) -> bool {
    match query {
        PeerQuery::Window(w) => candidate.view == *w || candidate.frame == *w,
        PeerQuery::Pedigree { pid, pgrp } => {
            pid.map_or(false, |p| candidate.record.pedigree.matches_pid(p))
                || pgrp.map_or(false, |g| candidate.record.pedigree.matches_pgrp(g))
        }
        PeerQuery::Terminal(tty) => {
            candidate.record.pedigree.has_shell()
                && candidate.record.file.dev == tty.dev
                && candidate.record.file.ino == tty.ino
        }
        PeerQuery::Any => true,
    }
}

fn check_owner(hit: &Discovered, me: &ProcessIdentity) -> Result<(), DiscoverError> {
    if me.owns_uid(hit.record.uid) {
        Ok(())
    } else {
        Err(DiscoverError::PermissionDenied {
            theirs: hit.record.uid,
            ours: me.uid,
        })
    }
}
