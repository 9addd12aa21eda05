//! Session lifecycle
//!
//! [`Workspace`] is the explicit context object every operation hangs
//! off: the store connection, the sibling arena, the shared buffer
//! handle, and the caller's identity. Registration happens at attach
//! time, visibility flags are maintained with read-modify-write, and a
//! clean detach removes the session record so no orphan survives the
//! process.

use tracing::{debug, info};

use tandem_protocol::{FileIdentity, Frame, WindowHandle, PROTOCOL_VERSION};
use tandem_utils::{ProcessIdentity, TandemError};

use crate::buffer::Buffer;
use crate::channel::{Channel, ChannelError, FrameHandler};
use crate::config::SyncConfig;
use crate::discover::{self, Discovered, DiscoverError, PeerQuery};
use crate::propagate::{self, Edit, ViewEvents};
use crate::registry::SessionRegistry;
use crate::siblings::{RedrawMask, Sibling, SiblingId, Siblings};
use crate::store::{PropertyEvent, PropertyStore, StoreError};

/// The two per-session visibility flags folded into the session record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Iconified,
    Obscured,
}

/// All state one process keeps for one shared buffer and its views
pub struct Workspace<S: PropertyStore, B: Buffer> {
    store: S,
    config: SyncConfig,
    identity: ProcessIdentity,
    file: FileIdentity,
    siblings: Siblings,
    /// Shared by all siblings; released when the last one detaches
    buffer: Option<B>,
}

impl<S: PropertyStore, B: Buffer> Workspace<S, B> {
    pub fn new(
        store: S,
        config: SyncConfig,
        identity: ProcessIdentity,
        file: FileIdentity,
        buffer: B,
    ) -> Self {
        Self {
            store,
            config,
            identity,
            file,
            siblings: Siblings::new(),
            buffer: Some(buffer),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn file(&self) -> &FileIdentity {
        &self.file
    }

    pub fn siblings(&self) -> &Siblings {
        &self.siblings
    }

    pub fn siblings_mut(&mut self) -> &mut Siblings {
        &mut self.siblings
    }

    pub fn buffer(&self) -> Option<&B> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut B> {
        self.buffer.as_mut()
    }

    fn registry(&self) -> SessionRegistry<'_, S> {
        SessionRegistry::new(&self.store, &self.config.props.session)
    }

    fn channel(&self) -> Channel<'_, S> {
        Channel::new(
            &self.store,
            &self.config.props.command,
            &self.config.props.cc_request,
        )
    }

    // ==================== Registration ====================

    /// Register a freshly created view: resolve its canonical frame,
    /// build and persist the initial session record, and append a sibling
    /// node. `shell` carries the pid/pgrp of a subordinate shell when the
    /// view hosts one.
    pub fn attach_view(
        &mut self,
        view: WindowHandle,
        shell: Option<(u32, u32)>,
    ) -> Result<SiblingId, StoreError> {
        let registry = SessionRegistry::new(&self.store, &self.config.props.session);
        let (mut record, created) = registry.read_or_create(view, &self.identity)?;

        record.version = PROTOCOL_VERSION;
        record.uid = self.identity.uid;
        record.file = self.file;
        record.pedigree.pid = self.identity.pid;
        record.pedigree.pgrp = self.identity.pgrp;
        if let Some((shell_pid, shell_pgrp)) = shell {
            record.pedigree.shell_pid = shell_pid;
            record.pedigree.shell_pgrp = shell_pgrp;
        }
        record.presence.view = view;
        record.presence.screen = self.siblings.len() as u16;

        registry.write(view, &record)?;

        let id = self.siblings.attach(Sibling::new(view));
        info!(view = %view, created, siblings = self.siblings.len(), "view attached");
        Ok(id)
    }

    /// De-register a view. Returns `true` when it was the last sibling;
    /// the shared buffer handle is released in that case, and the caller
    /// should drop its session-manager connection and any process-wide
    /// lookup table of its own.
    pub fn detach_view(&mut self, id: SiblingId) -> Result<bool, StoreError> {
        let Some(view) = self.siblings.get(id).map(|s| s.view) else {
            return Ok(self.siblings.is_empty());
        };

        let record = self.registry().delete(view)?;
        debug!(view = %view, had_record = record.is_some(), "session record removed");

        let last = self.siblings.detach(id);
        if last {
            self.buffer = None;
            info!("last sibling detached; buffer released");
        }
        Ok(last)
    }

    // ==================== Record maintenance ====================

    /// The buffer now holds a different file: recompute the identity for
    /// every sibling session, rewrite every record, and dirty every title
    /// area
    pub fn rename(&mut self, new_file: FileIdentity) -> Result<(), StoreError> {
        self.file = new_file;

        for id in self.siblings.ids() {
            let Some(view) = self.siblings.get(id).map(|s| s.view) else {
                continue;
            };

            let registry = SessionRegistry::new(&self.store, &self.config.props.session);
            let (mut record, _) = registry.read_or_create(view, &self.identity)?;
            record.file = new_file;
            record.presence.view = view;
            registry.write(view, &record)?;

            if let Some(sibling) = self.siblings.get_mut(id) {
                sibling.redraw |= RedrawMask::TITLE;
            }
        }
        Ok(())
    }

    /// Read-modify-write of one visibility flag. When the stored value
    /// already matches, the write is skipped entirely so the store sees
    /// no needless property churn.
    pub fn set_visibility(
        &mut self,
        id: SiblingId,
        flag: Visibility,
        value: bool,
    ) -> Result<(), StoreError> {
        let Some(view) = self.siblings.get(id).map(|s| s.view) else {
            return Ok(());
        };

        let registry = self.registry();
        let (mut record, _) = registry.read_or_create(view, &self.identity)?;

        let slot = match flag {
            Visibility::Iconified => &mut record.presence.iconified,
            Visibility::Obscured => &mut record.presence.obscured,
        };
        if *slot == value {
            return Ok(());
        }
        *slot = value;

        registry.write(view, &record)
    }

    // ==================== Editing ====================

    /// Claim `line` for typing on sibling `id`. Refused when another
    /// sibling is already mid-edit there.
    pub fn claim_line(&mut self, id: SiblingId, line: u64) -> Result<(), TandemError> {
        if propagate::is_line_in_use(&self.siblings, Some(id), line) {
            return Err(TandemError::ConflictInUse(line));
        }
        if let Some(sibling) = self.siblings.get_mut(id) {
            sibling.edit_line = Some(line);
            sibling.pending_input = true;
        }
        Ok(())
    }

    /// Propagate a committed local edit to every other sibling. Pass
    /// `origin = None` for edits that arrived from another process.
    pub fn on_local_edit(
        &mut self,
        origin: Option<SiblingId>,
        edit: &Edit,
        events: &mut dyn ViewEvents,
    ) {
        if self.config.warn_on_conflict {
            propagate::propagate(&mut self.siblings, origin, edit, events);
        } else {
            let mut muted = MuteWarnings(events);
            propagate::propagate(&mut self.siblings, origin, edit, &mut muted);
        }
    }

    /// Tell an out-of-process peer about a committed edit: one execute
    /// frame carrying the reconcile command line
    pub fn notify_peer(&self, target: WindowHandle, edit: &Edit) -> Result<(), ChannelError> {
        self.channel().send(
            target,
            &[Frame::Execute {
                command: edit.to_command_line(),
            }],
        )
    }

    /// Consume and dispatch an inbound frame batch
    pub fn on_peer_message(
        &self,
        event: &PropertyEvent,
        handler: &mut dyn FrameHandler,
    ) -> Result<usize, ChannelError> {
        self.channel().receive_and_dispatch(event, handler)
    }

    // ==================== Discovery ====================

    pub fn find_peer(&self, query: &PeerQuery) -> Result<Discovered, DiscoverError> {
        discover::find_peer(&self.store, &self.registry(), query, &self.identity)
    }

    /// Is this workspace's file already open in some other session?
    pub fn find_open_copy(&self, file: &FileIdentity) -> Result<Discovered, DiscoverError> {
        discover::find_open_copy(
            &self.store,
            &self.registry(),
            file,
            &self.identity,
            self.config.identity_version_floor,
        )
    }
}

struct MuteWarnings<'a>(&'a mut dyn ViewEvents);

impl ViewEvents for MuteWarnings<'_> {
    fn flush(&mut self, id: SiblingId) {
        self.0.flush(id);
    }
    fn warn(&mut self, _id: SiblingId, _message: &str) {}
}
