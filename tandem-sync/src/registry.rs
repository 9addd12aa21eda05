//! Session registry
//!
//! Reads, writes, repairs, and deletes the one session record each live
//! view keeps in the shared store. There is no garbage collector for
//! shared state: a record that fails validation is deleted on the spot,
//! and discovery passes double as repair passes.

use tracing::{debug, warn};

use tandem_protocol::{SessionRecord, WindowHandle};
use tandem_utils::ProcessIdentity;

use crate::store::{PropertyStore, StoreError};

/// Registry operations over one session property name
pub struct SessionRegistry<'a, S: PropertyStore> {
    store: &'a S,
    prop: &'a str,
}

impl<'a, S: PropertyStore> SessionRegistry<'a, S> {
    pub fn new(store: &'a S, prop: &'a str) -> Self {
        Self { store, prop }
    }

    /// Read the record stored on `view`, or synthesize a default one
    /// (uid and pedigree taken from the caller; back-reference set to
    /// `view`). Returns `created = true` when the caller must persist the
    /// synthesized record. A record of the wrong size is treated the same
    /// as an absent one.
    pub fn read_or_create(
        &self,
        view: WindowHandle,
        me: &ProcessIdentity,
    ) -> Result<(SessionRecord, bool), StoreError> {
        if let Some(raw) = self.store.read(view, self.prop)? {
            match SessionRecord::decode(&raw) {
                Ok(record) => return Ok((record, false)),
                Err(e) => {
                    warn!(window = %view, error = %e, "discarding undecodable session record");
                }
            }
        }

        let mut record = SessionRecord::new(me.uid, view);
        record.pedigree.pid = me.pid;
        record.pedigree.pgrp = me.pgrp;
        Ok((record, true))
    }

    /// Write the record to the canonical frame window and, when the frame
    /// differs from the view, mirror it onto the view as well. Peers may
    /// probe either window.
    pub fn write(&self, view: WindowHandle, record: &SessionRecord) -> Result<(), StoreError> {
        let frame = self.store.frame_of(view)?;
        let encoded = record.encode().to_vec();

        self.store.replace(frame, self.prop, encoded.clone())?;
        if frame != view {
            self.store.replace(view, self.prop, encoded)?;
        }
        self.store.flush()?;

        debug!(view = %view, frame = %frame, "session record written");
        Ok(())
    }

    /// Raw read of the record property from any window. Discovery probes
    /// frame windows with this before it knows which view owns them.
    pub fn read_raw(&self, window: WindowHandle) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.read(window, self.prop)
    }

    /// Re-read the record from the view's own window and check that it
    /// still belongs there. A missing or undecodable record, a
    /// back-reference that disagrees with `view`, or a view that is gone
    /// altogether all invalidate the record: the canonical copy on
    /// `frame` is deleted and `false` is returned. This guards against
    /// decoration windows recycled by the host environment across process
    /// restarts.
    pub fn validate(&self, view: WindowHandle, frame: WindowHandle) -> Result<bool, StoreError> {
        let raw = match self.store.read(view, self.prop) {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.invalidate(view, frame, "record missing"),
            Err(StoreError::WindowGone(_)) => return self.invalidate(view, frame, "view gone"),
            Err(e) => return Err(e),
        };

        match SessionRecord::decode(&raw) {
            Ok(record) if record.presence.view == view => Ok(true),
            Ok(record) => self.invalidate(
                view,
                frame,
                &format!("back-reference {} disagrees", record.presence.view),
            ),
            Err(_) => self.invalidate(view, frame, "record undecodable"),
        }
    }

    fn invalidate(
        &self,
        view: WindowHandle,
        frame: WindowHandle,
        reason: &str,
    ) -> Result<bool, StoreError> {
        warn!(view = %view, frame = %frame, reason, "purging stale session record");
        // The frame itself may be gone too; that leaves nothing to purge
        if let Err(e) = self.store.delete(frame, self.prop) {
            debug!(frame = %frame, error = %e, "stale record already unreachable");
        }
        Ok(false)
    }

    /// Read-with-delete of both copies at shutdown, so no orphaned record
    /// survives for a future unrelated process to inherit. Returns the
    /// last record for logging.
    pub fn delete(&self, view: WindowHandle) -> Result<Option<SessionRecord>, StoreError> {
        let record = self
            .store
            .take(view, self.prop)?
            .and_then(|raw| SessionRecord::decode(&raw).ok());

        match self.store.frame_of(view) {
            Ok(frame) if frame != view => self.store.delete(frame, self.prop)?,
            Ok(_) => {}
            Err(StoreError::WindowGone(_)) => {}
            Err(e) => return Err(e),
        }
        self.store.flush()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use tandem_protocol::props;

    fn me() -> ProcessIdentity {
        ProcessIdentity {
            uid: 1000,
            euid: 1000,
            pid: 4242,
            pgrp: 4242,
        }
    }

    #[test]
    fn test_read_or_create_synthesizes_default() {
        let store = MemStore::new();
        let w = store.add_window();
        let reg = SessionRegistry::new(&store, props::SESSION);

        let (record, created) = reg.read_or_create(w.view, &me()).unwrap();
        assert!(created);
        assert_eq!(record.uid, 1000);
        assert_eq!(record.pedigree.pid, 4242);
        assert_eq!(record.presence.view, w.view);
    }

    #[test]
    fn test_write_mirrors_to_both_windows() {
        let store = MemStore::new();
        let w = store.add_window();
        let reg = SessionRegistry::new(&store, props::SESSION);

        let (record, _) = reg.read_or_create(w.view, &me()).unwrap();
        reg.write(w.view, &record).unwrap();

        assert!(store.read(w.frame, props::SESSION).unwrap().is_some());
        assert!(store.read(w.view, props::SESSION).unwrap().is_some());

        let (reread, created) = reg.read_or_create(w.view, &me()).unwrap();
        assert!(!created);
        assert_eq!(reread, record);
    }

    #[test]
    fn test_write_bare_window_single_copy() {
        let store = MemStore::new();
        let bare = store.add_bare_window();
        let reg = SessionRegistry::new(&store, props::SESSION);

        let (record, _) = reg.read_or_create(bare, &me()).unwrap();
        reg.write(bare, &record).unwrap();
        assert!(reg.validate(bare, bare).unwrap());
    }

    #[test]
    fn test_wrong_size_record_treated_as_absent() {
        let store = MemStore::new();
        let w = store.add_window();
        store.replace(w.view, props::SESSION, vec![1, 2, 3]).unwrap();

        let reg = SessionRegistry::new(&store, props::SESSION);
        let (_, created) = reg.read_or_create(w.view, &me()).unwrap();
        assert!(created);
    }

    #[test]
    fn test_validate_rejects_mismatched_backref() {
        let store = MemStore::new();
        let w = store.add_window();
        let other = store.add_window();
        let reg = SessionRegistry::new(&store, props::SESSION);

        // A record written by a previous owner of a recycled window: its
        // back-reference names some other view.
        let (mut record, _) = reg.read_or_create(w.view, &me()).unwrap();
        record.presence.view = other.view;
        store
            .replace(w.view, props::SESSION, record.encode().to_vec())
            .unwrap();
        store
            .replace(w.frame, props::SESSION, record.encode().to_vec())
            .unwrap();

        assert!(!reg.validate(w.view, w.frame).unwrap());
        // The canonical copy was purged
        assert!(store.read(w.frame, props::SESSION).unwrap().is_none());
    }

    #[test]
    fn test_validate_rejects_gone_view() {
        let store = MemStore::new();
        let w = store.add_window();
        let keeper = store.add_window();
        let reg = SessionRegistry::new(&store, props::SESSION);

        let (record, _) = reg.read_or_create(w.view, &me()).unwrap();
        // Plant the canonical copy on a window that survives
        store
            .replace(keeper.frame, props::SESSION, record.encode().to_vec())
            .unwrap();
        store.destroy_window(w.frame);

        assert!(!reg.validate(w.view, keeper.frame).unwrap());
        assert!(store.read(keeper.frame, props::SESSION).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_both_copies() {
        let store = MemStore::new();
        let w = store.add_window();
        let reg = SessionRegistry::new(&store, props::SESSION);

        let (record, _) = reg.read_or_create(w.view, &me()).unwrap();
        reg.write(w.view, &record).unwrap();

        let deleted = reg.delete(w.view).unwrap();
        assert_eq!(deleted, Some(record));
        assert!(store.read(w.view, props::SESSION).unwrap().is_none());
        assert!(store.read(w.frame, props::SESSION).unwrap().is_none());
    }
}
