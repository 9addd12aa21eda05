//! The shared property store seam
//!
//! Every cooperating process reaches the same windowing server; its
//! per-window property mechanism is the only shared medium (no sockets,
//! files, or shared memory). All operations are synchronous round-trips
//! to the server and return "window gone" as a value rather than raising
//! it through an asynchronous global flag, so the failure path is local
//! and testable.

mod mem;

pub use mem::{MemStore, MemWindow};

use tandem_protocol::WindowHandle;

/// Property-store operation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The server reported the window no longer exists. Transient by
    /// nature: windows vanish asynchronously between enumeration and use.
    /// Callers skip the candidate or re-discover; never fatal.
    #[error("window {0} is gone")]
    WindowGone(WindowHandle),

    /// Any other server-side failure
    #[error("store error: {0}")]
    Server(String),
}

/// A property-change notification delivered by the embedder's event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyEvent {
    /// New data was appended or written to a property
    NewValue {
        window: WindowHandle,
        property: String,
    },
    /// A property was deleted (including our own read-with-delete;
    /// receivers ignore these)
    Deleted {
        window: WindowHandle,
        property: String,
    },
}

/// Synchronous access to the server's per-window property store.
///
/// The server guarantees that a write by one peer is visible to a
/// subsequent read by any peer, but gives no ordering between distinct
/// properties; callers must tolerate a half-updated world and re-validate
/// rather than trust a single read.
pub trait PropertyStore {
    /// Enumerate every top-level (frame) window known to the server
    fn windows(&self) -> Result<Vec<WindowHandle>, StoreError>;

    /// The canonical server-assigned decoration window for a view,
    /// reached by walking the ownership chain up to the server's own
    /// top-level. For an unreparented window this is the window itself.
    fn frame_of(&self, window: WindowHandle) -> Result<WindowHandle, StoreError>;

    /// Read a property, leaving it in place
    fn read(&self, window: WindowHandle, property: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read a property and delete it in the same server round-trip, so
    /// each batch is consumed exactly once
    fn take(&self, window: WindowHandle, property: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace a property's contents
    fn replace(
        &self,
        window: WindowHandle,
        property: &str,
        data: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Append to a property's contents. Appends from independent senders
    /// are serialized by the server; each is atomic with respect to
    /// [`PropertyStore::take`].
    fn append(&self, window: WindowHandle, property: &str, data: Vec<u8>)
        -> Result<(), StoreError>;

    /// Delete a property
    fn delete(&self, window: WindowHandle, property: &str) -> Result<(), StoreError>;

    /// Flush buffered requests to the server
    fn flush(&self) -> Result<(), StoreError>;
}
