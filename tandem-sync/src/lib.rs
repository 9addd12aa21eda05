//! tandem-sync: keeps every view of a shared buffer consistent
//!
//! Multiple editor views (possibly in separate processes, possibly on
//! separate displays) attach to one logical text buffer and stay mutually
//! consistent through the windowing server's per-window property store,
//! used purely as rendezvous point and message bus. This crate provides:
//!
//! - the property-store seam ([`store`]) with synchronous, testable errors
//! - the session registry ([`registry`]): one record per live view,
//!   repaired or purged whenever it is found stale
//! - peer discovery ([`discover`]) by window handle, process pedigree,
//!   controlling terminal, or file identity
//! - the messaging channel ([`channel`]): framed commands appended to a
//!   peer's command property, consumed with read-with-delete
//! - change propagation ([`propagate`]) across the in-process sibling
//!   arena ([`siblings`])
//! - session lifecycle ([`lifecycle`]): attach, rename, visibility flags,
//!   clean detach

pub mod buffer;
pub mod channel;
pub mod config;
pub mod discover;
pub mod lifecycle;
pub mod propagate;
pub mod registry;
pub mod siblings;
pub mod store;

pub use buffer::{Buffer, VecBuffer};
pub use channel::{Channel, ChannelError, FrameHandler};
pub use config::{PropNames, SyncConfig};
pub use discover::{find_first, find_open_copy, find_peer, Discovered, DiscoverError, PeerQuery};
pub use lifecycle::{Visibility, Workspace};
pub use propagate::{is_line_in_use, propagate, Edit, ViewEvents};
pub use registry::SessionRegistry;
pub use siblings::{RedrawMask, Sibling, SiblingId, Siblings};
pub use store::{MemStore, MemWindow, PropertyEvent, PropertyStore, StoreError};
