//! In-memory property store
//!
//! Backs tests and single-process embedders. Windows can be destroyed at
//! any point to script the "window vanished mid-protocol" conditions the
//! real server reports asynchronously. All operations go through one
//! borrow, so an append is atomic with respect to a take, matching the
//! server's serialization of property requests.

use std::cell::RefCell;
use std::collections::HashMap;

use tandem_protocol::WindowHandle;

use super::{PropertyStore, StoreError};

/// A frame/view window pair created by [`MemStore::add_window`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemWindow {
    pub frame: WindowHandle,
    pub view: WindowHandle,
}

#[derive(Debug, Default)]
struct World {
    next: u32,
    /// Top-level windows in creation order
    frames: Vec<WindowHandle>,
    /// Every live window, mapped to its frame (frames map to themselves)
    parent: HashMap<WindowHandle, WindowHandle>,
    props: HashMap<WindowHandle, HashMap<String, Vec<u8>>>,
}

/// In-process [`PropertyStore`] implementation
#[derive(Debug)]
pub struct MemStore {
    world: RefCell<World>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            world: RefCell::new(World {
                next: 0x100,
                ..World::default()
            }),
        }
    }

    /// Create a decorated window: a frame with one view reparented under it
    pub fn add_window(&self) -> MemWindow {
        let mut world = self.world.borrow_mut();
        let frame = WindowHandle(world.next);
        let view = WindowHandle(world.next + 1);
        world.next += 2;

        world.frames.push(frame);
        world.parent.insert(frame, frame);
        world.parent.insert(view, frame);
        world.props.insert(frame, HashMap::new());
        world.props.insert(view, HashMap::new());
        MemWindow { frame, view }
    }

    /// Create an undecorated top-level window (frame and view coincide)
    pub fn add_bare_window(&self) -> WindowHandle {
        let mut world = self.world.borrow_mut();
        let w = WindowHandle(world.next);
        world.next += 1;

        world.frames.push(w);
        world.parent.insert(w, w);
        world.props.insert(w, HashMap::new());
        w
    }

    /// Destroy a window. Destroying a frame takes its views with it;
    /// subsequent operations on any destroyed handle report
    /// [`StoreError::WindowGone`].
    pub fn destroy_window(&self, window: WindowHandle) {
        let mut world = self.world.borrow_mut();
        let doomed: Vec<WindowHandle> = world
            .parent
            .iter()
            .filter(|&(&w, &frame)| w == window || frame == window)
            .map(|(&w, _)| w)
            .collect();

        for w in doomed {
            world.parent.remove(&w);
            world.props.remove(&w);
            world.frames.retain(|&f| f != w);
        }
    }

    fn with_live<T>(
        &self,
        window: WindowHandle,
        f: impl FnOnce(&mut World) -> T,
    ) -> Result<T, StoreError> {
        let mut world = self.world.borrow_mut();
        if !world.parent.contains_key(&window) {
            return Err(StoreError::WindowGone(window));
        }
        Ok(f(&mut world))
    }
}

impl PropertyStore for MemStore {
    fn windows(&self) -> Result<Vec<WindowHandle>, StoreError> {
        Ok(self.world.borrow().frames.clone())
    }

    fn frame_of(&self, window: WindowHandle) -> Result<WindowHandle, StoreError> {
        self.world
            .borrow()
            .parent
            .get(&window)
            .copied()
            .ok_or(StoreError::WindowGone(window))
    }

    fn read(&self, window: WindowHandle, property: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_live(window, |world| {
            world
                .props
                .get(&window)
                .and_then(|p| p.get(property))
                .cloned()
        })
    }

    fn take(&self, window: WindowHandle, property: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_live(window, |world| {
            world
                .props
                .get_mut(&window)
                .and_then(|p| p.remove(property))
        })
    }

    fn replace(
        &self,
        window: WindowHandle,
        property: &str,
        data: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.with_live(window, |world| {
            world
                .props
                .entry(window)
                .or_default()
                .insert(property.to_owned(), data);
        })
    }

    fn append(
        &self,
        window: WindowHandle,
        property: &str,
        data: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.with_live(window, |world| {
            world
                .props
                .entry(window)
                .or_default()
                .entry(property.to_owned())
                .or_default()
                .extend_from_slice(&data);
        })
    }

    fn delete(&self, window: WindowHandle, property: &str) -> Result<(), StoreError> {
        self.with_live(window, |world| {
            if let Some(p) = world.props.get_mut(&window) {
                p.remove(property);
            }
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
