//! The sibling arena
//!
//! Siblings are views sharing one process and one buffer handle, one per
//! display. They live in a slab arena addressed by stable ids, iterated
//! in insertion order; removal during a walk is well-defined because
//! walks run over a snapshot of ids, never raw links.

use bitflags::bitflags;
use slab::Slab;

use tandem_protocol::WindowHandle;

bitflags! {
    /// Accumulated screen regions a sibling must redraw because of
    /// someone else's edit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RedrawMask: u8 {
        /// One line changed under the view
        const LINE = 1 << 0;
        /// A partial region (from the change to the bottom of the view)
        const REGION = 1 << 1;
        /// Everything
        const FULL = 1 << 2;
        /// Line numbers shifted; scroll state must be repainted
        const SCROLL = 1 << 3;
        /// Title area (file name changed)
        const TITLE = 1 << 4;
    }
}

/// Stable handle of one sibling in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiblingId(usize);

/// Per-display session state for one view
#[derive(Debug, Clone)]
pub struct Sibling {
    pub view: WindowHandle,
    /// First displayed line (1-based)
    pub top_line: u64,
    /// Displayed height in lines
    pub rows: u32,
    pub cursor_line: u64,
    pub cursor_col: u32,
    /// Pending impacted-redraw state, consumed by the renderer
    pub redraw: RedrawMask,
    /// The line currently being typed on, if any; the conflict-detection
    /// marker consulted by `is_line_in_use`
    pub edit_line: Option<u64>,
    /// Whether typed input on `edit_line` has not reached the buffer yet
    pub pending_input: bool,
}

impl Sibling {
    pub fn new(view: WindowHandle) -> Self {
        Self {
            view,
            top_line: 1,
            rows: 24,
            cursor_line: 1,
            cursor_col: 0,
            redraw: RedrawMask::empty(),
            edit_line: None,
            pending_input: false,
        }
    }

    /// Whether `line` is inside this sibling's displayed window
    pub fn displays(&self, line: u64) -> bool {
        line >= self.top_line && line < self.top_line + u64::from(self.rows)
    }

    /// Whether any displayed line falls inside `first..=last`
    pub fn displays_range(&self, first: u64, last: u64) -> bool {
        let bottom = self.top_line + u64::from(self.rows) - 1;
        first <= bottom && last >= self.top_line
    }
}

/// Insertion-ordered arena of siblings
#[derive(Debug, Default)]
pub struct Siblings {
    slab: Slab<Sibling>,
    order: Vec<usize>,
}

impl Siblings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fresh sibling after the existing ones
    pub fn attach(&mut self, sibling: Sibling) -> SiblingId {
        let key = self.slab.insert(sibling);
        self.order.push(key);
        SiblingId(key)
    }

    /// Unlink a sibling; returns `true` when it was the last one (the
    /// caller releases shared per-buffer resources in that case)
    pub fn detach(&mut self, id: SiblingId) -> bool {
        if self.slab.contains(id.0) {
            self.slab.remove(id.0);
            self.order.retain(|&k| k != id.0);
        }
        self.slab.is_empty()
    }

    pub fn get(&self, id: SiblingId) -> Option<&Sibling> {
        self.slab.get(id.0)
    }

    pub fn get_mut(&mut self, id: SiblingId) -> Option<&mut Sibling> {
        self.slab.get_mut(id.0)
    }

    /// Ids in insertion order; a snapshot safe to hold across removals
    pub fn ids(&self) -> Vec<SiblingId> {
        self.order.iter().map(|&k| SiblingId(k)).collect()
    }

    /// Immutable walk in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (SiblingId, &Sibling)> {
        self.order
            .iter()
            .filter_map(|&k| self.slab.get(k).map(|s| (SiblingId(k), s)))
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }
}
