//! Change propagation
//!
//! After any local mutation of the shared buffer, every other sibling's
//! display state is brought up to date: redraw regions accumulate, line
//! numbers shift so visual positions do not jump, and in-flight edits
//! that the mutation invalidated are cleared or force-flushed. There is
//! no distributed lock; correctness rests on local siblings sharing one
//! buffer handle and remote peers learning of a mutation only after it is
//! committed. Propagation notifies, the peer reconciles its display.

use tracing::trace;

use crate::siblings::{RedrawMask, SiblingId, Siblings};

/// One committed mutation of the shared buffer. Lines are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Line `line` was overwritten in place
    Overwrite { line: u64 },
    /// A line was inserted after `line` (0 = at the top). `page_break` is
    /// set when the new line contains a form feed, which invalidates page
    /// layout below it.
    Insert { after: u64, page_break: bool },
    /// Line `line` was deleted
    Delete { line: u64 },
    /// Highlighting changed over `first..=last`
    Recolor { first: u64, last: u64 },
}

impl Edit {
    /// Render as the reconcile command line carried to out-of-process
    /// peers in an execute frame
    pub fn to_command_line(&self) -> String {
        match self {
            Edit::Overwrite { line } => format!("reconcile overwrite {}", line),
            Edit::Insert {
                after,
                page_break: false,
            } => format!("reconcile insert {}", after),
            Edit::Insert {
                after,
                page_break: true,
            } => format!("reconcile insert {} page", after),
            Edit::Delete { line } => format!("reconcile delete {}", line),
            Edit::Recolor { first, last } => format!("reconcile recolor {} {}", first, last),
        }
    }

    /// Parse a reconcile command line; `None` for anything else
    pub fn parse_command_line(line: &str) -> Option<Edit> {
        let mut words = line.split_whitespace();
        if words.next() != Some("reconcile") {
            return None;
        }

        let verb = words.next()?;
        let first: u64 = words.next()?.parse().ok()?;
        match (verb, words.next(), words.next()) {
            ("overwrite", None, _) => Some(Edit::Overwrite { line: first }),
            ("insert", None, _) => Some(Edit::Insert {
                after: first,
                page_break: false,
            }),
            ("insert", Some("page"), None) => Some(Edit::Insert {
                after: first,
                page_break: true,
            }),
            ("delete", None, _) => Some(Edit::Delete { line: first }),
            ("recolor", Some(last), None) => Some(Edit::Recolor {
                first,
                last: last.parse().ok()?,
            }),
            _ => None,
        }
    }
}

/// Side effects propagation raises on the embedding editor
pub trait ViewEvents {
    /// Push a sibling's unflushed typed input into the buffer
    fn flush(&mut self, id: SiblingId);

    /// Show a short user-visible message on a sibling's view
    fn warn(&mut self, id: SiblingId, message: &str);
}

/// Apply `edit` to every sibling except `origin` (pass `None` when the
/// edit arrived from another process and every local sibling is affected).
pub fn propagate(
    siblings: &mut Siblings,
    origin: Option<SiblingId>,
    edit: &Edit,
    events: &mut dyn ViewEvents,
) {
    for id in siblings.ids() {
        if Some(id) == origin {
            continue;
        }
        apply_to_sibling(siblings, id, edit, events);
    }
    trace!(?edit, ?origin, "edit propagated");
}

fn apply_to_sibling(
    siblings: &mut Siblings,
    id: SiblingId,
    edit: &Edit,
    events: &mut dyn ViewEvents,
) {
    // Delete may force-flush through `events`, which needs the arena
    // consistent; compute everything on the node first, then call out.
    let mut flush_and_warn = false;

    if let Some(sibling) = siblings.get_mut(id) {
        match *edit {
            Edit::Overwrite { line } => {
                if sibling.displays(line) {
                    sibling.redraw |= RedrawMask::LINE;
                }
                // Last writer wins: an in-flight edit on the overwritten
                // line is invalidated, and the loser re-fetches before
                // continuing
                if sibling.edit_line == Some(line) {
                    sibling.edit_line = None;
                    sibling.pending_input = false;
                    sibling.redraw |= RedrawMask::LINE;
                }
            }
            Edit::Insert { after, page_break } => {
                let mut shifted = false;
                if sibling.top_line > after {
                    sibling.top_line += 1;
                    shifted = true;
                }
                if sibling.cursor_line > after {
                    sibling.cursor_line += 1;
                    shifted = true;
                }
                if let Some(edit_line) = sibling.edit_line {
                    if edit_line > after {
                        sibling.edit_line = Some(edit_line + 1);
                    }
                }
                if shifted {
                    sibling.redraw |= RedrawMask::SCROLL;
                }
                if sibling.displays(after) || sibling.displays(after + 1) {
                    sibling.redraw |= if page_break {
                        RedrawMask::FULL
                    } else {
                        RedrawMask::REGION
                    };
                }
            }
            Edit::Delete { line } => {
                if sibling.edit_line == Some(line) {
                    // The line vanished beneath an edit in progress
                    if sibling.pending_input {
                        flush_and_warn = true;
                    }
                    sibling.edit_line = None;
                }

                let mut shifted = false;
                if sibling.top_line > line {
                    sibling.top_line -= 1;
                    shifted = true;
                }
                if sibling.cursor_line > line {
                    sibling.cursor_line -= 1;
                    shifted = true;
                }
                if let Some(edit_line) = sibling.edit_line {
                    if edit_line > line {
                        sibling.edit_line = Some(edit_line - 1);
                    }
                }
                if shifted {
                    sibling.redraw |= RedrawMask::SCROLL;
                }
                if sibling.displays(line) {
                    sibling.redraw |= RedrawMask::REGION;
                }
            }
            Edit::Recolor { first, last } => {
                if sibling.displays_range(first, last) {
                    // Flush first so no stale typed input masks the recolor
                    events.flush(id);
                    sibling.pending_input = false;
                    sibling.redraw |= RedrawMask::FULL;
                }
            }
        }
    }

    if flush_and_warn {
        events.flush(id);
        if let Some(sibling) = siblings.get_mut(id) {
            sibling.pending_input = false;
        }
        events.warn(id, "line deleted by another view");
    }
}

/// Whether any sibling other than `origin` is mid-edit on `line`. A
/// process must confirm this is false before starting to type on a line;
/// when it is true the local edit is refused and "line in use" surfaced.
pub fn is_line_in_use(siblings: &Siblings, origin: Option<SiblingId>, line: u64) -> bool {
    siblings
        .iter()
        .any(|(id, s)| Some(id) != origin && s.edit_line == Some(line))
}
