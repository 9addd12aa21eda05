//! The line-storage seam
//!
//! The in-memory line-storage engine is an external collaborator; this
//! subsystem sees it as an opaque handle with line-granular operations.
//! Lines are 1-based.

/// Opaque buffer handle shared by all in-process siblings. No internal
/// locking: callers serialize through the single event-dispatch thread.
pub trait Buffer {
    fn total_lines(&self) -> u64;

    /// `None` when `n` is out of range
    fn get_line(&self, n: u64) -> Option<&str>;

    /// Replace line `n`; appends when `n` is one past the end
    fn put_line(&mut self, n: u64, text: &str);

    fn delete_line(&mut self, n: u64);

    fn writable(&self) -> bool;
}

/// Trivial vector-backed buffer for tests and demos
#[derive(Debug, Clone, Default)]
pub struct VecBuffer {
    lines: Vec<String>,
    read_only: bool,
}

impl VecBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines<I, T>(lines: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            read_only: false,
        }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

impl Buffer for VecBuffer {
    fn total_lines(&self) -> u64 {
        self.lines.len() as u64
    }

    fn get_line(&self, n: u64) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.lines.get(n as usize - 1).map(String::as_str)
    }

    fn put_line(&mut self, n: u64, text: &str) {
        if n == 0 {
            return;
        }
        let idx = n as usize - 1;
        if idx < self.lines.len() {
            self.lines[idx] = text.to_owned();
        } else if idx == self.lines.len() {
            self.lines.push(text.to_owned());
        }
    }

    fn delete_line(&mut self, n: u64) {
        if n == 0 {
            return;
        }
        let idx = n as usize - 1;
        if idx < self.lines.len() {
            self.lines.remove(idx);
        }
    }

    fn writable(&self) -> bool {
        !self.read_only
    }
}
