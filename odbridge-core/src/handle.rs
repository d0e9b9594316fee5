use crate::{ErrorKind, HandleKind, RawHandle, Result};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum HandleState {
    Open = 0,
    Closed = 1,
    /// Released because the parent connection was closed.
    Invalidated = 2,
}

/// Owner of one native handle.
///
/// The raw value can be read by many threads, but it is handed out for
/// release exactly once: after `release` every `get` fails with a state error.
#[derive(Debug)]
pub(crate) struct HandleCell {
    kind: HandleKind,
    raw: AtomicUsize,
    state: AtomicU8,
}

impl HandleCell {
    pub(crate) fn new(kind: HandleKind, raw: RawHandle) -> Self {
        Self {
            kind,
            raw: AtomicUsize::new(raw.0),
            state: AtomicU8::new(HandleState::Open as u8),
        }
    }

    pub(crate) fn state(&self) -> HandleState {
        match self.state.load(Ordering::Acquire) {
            0 => HandleState::Open,
            1 => HandleState::Closed,
            _ => HandleState::Invalidated,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == HandleState::Open
    }

    pub(crate) fn get(&self) -> Result<RawHandle> {
        match self.state() {
            HandleState::Open => Ok(RawHandle(self.raw.load(Ordering::Acquire))),
            HandleState::Closed => {
                Err(ErrorKind::State.error(format!("The {} is closed", self.kind)))
            }
            HandleState::Invalidated => Err(ErrorKind::State.error(format!(
                "The {} was invalidated because its connection was closed",
                self.kind
            ))),
        }
    }

    /// Moves the cell out of the open state, returning the raw handle to free.
    /// Returns `None` if it was already released.
    pub(crate) fn release(&self, state: HandleState) -> Option<RawHandle> {
        self.state
            .compare_exchange(
                HandleState::Open as u8,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| RawHandle(self.raw.swap(0, Ordering::AcqRel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_once() {
        let cell = HandleCell::new(HandleKind::Statement, RawHandle(7));
        assert_eq!(cell.get().ok(), Some(RawHandle(7)));
        assert_eq!(cell.release(HandleState::Closed), Some(RawHandle(7)));
        assert_eq!(cell.release(HandleState::Closed), None);
        assert_eq!(cell.release(HandleState::Invalidated), None);
        assert_eq!(cell.state(), HandleState::Closed);
        let error = cell.get().unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
        assert_eq!(error.to_string(), "state error: The statement is closed");
    }

    #[test]
    fn invalidated() {
        let cell = HandleCell::new(HandleKind::Statement, RawHandle(3));
        assert_eq!(cell.release(HandleState::Invalidated), Some(RawHandle(3)));
        assert!(!cell.is_open());
        let error = cell.get().unwrap_err();
        assert!(error.to_string().contains("invalidated"));
    }
}
