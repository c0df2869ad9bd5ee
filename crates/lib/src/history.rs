//! Undo/redo history.
//!
//! Every document write offers an [`UndoEvent`] to the instance's
//! [`UndoHistory`]. The [`UndoManager`] groups events into named batches; events
//! offered outside a batch, or while an undo/redo is replaying, are dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, atomic::{AtomicI32, Ordering}};
//! use dashfields::{UndoEvent, UndoHistory, UndoManager};
//!
//! let manager = UndoManager::new();
//! let value = Arc::new(AtomicI32::new(1));
//!
//! manager.run_in_batch("increment", || {
//!     value.store(2, Ordering::SeqCst);
//!     let (u, r) = (value.clone(), value.clone());
//!     manager.add_event(UndoEvent::new(
//!         move || u.store(1, Ordering::SeqCst),
//!         move || r.store(2, Ordering::SeqCst),
//!     ));
//! });
//!
//! assert!(manager.undo());
//! assert_eq!(value.load(Ordering::SeqCst), 1);
//! assert!(manager.redo());
//! assert_eq!(value.load(Ordering::SeqCst), 2);
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

type Action = Box<dyn Fn() + Send + Sync>;

/// A reversible change.
pub struct UndoEvent {
    undo: Action,
    redo: Action,
}

impl UndoEvent {
    pub fn new(
        undo: impl Fn() + Send + Sync + 'static,
        redo: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            undo: Box::new(undo),
            redo: Box::new(redo),
        }
    }

    pub fn undo(&self) {
        (self.undo)()
    }

    pub fn redo(&self) {
        (self.redo)()
    }
}

impl fmt::Debug for UndoEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UndoEvent")
    }
}

/// Receiver of undo events produced by document writes.
pub trait UndoHistory: Send + Sync {
    fn add_event(&self, event: UndoEvent);
}

/// History that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl UndoHistory for NoHistory {
    fn add_event(&self, _event: UndoEvent) {}
}

type UndoBatch = Vec<UndoEvent>;

#[derive(Default)]
struct UndoState {
    undo_stack: Vec<UndoBatch>,
    redo_stack: Vec<UndoBatch>,
    current: Option<UndoBatch>,
    open_batches: Vec<String>,
}

/// Batching undo/redo stacks.
#[derive(Default)]
pub struct UndoManager {
    state: Mutex<UndoState>,
    undoing: AtomicBool,
}

impl UndoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a batch. Nested batches fold into the outermost one, which becomes a
    /// single undo step when it ends.
    pub fn start_batch(&self, name: impl Into<String>) -> Batch<'_> {
        let name = name.into();
        tracing::trace!(batch = %name, "Starting undo batch");
        let mut state = self.state.lock();
        state.open_batches.push(name);
        if state.current.is_none() {
            state.current = Some(Vec::new());
        }
        Batch {
            manager: self,
            done: false,
        }
    }

    /// Runs `f` inside a batch that ends when `f` returns.
    pub fn run_in_batch<R>(&self, name: impl Into<String>, f: impl FnOnce() -> R) -> R {
        let batch = self.start_batch(name);
        let result = f();
        batch.end();
        result
    }

    fn end_batch(&self, cancel: bool) {
        let mut state = self.state.lock();
        state.open_batches.pop();
        if !state.open_batches.is_empty() {
            return;
        }
        let batch = state.current.take().unwrap_or_default();
        if batch.is_empty() {
            return;
        }
        if cancel {
            tracing::debug!(events = batch.len(), "Cancelled undo batch");
        } else {
            state.undo_stack.push(batch);
            state.redo_stack.clear();
        }
    }

    /// Names of the batches that are currently open, outermost first.
    pub fn open_batches(&self) -> Vec<String> {
        self.state.lock().open_batches.clone()
    }

    pub fn can_undo(&self) -> bool {
        !self.state.lock().undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.lock().redo_stack.is_empty()
    }

    /// Reverts the most recent batch. Returns false if there was nothing to undo.
    pub fn undo(&self) -> bool {
        let Some(batch) = self.state.lock().undo_stack.pop() else {
            return false;
        };
        self.undoing.store(true, Ordering::SeqCst);
        for event in batch.iter().rev() {
            event.undo();
        }
        self.undoing.store(false, Ordering::SeqCst);
        self.state.lock().redo_stack.push(batch);
        true
    }

    /// Reapplies the most recently undone batch.
    pub fn redo(&self) -> bool {
        let Some(batch) = self.state.lock().redo_stack.pop() else {
            return false;
        };
        self.undoing.store(true, Ordering::SeqCst);
        for event in &batch {
            event.redo();
        }
        self.undoing.store(false, Ordering::SeqCst);
        self.state.lock().undo_stack.push(batch);
        true
    }

    /// Drops both stacks.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.undo_stack.clear();
        state.redo_stack.clear();
    }
}

impl UndoHistory for UndoManager {
    fn add_event(&self, event: UndoEvent) {
        if self.undoing.load(Ordering::SeqCst) {
            return;
        }
        if let Some(batch) = self.state.lock().current.as_mut() {
            batch.push(event);
        }
    }
}

impl fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UndoManager")
            .field("undo", &state.undo_stack.len())
            .field("redo", &state.redo_stack.len())
            .field("open_batches", &state.open_batches)
            .finish()
    }
}

/// An open undo batch. Dropping it ends the batch.
#[must_use = "the batch ends as soon as it is dropped"]
pub struct Batch<'a> {
    manager: &'a UndoManager,
    done: bool,
}

impl Batch<'_> {
    /// Ends the batch, recording its events as one undo step.
    pub fn end(mut self) {
        self.finish(false);
    }

    /// Ends the batch, discarding its events.
    pub fn cancel(mut self) {
        self.finish(true);
    }

    fn finish(&mut self, cancel: bool) {
        if !self.done {
            self.done = true;
            self.manager.end_batch(cancel);
        }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        self.finish(false);
    }
}
