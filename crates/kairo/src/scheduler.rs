//! Host task queue for the cooperative event loop.
//!
//! Two queues drive the loop: the microtask queue (promise callbacks, owned
//! by [`crate::promise`]) and this FIFO of embedder-scheduled tasks. The
//! engine's drain loop empties the microtask queue completely before every
//! host task, and tasks scheduled while a task runs join the tail and run
//! within the same drain.

use std::collections::VecDeque;

/// A host-scheduled callback. It receives the engine, so it can evaluate
/// source, resolve script-visible state, or schedule further tasks.
pub type HostTask = Box<dyn FnOnce(&mut crate::Engine)>;

#[derive(Default)]
pub(crate) struct TaskQueue {
    tasks: VecDeque<HostTask>,
}

impl TaskQueue {
    pub fn push(&mut self, task: HostTask) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<HostTask> {
        self.tasks.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Discards all pending tasks without running them (disposal).
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.tasks.len()).finish()
    }
}
