//! Dependency Resolver
//!
//! Deferred tasks wait on sets of chunks. A resolve pass walks the queue in
//! priority order and hands back the first task whose chunks are all ready.

use crate::runtime::Runtime;
use crate::value::ExportValue;
use crate::{ChunkId, Priority};
use std::collections::BTreeSet;

/// Deferred callback; a returned value becomes the outcome of the pass
pub type Continuation = Box<dyn FnOnce(&Runtime) -> Option<ExportValue>>;

/// Result of a resolve pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveOutcome {
    /// Value produced by the last continuation that ran
    pub value: Option<ExportValue>,
    /// Lowest priority still blocked when the pass stopped
    pub blocked_at: Option<Priority>,
}

impl ResolveOutcome {
    pub fn is_blocked(&self) -> bool {
        self.blocked_at.is_some()
    }
}

pub(crate) struct DeferredTask {
    chunks: Vec<ChunkId>,
    priority: Priority,
    run: Continuation,
}

/// One step of a resolve pass
pub(crate) enum Step {
    Ready(Continuation),
    Blocked(Option<Priority>),
}

/// Pending tasks, sorted by priority, registration order within a priority
#[derive(Default)]
pub(crate) struct DeferredQueue {
    tasks: Vec<DeferredTask>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunks: Vec<ChunkId>, priority: Priority, run: Continuation) {
        let at = self.tasks.partition_point(|task| task.priority <= priority);
        self.tasks.insert(at, DeferredTask { chunks, priority, run });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Every chunk some task is still waiting on
    pub fn awaited_chunks(&self) -> BTreeSet<ChunkId> {
        self.tasks.iter().flat_map(|task| task.chunks.iter().copied()).collect()
    }

    /// Find the next runnable task.
    ///
    /// Ready chunks are pruned from each gate as they are seen. Once a task
    /// is blocked, tasks of higher priority value are left alone for the
    /// rest of the pass.
    pub fn take_ready(&mut self, ready: impl Fn(ChunkId) -> bool) -> Step {
        let mut blocked_at: Option<Priority> = None;

        for index in 0..self.tasks.len() {
            let task = &mut self.tasks[index];
            let priority = task.priority;
            let eligible = blocked_at.is_none_or(|lowest| lowest >= priority);

            task.chunks.retain(|&chunk| !(eligible && ready(chunk)));

            if task.chunks.is_empty() {
                let task = self.tasks.remove(index);
                return Step::Ready(task.run);
            }

            blocked_at = Some(blocked_at.map_or(priority, |lowest| lowest.min(priority)));
        }

        Step::Blocked(blocked_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Continuation {
        Box::new(|_| None)
    }

    fn priorities(queue: &DeferredQueue) -> Vec<Priority> {
        queue.tasks.iter().map(|t| t.priority).collect()
    }

    #[test]
    fn test_insert_sorted_and_stable() {
        let mut queue = DeferredQueue::new();
        queue.insert(vec![1], 5, noop());
        queue.insert(vec![2], 1, noop());
        queue.insert(vec![3], 5, noop());
        queue.insert(vec![4], 3, noop());

        assert_eq!(priorities(&queue), vec![1, 3, 5, 5]);
        assert_eq!(queue.tasks[2].chunks, vec![1]);
        assert_eq!(queue.tasks[3].chunks, vec![3]);
    }

    #[test]
    fn test_take_ready_in_priority_order() {
        let mut queue = DeferredQueue::new();
        queue.insert(vec![1], 9, noop());
        queue.insert(vec![1], 2, noop());

        assert!(matches!(queue.take_ready(|_| true), Step::Ready(_)));
        assert_eq!(priorities(&queue), vec![9]);
    }

    #[test]
    fn test_blocked_reports_lowest_priority() {
        let mut queue = DeferredQueue::new();
        queue.insert(vec![1, 2], 4, noop());
        queue.insert(vec![3], 6, noop());

        match queue.take_ready(|chunk| chunk == 1) {
            Step::Blocked(at) => assert_eq!(at, Some(4)),
            Step::Ready(_) => panic!("nothing should be ready"),
        }
        // Chunk 1 was pruned from the first gate
        assert_eq!(queue.tasks[0].chunks, vec![2]);
    }

    #[test]
    fn test_blocked_task_shields_later_priorities() {
        let mut queue = DeferredQueue::new();
        queue.insert(vec![1], 1, noop());
        queue.insert(vec![2], 5, noop());

        match queue.take_ready(|chunk| chunk == 2) {
            Step::Blocked(at) => assert_eq!(at, Some(1)),
            Step::Ready(_) => panic!("priority 5 must wait behind priority 1"),
        }
        assert_eq!(queue.tasks[1].chunks, vec![2]);
    }

    #[test]
    fn test_equal_priority_still_evaluated() {
        let mut queue = DeferredQueue::new();
        queue.insert(vec![1], 3, noop());
        queue.insert(vec![2], 3, noop());

        assert!(matches!(queue.take_ready(|chunk| chunk == 2), Step::Ready(_)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_empty_gate_runs_immediately() {
        let mut queue = DeferredQueue::new();
        queue.insert(Vec::new(), 0, noop());
        assert!(matches!(queue.take_ready(|_| false), Step::Ready(_)));
        assert!(matches!(queue.take_ready(|_| false), Step::Blocked(None)));
    }

    #[test]
    fn test_awaited_chunks() {
        let mut queue = DeferredQueue::new();
        queue.insert(vec![4, 2], 1, noop());
        queue.insert(vec![2, 7], 2, noop());
        assert_eq!(queue.awaited_chunks().into_iter().collect::<Vec<_>>(), vec![2, 4, 7]);
    }
}
