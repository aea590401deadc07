//! Shared FIFO task queue.
//!
//! Seeded once with every task followed by one [`QueueItem::Stop`] per worker, so
//! each worker exits only after all tasks ahead of the sentinels have been taken.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::types::Task;

/// An entry in the task queue
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum QueueItem {
    Task(Task),
    /// Tells the worker that pops it to exit
    Stop,
}

pub(crate) struct TaskQueue {
    items: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append `items` in order and wake waiting workers
    pub(crate) async fn extend(&self, items: impl IntoIterator<Item = QueueItem>) {
        let added = {
            let mut queue = self.items.lock().await;
            let before = queue.len();
            queue.extend(items);
            queue.len() - before
        };
        for _ in 0..added {
            self.notify.notify_one();
        }
    }

    /// Pop the front item, waiting up to `timeout` for one to arrive
    pub(crate) async fn pop(&self, timeout: Duration) -> Option<QueueItem> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between is not missed
            let notified = self.notify.notified();
            if let Some(item) = self.items.lock().await.pop_front() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}
