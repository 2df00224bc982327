use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::scheduler::task::Task;

/// Create a dispatch queue holding at most one task per pipeline.
///
/// `capacity` is the pipeline count. Since every pipeline has at most one
/// outstanding task, the queue never holds more than that.
pub fn task_queue(capacity: usize) -> (TaskSender, TaskReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            order: VecDeque::with_capacity(capacity),
            tasks: HashMap::with_capacity(capacity),
        }),
        notify: Notify::new(),
    });
    (
        TaskSender {
            shared: shared.clone(),
        },
        TaskReceiver { shared },
    )
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO of pipeline IDs plus the current task for each.
struct QueueState {
    order: VecDeque<u64>,
    tasks: HashMap<u64, Task>,
}

impl QueueState {
    /// Merge `task` into the queue. Returns false if it was folded into an
    /// already queued task for the same pipeline.
    ///
    /// A targeted task replaces whatever is queued. A "place anywhere" task
    /// never displaces a targeted one, which also places an unowned pipeline.
    fn merge(&mut self, task: Task) -> bool {
        match self.tasks.get_mut(&task.pipeline_id) {
            Some(queued) => {
                if task.is_targeted() {
                    *queued = task;
                }
                false
            }
            None => {
                self.order.push_back(task.pipeline_id);
                self.tasks.insert(task.pipeline_id, task);
                true
            }
        }
    }

    fn pop(&mut self) -> Option<Task> {
        while let Some(pipeline_id) = self.order.pop_front() {
            if let Some(task) = self.tasks.remove(&pipeline_id) {
                return Some(task);
            }
        }
        None
    }
}

/// Producer side; cloned into every path that releases or moves pipelines.
#[derive(Clone)]
pub struct TaskSender {
    shared: Arc<Shared>,
}

impl TaskSender {
    /// Queue `task`, keeping its place in line if the pipeline already has
    /// an outstanding task.
    pub fn submit(&self, task: Task) {
        let queued = self.shared.state().merge(task);
        if queued {
            self.shared.notify.notify_one();
        }
    }

    /// Tasks waiting to be attempted, including retries.
    pub fn pending(&self) -> usize {
        self.shared.state().tasks.len()
    }
}

/// Consumer side, owned by the single dispatch worker.
pub struct TaskReceiver {
    shared: Arc<Shared>,
}

impl TaskReceiver {
    /// Next task in FIFO order. Waits while nothing is queued.
    ///
    /// Cancel safe: dropping the future loses no task.
    pub async fn next(&mut self) -> Task {
        loop {
            let next = self.shared.state().pop();
            if let Some(task) = next {
                return task;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Put a failed task at the tail of the queue. If the pipeline was
    /// queued again while the task was being attempted, the newer task wins.
    pub fn requeue(&mut self, task: Task) {
        let mut state = self.shared.state();
        if !state.tasks.contains_key(&task.pipeline_id) {
            state.merge(task);
        }
    }
}
