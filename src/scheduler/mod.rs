//! Pipeline registry and the single dispatch worker that places pipelines.

pub mod manager;
pub mod pipeline;
pub mod queue;
pub mod task;

pub use manager::PipelineManager;
pub use pipeline::Pipeline;
pub use queue::{task_queue, TaskReceiver, TaskSender};
pub use task::Task;
