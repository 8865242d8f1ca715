//! Domain types shared by the scheduler and its callers

mod id;
mod priority;
mod task;

pub(crate) use id::IdAllocator;
pub use id::TaskId;
pub use priority::Priority;
pub use task::{Metadata, TaskOptions, TaskStatus};
