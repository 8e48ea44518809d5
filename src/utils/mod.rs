pub mod debounce;
pub mod exclusive_flag;
pub mod task_queue;

pub use debounce::{Debouncer, TimerState};
pub use exclusive_flag::{ExclusiveFlag, FlagGuard};
pub use task_queue::{RoomTaskQueue, Task, TaskKind};
