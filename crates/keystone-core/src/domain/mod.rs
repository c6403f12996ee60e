//! Domain model (IDs, statuses, task records, chain and replicate views, events).

pub mod chain;
pub mod command;
pub mod errors;
pub mod events;
pub mod ids;
pub mod replicate;
pub mod status;
pub mod task;

pub use chain::{ChainReceipt, ChainTask, ChainTaskStatus};
pub use command::{ChainCommand, CommandKind, CommandOutcome, CommandStatus, PendingCommand};
pub use errors::{ErrorKind, KeystoneError, Result};
pub use events::TaskEvent;
pub use ids::{ChainDealId, ChainTaskId, TaskId, WalletAddress};
pub use replicate::{Replicate, ReplicateStatus};
pub use status::TaskStatus;
pub use task::{NewTask, Task, TaskStatusChange};
