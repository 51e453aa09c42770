pub mod execution;
pub mod message;
pub mod user;

pub use execution::{Execution, ExecutionType};
pub use message::{Message, MessageRole};
pub use user::User;
