//! Task model, world snapshot and schema gate

pub mod context;
pub mod schema;
pub mod types;

pub use context::{ContextProvider, StaticContextProvider, TaskContext};
pub use schema::{BasicSchemaValidator, FieldViolation, SchemaValidator};
pub use types::{Command, Task, TaskDraft, TaskId, TaskOrigin, TaskParameters, TaskPriority, TaskType};
