pub mod context;
pub mod error;
pub mod value;

pub use context::ExecutionContext;
pub use error::{InteractionVeto, Result, StoreError};
pub use value::{Value, ValueType};
