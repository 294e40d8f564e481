/// Process execution and scoped file helpers
pub mod command;
pub mod scoped;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandBuilder, CommandOutput, Executor, SystemExecutor};
pub use scoped::ScopedFile;
