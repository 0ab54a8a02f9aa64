pub mod builder;
pub mod checkpoint;
pub mod resolver;

pub use builder::DuplicateSetBuilder;
pub use checkpoint::Checkpoint;
pub use resolver::{apply_selections, DuplicateResolver, Prompt, Resolution, TerminalPrompt};
