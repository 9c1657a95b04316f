//! Document-grounded chat built on the core clients

pub mod assistant;
pub mod prompt;

pub use assistant::{AskOptions, Assistant, ChatTurn};
pub use prompt::PromptStyle;
