//! CLI command implementations

pub mod download;
pub mod error;
pub mod prompts;

pub use download::{format_summary, Cli, RunRequest, SpinnerProgress};
pub use error::CliError;
pub use prompts::{PromptAnswers, Questioner, StdinQuestioner};
