//! Engine module: CLI parsing, command handling and progress display

pub mod arg_parser;
pub mod cli;
pub mod progress;

pub use arg_parser::{Cli, FieldKind};
pub use cli::{RunSettings, handle_run};
