//! Library for the proptree CLI: the configuration console, the `.properties`
//! interchange format and terminal output.

pub mod archive;
pub mod commands;
pub mod console;
pub mod output;
pub mod properties;

pub use console::{ConfigConsole, ImportSummary, PairedWrite};
pub use output::OutputFormat;
