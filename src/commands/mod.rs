//! # CLI Subcommands
//! 
//! Contains modules that run the subcommands.

pub mod mkcard;
pub mod catalog;
pub mod saves;
pub mod check;
pub mod completions;

#[derive(thiserror::Error,Debug)]
pub enum CommandError {
    #[error("Command could not be interpreted")]
    InvalidCommand,
    #[error("One of the parameters was out of range")]
    OutOfRange,
    #[error("File not found")]
    FileNotFound
}
