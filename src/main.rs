//! # Command Line Interface
//! 
//! The subcommands are defined in `cli.rs` and run by the `commands` module.

mod cli;

use env_logger;
#[cfg(windows)]
use colored;
use log::error;
use ps2kit::commands;
use ps2kit::commands::CommandError;

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).unwrap_or(());

    let matches = cli::build_cli().get_matches();

    // Create a card image
    if let Some(cmd) = matches.subcommand_matches("mkcard") {
        return commands::mkcard::mkcard(cmd);
    }

    // Listings and statistics
    if let Some(cmd) = matches.subcommand_matches("ls") {
        return commands::catalog::catalog(cmd);
    }
    if let Some(cmd) = matches.subcommand_matches("df") {
        return commands::catalog::df(cmd);
    }
    if let Some(cmd) = matches.subcommand_matches("stat") {
        return commands::catalog::stat(cmd);
    }

    // Moving saves on and off the card
    if let Some(cmd) = matches.subcommand_matches("import") {
        return commands::saves::import(cmd);
    }
    if let Some(cmd) = matches.subcommand_matches("export") {
        return commands::saves::export(cmd);
    }
    if let Some(cmd) = matches.subcommand_matches("delete") {
        return commands::saves::delete(cmd);
    }

    // Maintenance
    if let Some(cmd) = matches.subcommand_matches("check") {
        return commands::check::check(cmd);
    }
    if let Some(cmd) = matches.subcommand_matches("ecc") {
        return commands::check::ecc(cmd);
    }

    // Shell completions
    if let Some(cmd) = matches.subcommand_matches("completions") {
        return commands::completions::generate(cli::build_cli(),cmd);
    }

    error!("No subcommand was found, try `ps2kit --help`");
    return Err(Box::new(CommandError::InvalidCommand));
}
