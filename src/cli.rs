//! Command-line interface for the `bearerbox` binary.

use clap::builder::styling::{AnsiColor, Styles};
use clap::Parser;
use std::path::PathBuf;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Bearerbox: the SMS/WAP gateway message-switching core.
#[derive(Parser, Debug)]
#[command(name = "bearerbox", version, styles = styles())]
pub struct Args {
    /// Path to the bearerbox TOML configuration file.
    #[arg(short, long, default_value = "bearerbox.toml")]
    pub config: PathBuf,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress the colorized stdout log stream; file/stderr logging is unaffected.
    #[arg(short, long)]
    pub quiet: bool,

    /// Write detailed logs to this file instead of stderr ("stderr" keeps them on stderr).
    #[arg(long)]
    pub log_file: Option<String>,

    /// Validate configuration and exit without starting any listeners.
    #[arg(long)]
    pub check_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let args = Args::parse_from(["bearerbox"]);
        assert_eq!(args.config, PathBuf::from("bearerbox.toml"));
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn parses_verbosity_count() {
        let args = Args::parse_from(["bearerbox", "-vv"]);
        assert_eq!(args.verbose, 2);
    }
}
