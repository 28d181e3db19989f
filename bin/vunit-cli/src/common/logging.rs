//! Logging configuration for the vunit CLI tool.
//!
//! Logs never go to stdout, which carries the session's JSON stream.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use super::Result;

/// Logging configuration arguments.
#[derive(Debug, Clone, Default, Parser)]
#[command(next_help_heading = "Logging Options")]
pub struct LogArgs {
    /// Increase logging verbosity (-v = error, -vv = warn, -vvv = info, -vvvv = debug, -vvvvv =
    /// trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log file path. If specified, logs are written to this file instead of stderr.
    #[arg(long = "log.file", visible_aliases = ["log-file"], global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable colorful console logging. Only applies when logging to stderr (no --log.file).
    #[arg(long = "log.no-color", visible_aliases = ["log-no-color"], global = true)]
    pub log_no_color: bool,
}

impl LogArgs {
    /// Initialize the tracing subscriber.
    ///
    /// `RUST_LOG` wins over `-v`; without either nothing is logged. The log target is shown from
    /// DEBUG on.
    pub fn init(&self) -> Result<()> {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.directives())
        };
        let show_target = self.verbose >= 4;

        if let Some(ref log_file) = self.log_file {
            let file = std::fs::File::create(log_file)?;
            fmt()
                .with_env_filter(filter)
                .with_target(show_target)
                .with_writer(file)
                .with_ansi(false)
                .init();
        } else {
            fmt()
                .with_env_filter(filter)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .with_ansi(!self.log_no_color)
                .init();
        }
        Ok(())
    }

    /// Filter directives for the verbosity level.
    fn directives(&self) -> String {
        let level = match self.verbose {
            0 => return "off".to_string(),
            1 => Level::ERROR,
            2 => Level::WARN,
            3 => Level::INFO,
            4 => Level::DEBUG,
            _ => Level::TRACE,
        };
        format!("vunit={level},vunit_cli={level}")
    }
}
