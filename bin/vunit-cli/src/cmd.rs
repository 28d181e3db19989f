use clap::Parser;

/// Main command enumeration for the vunit CLI tool
#[derive(Parser, Debug)]
#[command(name = "vunit", infer_subcommands = true, version = "0.1")]
pub enum MainCmd {
    /// Serve a line-delimited JSON session on stdin/stdout
    Session(crate::session::Cmd),
    /// Patch arguments into a compiled bytecode template
    Compose(crate::compose::Cmd),
}

/// Error types for the main command system
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error raised by a command
    #[error("{0}")]
    Cli(#[from] crate::common::CliError),
}

impl MainCmd {
    /// Execute the main command
    pub fn run(&self) -> Result<(), Error> {
        match self {
            Self::Session(cmd) => cmd.run()?,
            Self::Compose(cmd) => cmd.run()?,
        }
        Ok(())
    }
}
