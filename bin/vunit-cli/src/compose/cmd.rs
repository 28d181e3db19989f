use std::{fs, io::Read};

use clap::Parser;
use tracing::info;
use vunit::{parse_args, BytecodeComposer, BytecodeStructure, ComposedInput};

use crate::common::{ComposerArgs, LogArgs, Result};

/// Patch arguments into a compiled bytecode template
#[derive(Parser, Debug)]
pub struct Cmd {
    /// JSON file with the compiled structure (`{bytecode, key, nargs}`). `-` reads stdin.
    #[arg(long = "structure", value_name = "FILE")]
    pub structure: String,

    /// Entrypoint arguments as a JSON array of integers
    #[arg(long = "args", value_name = "JSON", default_value = "[]")]
    pub args: String,

    /// Slot layout
    #[command(flatten)]
    pub composer_args: ComposerArgs,

    /// Logging configuration
    #[command(flatten)]
    pub log_args: LogArgs,
}

impl Cmd {
    /// Execute the compose command, printing the composed bytecode.
    pub fn run(&self) -> Result<()> {
        self.log_args.init()?;
        println!("{}", self.compose()?);
        Ok(())
    }

    /// Composes the structure with the arguments.
    pub fn compose(&self) -> Result<ComposedInput> {
        let structure = self.load_structure()?;
        let args = parse_args(&self.args)?;
        let composer = BytecodeComposer::new(self.composer_args.config()?);
        let input = composer.compose(&structure, &args)?;
        info!(nargs = structure.nargs, len = input.len(), "Composed");
        Ok(input)
    }

    fn load_structure(&self) -> Result<BytecodeStructure> {
        let json = if self.structure == "-" {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        } else {
            fs::read_to_string(&self.structure)?
        };
        Ok(serde_json::from_str(&json)?)
    }
}
