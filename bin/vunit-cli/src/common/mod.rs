mod args;
mod compiler;
mod error;
mod hex;
mod logging;
mod provider;
mod source;

pub use args::*;
pub use compiler::*;
pub use error::*;
pub use hex::*;
pub use logging::*;
pub use provider::*;
pub use source::*;
