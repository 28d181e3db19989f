//! In-memory collaborators for tests.

mod chain;
mod compiler;

pub use chain::*;
pub use compiler::*;

use alloy_primitives::{hex, U256};

use crate::BytecodeStructure;

/// A template with one 32-byte slot per argument, keyed from `key`, separated by filler bytes.
pub fn slotted_template(key: u64, nargs: usize) -> BytecodeStructure {
    let mut code = vec![0x60, 0x80, 0x60, 0x40];
    for i in 0..nargs {
        code.extend_from_slice(&U256::from(key + i as u64).to_be_bytes::<32>());
        code.extend_from_slice(&[0x50, 0x5b]);
    }
    code.push(0x00);
    BytecodeStructure { bytecode: hex::encode_prefixed(code), key: key.to_string(), nargs }
}
