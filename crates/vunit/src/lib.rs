//! Bytecode composition and human-in-the-loop transaction workflows for virtualization units.
//!
//! Source is compiled off-host into a template with fixed-width argument slots
//! ([`BytecodeStructure`]); [`BytecodeComposer`] patches runtime arguments into it. The result is
//! deployed to or executed on a virtualization unit by a [`TransactionWorkflow`], which stops for
//! a gas value chosen by the user through its [`GasNegotiator`]. [`EventSyncBridge`] routes
//! presentation commands to the workflows and pushes view snapshots back.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod contracts;

mod bridge;
pub use bridge::*;

mod chain;
pub use chain::*;

mod compiler;
pub use compiler::*;

mod composer;
pub use composer::*;

mod negotiator;
pub use negotiator::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod workflow;
pub use workflow::*;
