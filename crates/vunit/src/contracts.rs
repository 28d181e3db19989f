//! Bindings for the on-chain virtualization unit.
#![allow(missing_docs)]

use alloy_primitives::Address;
use alloy_sol_types::SolEvent;

use crate::TxReceipt;

alloy_sol_types::sol! {
    /// Executes composed bytecode in a fresh execution context.
    interface IVirtualizationUnit {
        /// Emitted by the constructor with the unit's own address.
        event Deployed(address indexed unit);

        /// Emitted by `execute` with the address of the new execution context.
        event Executed(address indexed context);

        function execute(bytes calldata code) external;

        function output(address context) external view returns (bytes memory result);
    }
}

/// Finds the single `E` log in `receipt` and extracts its address argument with `extract`.
///
/// Returns `None` when no log decodes as `E`. When `emitter` is set only logs from that address
/// are considered.
pub(crate) fn find_event_address<E: SolEvent>(
    receipt: &TxReceipt,
    emitter: Option<Address>,
    extract: impl Fn(&E) -> Address,
) -> Option<Address> {
    receipt
        .logs
        .iter()
        .filter(|log| emitter.is_none_or(|emitter| log.address == emitter))
        .find_map(|log| E::decode_log_data_validate(&log.data).ok())
        .map(|event| extract(&event))
}
