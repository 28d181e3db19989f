//! Inbound command envelopes.

use core::str::FromStr;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize};

use super::BridgeError;

/// Wire form of one inbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Command name
    pub command: String,
    /// Optional argument. Non-string JSON values are kept as their JSON text.
    #[serde(default, deserialize_with = "deserialize_value", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl CommandEnvelope {
    /// Envelope for `command` with `value`.
    pub fn new(command: impl Into<String>, value: Option<&str>) -> Self {
        Self { command: command.into(), value: value.map(str::to_string) }
    }
}

fn deserialize_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// A parsed inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Compile the current file with this many entrypoint arguments
    Compile(usize),
    /// Compose these arguments and start an execution
    Estimate(Vec<U256>),
    /// Supply gas to the execution workflow
    Execute(u64),
    /// Start a deployment
    Deploy,
    /// Supply gas to the deployment workflow
    Send(u64),
    /// Abort the compile in flight
    CancelCompile,
    /// Cancel or clear the execution workflow
    CancelExecution,
    /// Clear the deployment workflow
    ClearDeployment,
    /// Select the target contract
    SetContract(Address),
}

impl Command {
    /// Wire name of the command.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Compile(_) => "compile",
            Self::Estimate(_) => "estimate",
            Self::Execute(_) => "execute",
            Self::Deploy => "deploy",
            Self::Send(_) => "send",
            Self::CancelCompile => "cancelCompile",
            Self::CancelExecution => "cancelExecution",
            Self::ClearDeployment => "clearDeployment",
            Self::SetContract(_) => "setContract",
        }
    }
}

impl TryFrom<&CommandEnvelope> for Command {
    type Error = BridgeError;

    fn try_from(envelope: &CommandEnvelope) -> Result<Self, Self::Error> {
        let value = envelope.value.as_deref().map(str::trim);
        Ok(match envelope.command.as_str() {
            "compile" => {
                let value = required("compile", value)?;
                Self::Compile(value.parse().map_err(|e| invalid("compile", value, e))?)
            }
            "estimate" => Self::Estimate(parse_args(required("estimate", value)?)?),
            "execute" => Self::Execute(parse_gas("execute", required("execute", value)?)?),
            "deploy" => Self::Deploy,
            "send" => Self::Send(parse_gas("send", required("send", value)?)?),
            "cancelCompile" => Self::CancelCompile,
            "cancelExecution" => Self::CancelExecution,
            "clearDeployment" => Self::ClearDeployment,
            "setContract" => {
                let value = required("setContract", value)?;
                Self::SetContract(
                    Address::from_str(value).map_err(|e| invalid("setContract", value, e))?,
                )
            }
            other => return Err(BridgeError::UnknownCommand(other.to_string())),
        })
    }
}

fn required<'a>(command: &'static str, value: Option<&'a str>) -> Result<&'a str, BridgeError> {
    value.filter(|value| !value.is_empty()).ok_or(BridgeError::MissingValue { command })
}

fn invalid(command: &'static str, value: &str, reason: impl ToString) -> BridgeError {
    BridgeError::InvalidValue { command, value: value.to_string(), reason: reason.to_string() }
}

/// Gas values are decimal, or hex with a `0x` prefix.
fn parse_gas(command: &'static str, value: &str) -> Result<u64, BridgeError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| invalid(command, value, e))
}

/// Parses entrypoint arguments: a JSON array whose items are unsigned integers, or strings
/// holding one in decimal or `0x` hex.
pub fn parse_args(value: &str) -> Result<Vec<U256>, BridgeError> {
    let items: Vec<serde_json::Value> =
        serde_json::from_str(value).map_err(|e| invalid("estimate", value, e))?;
    items
        .iter()
        .map(|item| match item {
            serde_json::Value::Number(number) => number
                .as_u64()
                .map(U256::from)
                .ok_or_else(|| invalid("estimate", &number.to_string(), "not an unsigned integer")),
            serde_json::Value::String(text) => {
                U256::from_str(text.trim()).map_err(|e| invalid("estimate", text, e))
            }
            other => Err(invalid("estimate", &other.to_string(), "not an integer")),
        })
        .collect()
}
