//! Argument-slot patching for compiled bytecode templates.
//!
//! A compiled template reserves `nargs` fixed-width slots. Slot `i` is marked by the big-endian
//! encoding of `key + i`, left-padded to the slot width. Composition replaces each marker with the
//! matching runtime argument, encoded the same way. All markers are located against the
//! unmodified template first, so one substitution can never disturb another slot's lookup.

use core::fmt;

use alloy_primitives::{hex, Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, trace};

/// Compiled template as returned by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeStructure {
    /// Hex-encoded template, with or without `0x` prefix.
    pub bytecode: String,
    /// Marker value of slot 0. Decimal unless `0x`-prefixed.
    #[serde(deserialize_with = "deserialize_key")]
    pub key: String,
    /// Number of argument slots the template reserves.
    pub nargs: usize,
}

impl BytecodeStructure {
    /// Parses [`Self::key`] into an integer.
    pub fn parse_key(&self) -> Result<U256, ComposeError> {
        parse_key(&self.key)
    }
}

/// Accepts the key either as a JSON string or as a JSON number.
fn deserialize_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KeyRepr {
        Text(String),
        Number(u64),
    }

    Ok(match KeyRepr::deserialize(deserializer)? {
        KeyRepr::Text(text) => text,
        KeyRepr::Number(number) => number.to_string(),
    })
}

/// Width of one argument slot. This is agreed with the compiler, never inferred from a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotWidth {
    /// 16 bytes (32 hex characters).
    Bytes16,
    /// 32 bytes (64 hex characters), one EVM word.
    #[default]
    Bytes32,
}

impl SlotWidth {
    /// Slot width in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::Bytes16 => 16,
            Self::Bytes32 => 32,
        }
    }

    /// Slot width in hex characters.
    pub const fn hex_chars(self) -> usize {
        self.bytes() * 2
    }

    /// Maps a byte width to a supported slot width.
    pub const fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            16 => Some(Self::Bytes16),
            32 => Some(Self::Bytes32),
            _ => None,
        }
    }
}

/// How the compiler delivers the template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotEncoding {
    /// Template bytes are the final bytecode apart from the slots.
    #[default]
    Plain,
    /// Every template byte is XORed with `0xFF`. Markers and values are located and written in
    /// obfuscated form and the whole buffer is restored once at the end.
    Obfuscated,
}

/// Composer settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposerConfig {
    /// Slot width reserved by the compiler.
    pub width: SlotWidth,
    /// Template encoding.
    pub encoding: SlotEncoding,
}

/// Errors raised while composing bytecode. All of them mean the structure must be recompiled or
/// the arguments fixed; none is transient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    /// The argument count differs from the number of slots in the template.
    #[error("expected {expected} arguments, got {actual}")]
    ArgumentCountMismatch {
        /// Slots reserved by the template
        expected: usize,
        /// Arguments supplied
        actual: usize,
    },
    /// A slot marker does not occur in the template.
    #[error("marker {marker} for slot {index} not found in template")]
    PatchTargetNotFound {
        /// Slot index
        index: usize,
        /// Hex marker that was searched for
        marker: String,
    },
    /// A slot marker occurs more than once in the template.
    #[error("marker {marker} for slot {index} occurs more than once in template")]
    AmbiguousPatchTarget {
        /// Slot index
        index: usize,
        /// Hex marker that was searched for
        marker: String,
    },
    /// Two slots share template bytes.
    #[error("slots {first} and {second} overlap")]
    OverlappingSlots {
        /// Lower slot index
        first: usize,
        /// Higher slot index
        second: usize,
    },
    /// An argument does not fit in the slot width.
    #[error("argument {index} does not fit in a {width}-byte slot")]
    ArgumentOverflow {
        /// Argument index
        index: usize,
        /// Slot width in bytes
        width: usize,
    },
    /// The template is not valid hex.
    #[error("invalid template bytecode: {0}")]
    InvalidBytecode(String),
    /// The key is not an integer, or `key + i` does not fit in the slot width.
    #[error("invalid slot key: {0}")]
    InvalidKey(String),
}

/// Final executable bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Deref, derive_more::Into)]
pub struct ComposedInput(Bytes);

impl ComposedInput {
    /// Raw bytes of the composed bytecode.
    pub const fn bytes(&self) -> &Bytes {
        &self.0
    }
}

impl fmt::Display for ComposedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(&self.0))
    }
}

impl Serialize for ComposedInput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Patches runtime arguments into compiled templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytecodeComposer {
    config: ComposerConfig,
}

impl BytecodeComposer {
    /// Creates a composer for the given protocol settings.
    pub const fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    /// Returns the composer settings.
    pub const fn config(&self) -> ComposerConfig {
        self.config
    }

    /// Composes the final bytecode for `args`.
    ///
    /// Exactly `structure.nargs` slot ranges change; every other byte matches the template
    /// (after de-obfuscation for [`SlotEncoding::Obfuscated`] templates).
    pub fn compose(
        &self,
        structure: &BytecodeStructure,
        args: &[U256],
    ) -> Result<ComposedInput, ComposeError> {
        if args.len() != structure.nargs {
            return Err(ComposeError::ArgumentCountMismatch {
                expected: structure.nargs,
                actual: args.len(),
            });
        }

        let mut buffer = decode_template(&structure.bytecode)?;
        let offsets = self.locate(&buffer, structure)?;
        let width = self.config.width.bytes();

        for (index, (offset, arg)) in offsets.iter().zip(args).enumerate() {
            let slot = self.encode_slot(*arg).ok_or(ComposeError::ArgumentOverflow { index, width })?;
            trace!(index, offset, "Patching slot");
            buffer[*offset..*offset + width].copy_from_slice(&slot);
        }

        if self.config.encoding == SlotEncoding::Obfuscated {
            flip(&mut buffer);
        }

        debug!(nargs = structure.nargs, len = buffer.len(), "Composed bytecode");
        Ok(ComposedInput(buffer.into()))
    }

    /// Byte offsets of every slot in the template, in slot order.
    pub fn slot_offsets(&self, structure: &BytecodeStructure) -> Result<Vec<usize>, ComposeError> {
        let buffer = decode_template(&structure.bytecode)?;
        self.locate(&buffer, structure)
    }

    /// Reads the arguments back out of composed bytecode.
    pub fn extract_args(
        &self,
        structure: &BytecodeStructure,
        composed: &ComposedInput,
    ) -> Result<Vec<U256>, ComposeError> {
        let width = self.config.width.bytes();
        self.slot_offsets(structure)?
            .into_iter()
            .map(|offset| {
                composed.get(offset..offset + width).map(U256::from_be_slice).ok_or_else(|| {
                    ComposeError::InvalidBytecode(format!(
                        "composed bytecode is {} bytes, slot ends at {}",
                        composed.len(),
                        offset + width
                    ))
                })
            })
            .collect()
    }

    fn locate(
        &self,
        template: &[u8],
        structure: &BytecodeStructure,
    ) -> Result<Vec<usize>, ComposeError> {
        let key = structure.parse_key()?;
        let width = self.config.width.bytes();

        let mut offsets = Vec::with_capacity(structure.nargs);
        for index in 0..structure.nargs {
            let value = key
                .checked_add(U256::from(index))
                .ok_or_else(|| ComposeError::InvalidKey(format!("{key} + {index} overflows")))?;
            let marker = self.encode_slot(value).ok_or_else(|| {
                ComposeError::InvalidKey(format!("{value} does not fit in a {width}-byte slot"))
            })?;

            let mut matches =
                template.windows(width).enumerate().filter(|(_, window)| *window == marker.as_slice());
            let offset = match (matches.next(), matches.next()) {
                (Some((offset, _)), None) => offset,
                (None, _) => {
                    return Err(ComposeError::PatchTargetNotFound {
                        index,
                        marker: hex::encode(&marker),
                    })
                }
                (Some(_), Some(_)) => {
                    return Err(ComposeError::AmbiguousPatchTarget {
                        index,
                        marker: hex::encode(&marker),
                    })
                }
            };
            offsets.push(offset);
        }

        let mut ordered: Vec<_> = offsets.iter().copied().enumerate().collect();
        ordered.sort_by_key(|(_, offset)| *offset);
        for pair in ordered.windows(2) {
            let ((a, lo), (b, hi)) = (pair[0], pair[1]);
            if hi - lo < width {
                return Err(ComposeError::OverlappingSlots { first: a.min(b), second: a.max(b) });
            }
        }

        Ok(offsets)
    }

    /// Encodes `value` as a slot in the template's encoding, or `None` if it does not fit.
    fn encode_slot(&self, value: U256) -> Option<Vec<u8>> {
        let width = self.config.width.bytes();
        let word = value.to_be_bytes::<32>();
        let (high, low) = word.split_at(32 - width);
        if high.iter().any(|byte| *byte != 0) {
            return None;
        }

        let mut slot = low.to_vec();
        if self.config.encoding == SlotEncoding::Obfuscated {
            flip(&mut slot);
        }
        Some(slot)
    }
}

/// Parses a slot key: decimal, or hex with a `0x` prefix.
pub fn parse_key(key: &str) -> Result<U256, ComposeError> {
    let key = key.trim();
    let parsed = match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        Some(digits) => U256::from_str_radix(digits, 16),
        None => U256::from_str_radix(key, 10),
    };
    parsed.map_err(|e| ComposeError::InvalidKey(format!("'{key}': {e}")))
}

fn decode_template(bytecode: &str) -> Result<Vec<u8>, ComposeError> {
    hex::decode(bytecode.trim()).map_err(|e| ComposeError::InvalidBytecode(e.to_string()))
}

fn flip(buffer: &mut [u8]) {
    buffer.iter_mut().for_each(|byte| *byte ^= 0xFF);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u64, width: SlotWidth) -> Vec<u8> {
        U256::from(value).to_be_bytes::<32>()[32 - width.bytes()..].to_vec()
    }

    /// `aa` prefix, slot for 0x10, `bb` separator, slot for 0x11, `cc` suffix.
    fn template(width: SlotWidth) -> Vec<u8> {
        let mut code = vec![0x60, 0xaa, 0x50];
        code.extend(word(0x10, width));
        code.extend([0xbb, 0xbb]);
        code.extend(word(0x11, width));
        code.extend([0xcc, 0x00]);
        code
    }

    fn structure(code: &[u8], key: &str, nargs: usize) -> BytecodeStructure {
        BytecodeStructure { bytecode: hex::encode_prefixed(code), key: key.to_string(), nargs }
    }

    #[test]
    fn test_compose_replaces_both_slots() {
        let code = template(SlotWidth::Bytes32);
        let structure = structure(&code, "0x10", 2);
        let composer = BytecodeComposer::default();

        let composed = composer.compose(&structure, &[U256::from(5), U256::from(9)]).unwrap();

        let mut expected = vec![0x60, 0xaa, 0x50];
        expected.extend(word(5, SlotWidth::Bytes32));
        expected.extend([0xbb, 0xbb]);
        expected.extend(word(9, SlotWidth::Bytes32));
        expected.extend([0xcc, 0x00]);
        assert_eq!(composed.bytes().as_ref(), expected.as_slice());
        assert!(composed.to_string().starts_with("0x60aa50"));
        assert_eq!(composed.len(), code.len());
    }

    #[test]
    fn test_decimal_key_matches_hex_key() {
        let code = template(SlotWidth::Bytes32);
        let composer = BytecodeComposer::default();
        let args = [U256::from(1), U256::from(2)];

        let hex_key = composer.compose(&structure(&code, "0x10", 2), &args).unwrap();
        let dec_key = composer.compose(&structure(&code, "16", 2), &args).unwrap();
        assert_eq!(hex_key, dec_key);
    }

    #[test]
    fn test_compose_is_idempotent() {
        let code = template(SlotWidth::Bytes32);
        let structure = structure(&code, "16", 2);
        let composer = BytecodeComposer::default();
        let args = [U256::from(7), U256::MAX];

        let first = composer.compose(&structure, &args).unwrap();
        let second = composer.compose(&structure, &args).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_slot_isolation() {
        let code = template(SlotWidth::Bytes32);
        let structure = structure(&code, "16", 2);
        let composer = BytecodeComposer::default();
        let offsets = composer.slot_offsets(&structure).unwrap();
        assert_eq!(offsets, vec![3, 37]);

        let composed = composer.compose(&structure, &[U256::from(0xdead), U256::from(0xbeef)]).unwrap();
        for (i, (before, after)) in code.iter().zip(composed.iter()).enumerate() {
            let in_slot = offsets.iter().any(|o| (*o..*o + 32).contains(&i));
            if !in_slot {
                assert_eq!(before, after, "byte {i} outside slots changed");
            }
        }
    }

    #[test]
    fn test_round_trip() {
        let code = template(SlotWidth::Bytes16);
        let structure = structure(&code, "16", 2);
        let composer =
            BytecodeComposer::new(ComposerConfig { width: SlotWidth::Bytes16, ..Default::default() });
        let args = vec![U256::from(42), U256::from(u128::MAX)];

        let composed = composer.compose(&structure, &args).unwrap();
        assert_eq!(composer.extract_args(&structure, &composed).unwrap(), args);
    }

    #[test]
    fn test_argument_count_mismatch() {
        let code = template(SlotWidth::Bytes32);
        let structure = structure(&code, "16", 2);
        let err = BytecodeComposer::default().compose(&structure, &[U256::from(1)]).unwrap_err();
        assert_eq!(err, ComposeError::ArgumentCountMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn test_missing_marker() {
        let code = template(SlotWidth::Bytes32);
        let structure = structure(&code, "0x11", 2);
        let err = BytecodeComposer::default()
            .compose(&structure, &[U256::from(1), U256::from(2)])
            .unwrap_err();
        assert!(matches!(err, ComposeError::PatchTargetNotFound { index: 1, .. }));
    }

    #[test]
    fn test_duplicate_marker() {
        let mut code = template(SlotWidth::Bytes32);
        code.extend(word(0x10, SlotWidth::Bytes32));
        let structure = structure(&code, "0x10", 2);
        let err = BytecodeComposer::default()
            .compose(&structure, &[U256::from(1), U256::from(2)])
            .unwrap_err();
        assert!(matches!(err, ComposeError::AmbiguousPatchTarget { index: 0, .. }));
    }

    #[test]
    fn test_argument_overflow_in_narrow_slot() {
        let code = template(SlotWidth::Bytes16);
        let structure = structure(&code, "16", 2);
        let composer =
            BytecodeComposer::new(ComposerConfig { width: SlotWidth::Bytes16, ..Default::default() });
        let too_big = U256::from(u128::MAX) + U256::from(1);

        let err = composer.compose(&structure, &[U256::from(1), too_big]).unwrap_err();
        assert_eq!(err, ComposeError::ArgumentOverflow { index: 1, width: 16 });
    }

    #[test]
    fn test_obfuscated_template() {
        let plain = template(SlotWidth::Bytes32);
        let obfuscated: Vec<u8> = plain.iter().map(|b| b ^ 0xFF).collect();
        let args = [U256::from(5), U256::from(9)];

        let from_plain =
            BytecodeComposer::default().compose(&structure(&plain, "16", 2), &args).unwrap();
        let from_obfuscated = BytecodeComposer::new(ComposerConfig {
            encoding: SlotEncoding::Obfuscated,
            ..Default::default()
        })
        .compose(&structure(&obfuscated, "16", 2), &args)
        .unwrap();

        assert_eq!(from_plain, from_obfuscated);
    }

    #[test]
    fn test_zero_slots_returns_template() {
        let code = vec![0x60, 0x00, 0x60, 0x00, 0xf3];
        let composed =
            BytecodeComposer::default().compose(&structure(&code, "1", 0), &[]).unwrap();
        assert_eq!(composed.bytes().as_ref(), code.as_slice());
    }

    #[test]
    fn test_invalid_inputs() {
        let composer = BytecodeComposer::default();
        let bad_hex = BytecodeStructure { bytecode: "0xzz".into(), key: "1".into(), nargs: 0 };
        assert!(matches!(composer.compose(&bad_hex, &[]), Err(ComposeError::InvalidBytecode(_))));

        let bad_key = BytecodeStructure { bytecode: "0x00".into(), key: "ten".into(), nargs: 1 };
        assert!(matches!(
            composer.compose(&bad_key, &[U256::ZERO]),
            Err(ComposeError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_structure_accepts_numeric_key() {
        let structure: BytecodeStructure =
            serde_json::from_str(r#"{"bytecode":"0x00","key":16,"nargs":1}"#).unwrap();
        assert_eq!(structure.key, "16");
        assert_eq!(structure.parse_key().unwrap(), U256::from(16));
    }
}
