//! Hex loading utilities for vunit

use std::{fs, io::Read};

use alloy_primitives::{hex, Bytes};

use super::{CliError, Result};

/// Load hex-encoded bytes from an argument or a file. If the file is a dash (-), read from stdin.
/// Priority: arg > file. Returns `None` if neither is provided.
pub fn load_hex(arg: Option<&str>, file: Option<&str>) -> Result<Option<Bytes>> {
    let hex_string = match (arg, file) {
        (Some(arg), _) => arg.to_string(),
        (None, Some("-")) => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        (None, Some(file)) => fs::read_to_string(file)?,
        (None, None) => return Ok(None),
    };

    decode_hex(&hex_string).map(|bytes| Some(Bytes::from(bytes)))
}

/// Decode hex string, handling optional 0x prefix
fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let hex_str = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);

    if hex_str.len() % 2 != 0 {
        return Err(CliError::InvalidInput(format!(
            "Invalid hex string length: {} (must be even)",
            hex_str.len()
        )));
    }

    Ok(hex::decode(hex_str)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_hex() {
        assert_eq!(load_hex(None, None).unwrap(), None);
        assert_eq!(
            load_hex(Some("0x6080"), Some("ignored")).unwrap(),
            Some(Bytes::from_static(&[0x60, 0x80]))
        );
        assert_eq!(load_hex(Some(""), None).unwrap(), Some(Bytes::new()));
        assert!(matches!(load_hex(Some("0x608"), None), Err(CliError::InvalidInput(_))));
        assert!(matches!(load_hex(Some("zz"), None), Err(CliError::InvalidHex(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  0X6080604052 ").unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(
            load_hex(None, Some(path)).unwrap(),
            Some(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]))
        );
    }
}
