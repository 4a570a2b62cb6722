use std::num::ParseIntError;

use thiserror::Error;

/// Prefix used by the node for quantities (`0x1b4`).
pub const HEX_PREFIX: &str = "0x";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexIntError {
    #[error("hex quantity `{0}` is missing the `0x` prefix")]
    MissingPrefix(String),
    #[error("invalid hex quantity `{raw}`: {source}")]
    Invalid {
        raw: String,
        #[source]
        source: ParseIntError,
    },
}

/// Parses a `0x`-prefixed hex quantity such as a block number or a
/// transaction index.
pub fn parse_hex_u64(raw: &str) -> Result<u64, HexIntError> {
    let digits = raw
        .strip_prefix(HEX_PREFIX)
        .ok_or_else(|| HexIntError::MissingPrefix(raw.to_owned()))?;
    u64::from_str_radix(digits, 16).map_err(|source| HexIntError::Invalid {
        raw: raw.to_owned(),
        source,
    })
}

pub fn format_hex_u64(value: u64) -> String {
    format!("{HEX_PREFIX}{value:x}")
}
