//! Data structures and helpers shared across the API and monitor binaries.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod hex;

pub use hex::{format_hex_u64, parse_hex_u64, HexIntError, HEX_PREFIX};

/// Prefix every account address must start with.
pub const ADDRESS_PREFIX: &str = "0x";

/// Total length of an address string, prefix included.
pub const ADDRESS_LENGTH: usize = ADDRESS_PREFIX.len() + 40;

/// Errors emitted when a user-supplied address fails structural validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("address must be exactly {ADDRESS_LENGTH} characters")]
    WrongLength,
    #[error("address must start with `{ADDRESS_PREFIX}`")]
    MissingPrefix,
}

/// Validates the `0x` + 40 character contract. Case is preserved and not
/// inspected: two addresses differing only in case are different keys.
pub fn validate_address(raw: &str) -> Result<(), AddressFormatError> {
    if raw.len() != ADDRESS_LENGTH {
        return Err(AddressFormatError::WrongLength);
    }

    if !raw.starts_with(ADDRESS_PREFIX) {
        return Err(AddressFormatError::MissingPrefix);
    }

    Ok(())
}

/// Chain account identifier.
///
/// Deserialization is pass-through so node payloads are never rejected;
/// values coming from callers go through [`Address::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressFormatError> {
        validate_address(raw)?;
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Full transaction object as returned by `eth_getBlockByNumber`.
///
/// Only `from`, `to` and `transaction_index` are interpreted; every other
/// field is carried through to subscribers untouched. The interpreted fields
/// decode leniently: a `null`, missing or non-string value never rejects the
/// block, it surfaces later from [`Transaction::index`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub block_hash: String,
    #[serde(default)]
    pub block_number: String,
    #[serde(default, deserialize_with = "lenient::address")]
    pub from: Address,
    #[serde(default)]
    pub gas: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub nonce: String,
    /// `None` for contract creation.
    #[serde(default, deserialize_with = "lenient::optional_address")]
    pub to: Option<Address>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub transaction_index: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub v: String,
    #[serde(default)]
    pub r: String,
    #[serde(default)]
    pub s: String,
}

impl Transaction {
    /// Origin and destination, in that order. Both roles are reported even
    /// when they hold the same address.
    pub fn parties(&self) -> impl Iterator<Item = &Address> {
        std::iter::once(&self.from).chain(self.to.as_ref())
    }

    /// Parses the hex `transactionIndex` field. An index that was `null` or
    /// not a string on the wire fails here.
    pub fn index(&self) -> Result<u64, HexIntError> {
        parse_hex_u64(&self.transaction_index)
    }
}

mod lenient {
    use std::fmt;

    use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
    use serde::Deserializer;

    use super::Address;

    /// Accepts any JSON value. Strings are kept verbatim, scalars keep their
    /// text form (without the `0x` prefix they later fail to parse), `null`
    /// and containers become an empty string.
    struct RawText;

    impl<'de> Visitor<'de> for RawText {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("any JSON value")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<String, D::Error> {
            deserializer.deserialize_any(RawText)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<String, A::Error> {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(String::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<String, A::Error> {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            Ok(String::new())
        }
    }

    pub(super) fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_any(RawText)
    }

    pub(super) fn address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        string(deserializer).map(Address)
    }

    pub(super) fn optional_address<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Address>, D::Error> {
        let raw = string(deserializer)?;
        Ok((!raw.is_empty()).then_some(Address(raw)))
    }
}
