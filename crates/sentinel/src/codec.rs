//! Wire codec for governance objects.
//!
//! The daemon carries a governance object as `DataHex`: hex-encoded JSON of
//! the form `[[<tag>, {<fields>, "type": <n>}]]`. The outer array and the
//! `type` attribute are a shim on top of the plain `[<tag>, {<fields>}]`
//! pair, and superblocks travel under the tag `trigger`.
//!
//! The canonical serialisation used for superblock hashing is the plain pair
//! with sorted keys and `", "` / `": "` separators, hex-encoded. Every node
//! must produce exactly the same bytes for the same fields.

use std::collections::BTreeMap;
use std::io;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::object::ObjectType;

/// An open map of decoded governance object fields. Keys are kept sorted so
/// that serialisation never depends on insertion order.
pub type FieldMap = BTreeMap<String, Value>;

/// The tag the daemon uses for superblocks
const DAEMON_SUPERBLOCK_TAG: &str = "trigger";
/// The shim attribute carrying the numeric object type
const TYPE_ATTRIBUTE: &str = "type";

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid hex data: {0}")]
    Hex(#[from] data_encoding::DecodeError),
    #[error("Invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected object layout: {0}")]
    Layout(&'static str),
    #[error("Unknown governance object type {0:?}")]
    UnknownType(String),
}

/// Result of a decoding operation
pub type Result<T> = std::result::Result<T, DecodeError>;

/// A decoded governance object: its type and field map
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedObject {
    /// Resolved object type
    pub object_type: ObjectType,
    /// All fields sent by the daemon, minus the shim attributes
    pub fields: FieldMap,
}

/// JSON formatting that matches `json.dumps(obj, sort_keys=True)`: spaces
/// after separators and non-ASCII characters escaped as `\uXXXX`.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(
        &mut self,
        writer: &mut W,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                let mut buf = [0u8; 1];
                writer.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serialise a JSON value to its canonical text.
pub fn to_canonical_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    // writes into a `Vec` don't fail and a `Value` only has string keys
    value
        .serialize(&mut ser)
        .expect("Serializing a JSON value shouldn't fail");
    // the formatter only ever emits ASCII
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serialise a JSON value and hex-encode it.
pub fn serialise(value: &Value) -> String {
    HEXLOWER.encode(to_canonical_json(value).as_bytes())
}

/// Hex-decode and parse a JSON value.
pub fn deserialise(data_hex: &str) -> Result<Value> {
    let bytes = HEXLOWER_PERMISSIVE.decode(data_hex.trim().as_bytes())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode the daemon's `DataHex` representation of a governance object.
pub fn decode(data_hex: &str) -> Result<DecodedObject> {
    let value = deserialise(data_hex)?;
    let Value::Array(outer) = value else {
        return Err(DecodeError::Layout("expected an outer array"));
    };
    let Some(Value::Array(pair)) = outer.into_iter().next() else {
        return Err(DecodeError::Layout("expected a [type, fields] pair"));
    };
    let mut pair = pair.into_iter();
    let (Some(Value::String(tag)), Some(Value::Object(map))) =
        (pair.next(), pair.next())
    else {
        return Err(DecodeError::Layout("expected a [type, fields] pair"));
    };

    let tag = if tag == DAEMON_SUPERBLOCK_TAG {
        ObjectType::Superblock.tag().to_string()
    } else {
        tag
    };
    let object_type = ObjectType::from_tag(&tag)
        .ok_or_else(|| DecodeError::UnknownType(tag.clone()))?;

    let mut fields: FieldMap = map.into_iter().collect();
    fields.remove(TYPE_ATTRIBUTE);

    Ok(DecodedObject {
        object_type,
        fields,
    })
}

/// Encode a governance object the way the daemon expects it in a `gobject
/// submit` call.
pub fn encode_for_daemon(
    object_type: ObjectType,
    fields: &FieldMap,
) -> String {
    let mut fields = fields.clone();
    fields.insert(TYPE_ATTRIBUTE.to_string(), Value::from(object_type.code()));
    let tag = match object_type {
        ObjectType::Superblock => DAEMON_SUPERBLOCK_TAG,
        ObjectType::Proposal => object_type.tag(),
    };
    let inner = Value::Array(vec![
        Value::String(tag.to_string()),
        Value::Object(fields.into_iter().collect()),
    ]);
    serialise(&Value::Array(vec![inner]))
}

/// Keep only the fields declared serialisable for the object type. Unknown
/// fields sent by the daemon are dropped.
pub fn filter_serialisable(
    object_type: ObjectType,
    fields: &FieldMap,
) -> FieldMap {
    object_type
        .serialisable_fields()
        .iter()
        .filter_map(|&name| {
            fields.get(name).map(|v| (name.to_string(), v.clone()))
        })
        .collect()
}

/// The canonical hex payload of an object: `[<tag>, {<serialisable
/// fields>}]`.
pub fn canonical_payload(
    object_type: ObjectType,
    fields: &FieldMap,
) -> String {
    let fields = filter_serialisable(object_type, fields);
    serialise(&Value::Array(vec![
        Value::String(object_type.tag().to_string()),
        Value::Object(fields.into_iter().collect()),
    ]))
}

/// A SHA-256 digest of a canonical payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalHash(pub [u8; 32]);

impl CanonicalHash {
    /// Lowercase hex rendering of the digest read as a big-endian integer,
    /// so without leading zeros.
    pub fn to_compact_hex(&self) -> String {
        let full = HEXLOWER.encode(&self.0);
        let trimmed = full.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Deterministic hash over the serialisable fields of an object.
pub fn canonical_hash(
    object_type: ObjectType,
    fields: &FieldMap,
) -> CanonicalHash {
    let payload = canonical_payload(object_type, fields);
    CanonicalHash(Sha256::digest(payload.as_bytes()).into())
}
