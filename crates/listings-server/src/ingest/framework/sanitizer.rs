//! Text repair for raw input records
//!
//! [`repair_utf8`] drops invalid byte sequences and unpaired surrogate escapes
//! from the string literals of a file before it is parsed. Records are then parsed into [`RawValue`], which keeps string content as
//! raw bytes. [`sanitize`] turns that into a `serde_json::Value` of the same
//! shape in which every string, including mapping keys, is valid UTF-8. Invalid
//! byte sequences are dropped, valid multi-byte characters are kept.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A parsed input value whose text has not been validated yet
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(Vec<u8>),
    Sequence(Vec<RawValue>),
    Mapping(Vec<(Vec<u8>, RawValue)>),
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into().into_bytes())
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => RawValue::Number(n),
            Value::String(s) => RawValue::Text(s.into_bytes()),
            Value::Array(items) => RawValue::Sequence(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => RawValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k.into_bytes(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RawValueVisitor)
    }
}

struct RawValueVisitor;

impl<'de> Visitor<'de> for RawValueVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<RawValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RawValue, E> {
        Ok(RawValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawValue, E> {
        Ok(RawValue::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawValue, E> {
        Ok(RawValue::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawValue, E> {
        // NaN and infinities have no JSON form
        Ok(Number::from_f64(v).map_or(RawValue::Null, RawValue::Number))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RawValue, E> {
        Ok(RawValue::Text(v.as_bytes().to_vec()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RawValue, E> {
        Ok(RawValue::Text(v.into_bytes()))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<RawValue, E> {
        Ok(RawValue::Text(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<RawValue, E> {
        Ok(RawValue::Text(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<RawValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<RawValue>()? {
            items.push(item);
        }
        Ok(RawValue::Sequence(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<RawValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<RawKey, RawValue>()? {
            entries.push((key.0, value));
        }
        Ok(RawValue::Mapping(entries))
    }
}

/// Mapping key, kept as bytes like any other text
struct RawKey(Vec<u8>);

impl<'de> Deserialize<'de> for RawKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawKeyVisitor;

        impl<'de> Visitor<'de> for RawKeyVisitor {
            type Value = RawKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RawKey, E> {
                Ok(RawKey(v.as_bytes().to_vec()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<RawKey, E> {
                Ok(RawKey(v.into_bytes()))
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<RawKey, E> {
                Ok(RawKey(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<RawKey, E> {
                Ok(RawKey(v))
            }
        }

        deserializer.deserialize_any(RawKeyVisitor)
    }
}

/// Decode `bytes` as UTF-8, dropping every invalid sequence
pub fn sanitize_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Repair the text inside string literals of a JSON file before it is parsed.
///
/// Invalid UTF-8 sequences and unpaired `\uD800`-`\uDFFF` escapes are
/// dropped from string content. Bytes outside string literals are copied
/// as they are, so a stray byte between values still fails the parse.
pub fn repair_utf8(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_string = false;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if !in_string {
            in_string = byte == b'"';
            out.push(byte);
            i += 1;
            continue;
        }

        match byte {
            b'"' => {
                in_string = false;
                out.push(byte);
                i += 1;
            },
            b'\\' => match unicode_escape(bytes, i) {
                Some(unit) if is_high_surrogate(unit) => {
                    if unicode_escape(bytes, i + 6).is_some_and(is_low_surrogate) {
                        out.extend_from_slice(&bytes[i..i + 12]);
                        i += 12;
                    } else {
                        i += 6;
                    }
                },
                Some(unit) if is_low_surrogate(unit) => i += 6,
                Some(_) => {
                    out.extend_from_slice(&bytes[i..i + 6]);
                    i += 6;
                },
                None => {
                    // Any other escape is two bytes, which keeps `\\u` intact
                    let end = (i + 2).min(bytes.len());
                    out.extend_from_slice(&bytes[i..end]);
                    i = end;
                },
            },
            byte if byte.is_ascii() => {
                out.push(byte);
                i += 1;
            },
            _ => {
                let end = bytes[i..]
                    .iter()
                    .position(u8::is_ascii)
                    .map_or(bytes.len(), |n| i + n);
                out.extend_from_slice(sanitize_text(&bytes[i..end]).as_bytes());
                i = end;
            },
        }
    }

    out
}

/// The code unit of a `\uXXXX` escape starting at `at`
fn unicode_escape(bytes: &[u8], at: usize) -> Option<u16> {
    let escape = bytes.get(at..at + 6)?;
    if &escape[..2] != b"\\u" || !escape[2..].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let hex = std::str::from_utf8(&escape[2..]).ok()?;
    u16::from_str_radix(hex, 16).ok()
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..0xE000).contains(&unit)
}

/// Convert a raw value into JSON with every string repaired
pub fn sanitize(value: RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Number(n) => Value::Number(n),
        RawValue::Text(bytes) => Value::String(sanitize_text(&bytes)),
        RawValue::Sequence(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        RawValue::Mapping(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                map.insert(sanitize_text(&key), sanitize(value));
            }
            Value::Object(map)
        },
    }
}

pub fn sanitize_chunk(records: Vec<RawValue>) -> Vec<Value> {
    records.into_iter().map(sanitize).collect()
}
