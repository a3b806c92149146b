use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::error::{RecordError, RecordResult};

/// Attribute type of a table field or index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    Ints,
    Floats,
    Chars,
}

impl AttrType {
    /// Fixed size in bytes for numeric types; `Chars` length comes from the
    /// field definition.
    pub fn fixed_length(&self) -> Option<usize> {
        match self {
            AttrType::Ints => Some(4),
            AttrType::Floats => Some(4),
            AttrType::Chars => None,
        }
    }

    /// Total-order comparison of two encoded values of this type.
    /// Both slices must be at least `length` bytes; `Chars` compares exactly
    /// `length` bytes lexicographically.
    pub fn compare(&self, a: &[u8], b: &[u8], length: usize) -> Ordering {
        match self {
            AttrType::Ints => {
                let x = i32::from_le_bytes([a[0], a[1], a[2], a[3]]);
                let y = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                x.cmp(&y)
            }
            AttrType::Floats => {
                let x = f32::from_le_bytes([a[0], a[1], a[2], a[3]]);
                let y = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                x.total_cmp(&y)
            }
            AttrType::Chars => a[..length].cmp(&b[..length]),
        }
    }

    pub fn to_code(self) -> i32 {
        match self {
            AttrType::Ints => 0,
            AttrType::Floats => 1,
            AttrType::Chars => 2,
        }
    }

    pub fn from_code(code: i32) -> RecordResult<Self> {
        match code {
            0 => Ok(AttrType::Ints),
            1 => Ok(AttrType::Floats),
            2 => Ok(AttrType::Chars),
            other => Err(RecordError::InvalidArgument(format!(
                "unknown attribute type code {}",
                other
            ))),
        }
    }
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Chars(String),
}

impl Value {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Value::Int(_) => AttrType::Ints,
            Value::Float(_) => AttrType::Floats,
            Value::Chars(_) => AttrType::Chars,
        }
    }

    /// Encode into exactly `length` bytes; `Chars` is zero-padded
    pub fn encode(&self, length: usize) -> RecordResult<Vec<u8>> {
        match self {
            Value::Int(i) => Ok(i.to_le_bytes().to_vec()),
            Value::Float(f) => Ok(f.to_le_bytes().to_vec()),
            Value::Chars(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > length {
                    return Err(RecordError::InvalidArgument(format!(
                        "string length {} exceeds field length {}",
                        bytes.len(),
                        length
                    )));
                }
                let mut out = vec![0u8; length];
                out[..bytes.len()].copy_from_slice(bytes);
                Ok(out)
            }
        }
    }

    /// Decode from an encoded field image
    pub fn decode(attr_type: AttrType, bytes: &[u8]) -> RecordResult<Self> {
        match attr_type {
            AttrType::Ints => {
                if bytes.len() < 4 {
                    return Err(RecordError::InvalidArgument(format!(
                        "expected 4 bytes for INTS, got {}",
                        bytes.len()
                    )));
                }
                Ok(Value::Int(i32::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            AttrType::Floats => {
                if bytes.len() < 4 {
                    return Err(RecordError::InvalidArgument(format!(
                        "expected 4 bytes for FLOATS, got {}",
                        bytes.len()
                    )));
                }
                Ok(Value::Float(f32::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            AttrType::Chars => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = String::from_utf8(bytes[..end].to_vec()).map_err(|e| {
                    RecordError::InvalidArgument(format!("invalid UTF-8 in CHARS field: {}", e))
                })?;
                Ok(Value::Chars(s))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_round_trip() {
        let v = Value::Int(-42);
        let bytes = v.encode(4).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(Value::decode(AttrType::Ints, &bytes).unwrap(), v);
    }

    #[test]
    fn test_float_round_trip() {
        let v = Value::Float(3.5);
        let bytes = v.encode(4).unwrap();
        assert_eq!(Value::decode(AttrType::Floats, &bytes).unwrap(), v);
    }

    #[test]
    fn test_chars_padding_and_round_trip() {
        let v = Value::Chars("abc".to_string());
        let bytes = v.encode(8).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..3], b"abc");
        assert_eq!(&bytes[3..], &[0u8; 5]);
        assert_eq!(Value::decode(AttrType::Chars, &bytes).unwrap(), v);
    }

    #[test]
    fn test_chars_too_long() {
        let v = Value::Chars("hello world".to_string());
        assert!(v.encode(5).is_err());
    }

    #[test]
    fn test_compare_ints() {
        let a = Value::Int(3).encode(4).unwrap();
        let b = Value::Int(7).encode(4).unwrap();
        assert_eq!(AttrType::Ints.compare(&a, &b, 4), Ordering::Less);
        assert_eq!(AttrType::Ints.compare(&b, &a, 4), Ordering::Greater);
        assert_eq!(AttrType::Ints.compare(&a, &a, 4), Ordering::Equal);
    }

    #[test]
    fn test_compare_negative_ints() {
        let a = Value::Int(-5).encode(4).unwrap();
        let b = Value::Int(2).encode(4).unwrap();
        assert_eq!(AttrType::Ints.compare(&a, &b, 4), Ordering::Less);
    }

    #[test]
    fn test_compare_floats() {
        let a = Value::Float(-1.5).encode(4).unwrap();
        let b = Value::Float(0.25).encode(4).unwrap();
        assert_eq!(AttrType::Floats.compare(&a, &b, 4), Ordering::Less);
    }

    #[test]
    fn test_compare_chars() {
        let a = Value::Chars("abc".to_string()).encode(4).unwrap();
        let b = Value::Chars("abd".to_string()).encode(4).unwrap();
        assert_eq!(AttrType::Chars.compare(&a, &b, 4), Ordering::Less);
    }
}
