//! Result element types and the binary item layout.
//!
//! An item is the element values in row-major order, little-endian, followed
//! by an `i64` timestamp when the dtype is timestamped. Integers and floats
//! take 8 bytes, booleans one byte.

use qpulse_ir::ElementType;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{HalError, HalResult};

/// Scalar kind of a result element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// `i64`
    Int,
    /// `f64`
    Float,
    Bool,
}

impl ScalarKind {
    /// Encoded width in bytes.
    pub fn size(&self) -> usize {
        match self {
            ScalarKind::Int | ScalarKind::Float => 8,
            ScalarKind::Bool => 1,
        }
    }

    /// Kind used to report values of a program variable type.
    pub fn from_element_type(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Int => ScalarKind::Int,
            ElementType::Fixed => ScalarKind::Float,
            ElementType::Bool => ScalarKind::Bool,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Int => write!(f, "int64"),
            ScalarKind::Float => write!(f, "float64"),
            ScalarKind::Bool => write!(f, "bool"),
        }
    }
}

/// Element dtype of a named result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementDtype {
    pub kind: ScalarKind,
    /// Fixed item shape; empty for scalar items.
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub timestamped: bool,
}

impl ElementDtype {
    pub fn scalar(kind: ScalarKind) -> Self {
        Self {
            kind,
            shape: Vec::new(),
            timestamped: false,
        }
    }

    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.timestamped = true;
        self
    }

    /// Number of scalar elements in one item.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Encoded size of one item in bytes.
    pub fn item_size(&self) -> usize {
        let timestamp = if self.timestamped { 8 } else { 0 };
        self.kind.size() * self.element_count() + timestamp
    }

    /// Decode `count` items from `bytes`.
    pub fn decode(&self, bytes: &[u8], count: usize) -> HalResult<Vec<ResultValue>> {
        let item_size = self.item_size();
        if bytes.len() != item_size * count {
            return Err(HalError::Decode(format!(
                "expected {count} items of {item_size} bytes ({self}), got {} bytes",
                bytes.len()
            )));
        }
        if item_size == 0 {
            return Ok(vec![ResultValue::Array(Vec::new()); count]);
        }
        bytes
            .chunks_exact(item_size)
            .map(|item| self.decode_item(item))
            .collect()
    }

    fn decode_item(&self, item: &[u8]) -> HalResult<ResultValue> {
        let data_len = self.kind.size() * self.element_count();
        let (data, rest) = item.split_at(data_len);
        let scalars = data
            .chunks_exact(self.kind.size())
            .map(|raw| decode_scalar(self.kind, raw))
            .collect::<HalResult<Vec<_>>>()?;
        let value = if self.shape.is_empty() {
            scalars
                .into_iter()
                .next()
                .ok_or_else(|| HalError::Decode("empty scalar item".into()))?
        } else {
            nest(&self.shape, &mut scalars.into_iter())
        };

        if self.timestamped {
            let timestamp = i64::from_le_bytes(to_array(rest)?);
            Ok(ResultValue::Timestamped {
                value: Box::new(value),
                timestamp,
            })
        } else {
            Ok(value)
        }
    }

    /// Encode items in the wire layout.
    pub fn encode(&self, values: &[ResultValue]) -> HalResult<Vec<u8>> {
        let mut out = Vec::with_capacity(values.len() * self.item_size());
        for value in values {
            let (value, timestamp) = match (value, self.timestamped) {
                (ResultValue::Timestamped { value, timestamp }, true) => {
                    (&**value, Some(*timestamp))
                }
                (ResultValue::Timestamped { .. }, false) => {
                    return Err(HalError::Decode(format!(
                        "timestamped value for untimestamped dtype {self}"
                    )));
                }
                (other, true) => (other, Some(0)),
                (other, false) => (other, None),
            };
            let mut scalars = Vec::with_capacity(self.element_count());
            flatten(value, &mut scalars);
            if scalars.len() != self.element_count() {
                return Err(HalError::Decode(format!(
                    "value has {} elements, dtype {self} expects {}",
                    scalars.len(),
                    self.element_count()
                )));
            }
            for scalar in scalars {
                encode_scalar(self.kind, scalar, &mut out)?;
            }
            if let Some(timestamp) = timestamp {
                out.extend_from_slice(&timestamp.to_le_bytes());
            }
        }
        Ok(out)
    }
}

impl fmt::Display for ElementDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.shape.is_empty() {
            write!(f, "{:?}", self.shape)?;
        }
        if self.timestamped {
            write!(f, "+timestamp")?;
        }
        Ok(())
    }
}

fn to_array(raw: &[u8]) -> HalResult<[u8; 8]> {
    raw.try_into()
        .map_err(|_| HalError::Decode(format!("expected 8 bytes, got {}", raw.len())))
}

fn decode_scalar(kind: ScalarKind, raw: &[u8]) -> HalResult<ResultValue> {
    Ok(match kind {
        ScalarKind::Int => ResultValue::Int(i64::from_le_bytes(to_array(raw)?)),
        ScalarKind::Float => ResultValue::Float(f64::from_le_bytes(to_array(raw)?)),
        ScalarKind::Bool => ResultValue::Bool(raw.first().is_some_and(|b| *b != 0)),
    })
}

fn encode_scalar(kind: ScalarKind, value: &ResultValue, out: &mut Vec<u8>) -> HalResult<()> {
    match (kind, value) {
        (ScalarKind::Int, ResultValue::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ScalarKind::Int, ResultValue::Bool(v)) => {
            out.extend_from_slice(&i64::from(*v).to_le_bytes());
        }
        (ScalarKind::Float, ResultValue::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ScalarKind::Float, ResultValue::Int(v)) => {
            out.extend_from_slice(&(*v as f64).to_le_bytes());
        }
        (ScalarKind::Bool, ResultValue::Bool(v)) => out.push(u8::from(*v)),
        (kind, other) => {
            return Err(HalError::Decode(format!("cannot encode {other:?} as {kind}")));
        }
    }
    Ok(())
}

fn nest(shape: &[usize], scalars: &mut impl Iterator<Item = ResultValue>) -> ResultValue {
    match shape.split_first() {
        None => scalars.next().unwrap_or(ResultValue::Array(Vec::new())),
        Some((dim, rest)) => ResultValue::Array((0..*dim).map(|_| nest(rest, scalars)).collect()),
    }
}

fn flatten<'a>(value: &'a ResultValue, out: &mut Vec<&'a ResultValue>) {
    match value {
        ResultValue::Array(items) => items.iter().for_each(|v| flatten(v, out)),
        ResultValue::Timestamped { value, .. } => flatten(value, out),
        scalar => out.push(scalar),
    }
}

/// A decoded result item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ResultValue>),
    Timestamped {
        value: Box<ResultValue>,
        timestamp: i64,
    },
}

impl ResultValue {
    /// Numeric view of a scalar (booleans map to 0 and 1).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResultValue::Int(v) => Some(*v as f64),
            ResultValue::Float(v) => Some(*v),
            ResultValue::Bool(v) => Some(f64::from(u8::from(*v))),
            ResultValue::Timestamped { value, .. } => value.as_f64(),
            ResultValue::Array(_) => None,
        }
    }

    /// The value without its timestamp.
    pub fn value(&self) -> &ResultValue {
        match self {
            ResultValue::Timestamped { value, .. } => value,
            other => other,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            ResultValue::Timestamped { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Int(v) => write!(f, "{v}"),
            ResultValue::Float(v) => write!(f, "{v}"),
            ResultValue::Bool(v) => write!(f, "{v}"),
            ResultValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ResultValue::Timestamped { value, timestamp } => write!(f, "{value}@{timestamp}"),
        }
    }
}

impl From<i64> for ResultValue {
    fn from(v: i64) -> Self {
        ResultValue::Int(v)
    }
}

impl From<f64> for ResultValue {
    fn from(v: f64) -> Self {
        ResultValue::Float(v)
    }
}

impl From<bool> for ResultValue {
    fn from(v: bool) -> Self {
        ResultValue::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_size() {
        assert_eq!(ElementDtype::scalar(ScalarKind::Float).item_size(), 8);
        assert_eq!(ElementDtype::scalar(ScalarKind::Bool).item_size(), 1);
        assert_eq!(
            ElementDtype::scalar(ScalarKind::Int)
                .with_shape(vec![2, 3])
                .with_timestamps()
                .item_size(),
            56
        );
    }

    #[test]
    fn test_decode_shaped_items() {
        let dtype = ElementDtype::scalar(ScalarKind::Int).with_shape(vec![2]);
        let values = vec![
            ResultValue::Array(vec![ResultValue::Int(1), ResultValue::Int(2)]),
            ResultValue::Array(vec![ResultValue::Int(3), ResultValue::Int(4)]),
        ];
        let bytes = dtype.encode(&values).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..8], &1_i64.to_le_bytes());
        assert_eq!(dtype.decode(&bytes, 2).unwrap(), values);
    }

    #[test]
    fn test_timestamp_follows_value() {
        let dtype = ElementDtype::scalar(ScalarKind::Float).with_timestamps();
        let value = ResultValue::Timestamped {
            value: Box::new(ResultValue::Float(0.25)),
            timestamp: 1200,
        };
        let bytes = dtype.encode(std::slice::from_ref(&value)).unwrap();
        assert_eq!(&bytes[8..], &1200_i64.to_le_bytes());
        let decoded = dtype.decode(&bytes, 1).unwrap();
        assert_eq!(decoded[0].timestamp(), Some(1200));
        assert_eq!(decoded[0].as_f64(), Some(0.25));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let dtype = ElementDtype::scalar(ScalarKind::Int);
        assert!(matches!(dtype.decode(&[0; 12], 1), Err(HalError::Decode(_))));
    }

    #[test]
    fn test_element_type_mapping() {
        assert_eq!(ScalarKind::from_element_type(ElementType::Fixed), ScalarKind::Float);
        assert_eq!(ScalarKind::from_element_type(ElementType::Bool).to_string(), "bool");
    }
}
