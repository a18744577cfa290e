//! Variable, array and stream declarations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, IrResult};
use crate::expression::{ArrayRef, Literal, VarRef};

/// Element type of a declared variable or array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// Signed 32-bit integer.
    Int,
    /// Signed 4.28 fixed point, roughly `[-8, 8)` in steps of `2^-28`.
    Fixed,
    /// Boolean.
    Bool,
}

impl ElementType {
    /// Infer the element type of an auto-declared array from its values.
    ///
    /// Integers mixed with floats widen to fixed point; booleans never mix
    /// with numbers.
    pub fn infer(values: &[Literal]) -> IrResult<Self> {
        let mut has_int = false;
        let mut has_fixed = false;
        let mut has_bool = false;
        for value in values {
            match value {
                Literal::Int(_) => has_int = true,
                Literal::Fixed(_) => has_fixed = true,
                Literal::Bool(_) => has_bool = true,
            }
        }

        match (has_bool, has_int, has_fixed) {
            (true, false, false) => Ok(ElementType::Bool),
            (true, _, _) => Err(IrError::Type(
                "cannot mix boolean and numeric values in one array".into(),
            )),
            (false, _, true) => Ok(ElementType::Fixed),
            (false, true, false) => Ok(ElementType::Int),
            (false, false, false) => Err(IrError::Value("values cannot be empty".into())),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Int => write!(f, "int"),
            ElementType::Fixed => write!(f, "fixed"),
            ElementType::Bool => write!(f, "bool"),
        }
    }
}

/// How a declaration was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclarationKind {
    EmptyScalar,
    InitScalar,
    EmptyArray,
    InitArray,
}

impl DeclarationKind {
    pub fn is_array(&self) -> bool {
        matches!(self, DeclarationKind::EmptyArray | DeclarationKind::InitArray)
    }
}

/// A declared variable or array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Generated name (`v<n>` for scalars, `a<n>` for arrays).
    pub name: String,
    pub kind: DeclarationKind,
    pub element_type: ElementType,
    /// Number of elements; 1 for scalars.
    pub size: usize,
    /// Initial values, in declaration order. Empty for uninitialized declarations.
    pub values: Vec<Literal>,
}

/// Initial value of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum InitValue {
    Scalar(Literal),
    List(Vec<Literal>),
}

macro_rules! impl_init_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for InitValue {
                fn from(v: $t) -> Self {
                    InitValue::Scalar(v.into())
                }
            }

            impl From<Vec<$t>> for InitValue {
                fn from(v: Vec<$t>) -> Self {
                    InitValue::List(v.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

impl_init_value_from!(i32, i64, u32, f64, bool, Literal);

/// Options of a general declaration. At most one of `size` and `value` may be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclareOptions {
    pub size: Option<usize>,
    pub value: Option<InitValue>,
}

impl DeclareOptions {
    /// Reserve an array of `size` elements.
    pub fn size(size: usize) -> Self {
        Self {
            size: Some(size),
            value: None,
        }
    }

    /// Initialize with a scalar or a list.
    pub fn value(value: impl Into<InitValue>) -> Self {
        Self {
            size: None,
            value: Some(value.into()),
        }
    }
}

/// The reference produced by a general declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Declared {
    Scalar(VarRef),
    Array(ArrayRef),
}

impl Declared {
    pub fn into_scalar(self) -> Option<VarRef> {
        match self {
            Declared::Scalar(v) => Some(v),
            Declared::Array(_) => None,
        }
    }

    pub fn into_array(self) -> Option<ArrayRef> {
        match self {
            Declared::Array(a) => Some(a),
            Declared::Scalar(_) => None,
        }
    }
}

/// Ordered declaration table with per-kind name counters.
///
/// Counters are monotonic and scoped to one table, so names are unique
/// within a program but repeat across programs.
#[derive(Debug, Clone, Default)]
pub struct DeclarationTable {
    entries: Vec<Declaration>,
    var_index: u32,
    array_index: u32,
    stream_index: u32,
}

impl DeclarationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration, generating its name.
    pub fn declare(
        &mut self,
        element_type: ElementType,
        options: DeclareOptions,
    ) -> IrResult<Declared> {
        let (kind, size, values) = match (options.size, options.value) {
            (Some(_), Some(_)) => {
                return Err(IrError::Value(
                    "size declaration cannot be made if value is declared".into(),
                ));
            }
            (Some(0), None) => {
                return Err(IrError::Value("size must be a positive integer".into()));
            }
            (Some(size), None) => (DeclarationKind::EmptyArray, size, Vec::new()),
            (None, Some(InitValue::List(values))) => {
                if values.is_empty() {
                    return Err(IrError::Value("array values cannot be empty".into()));
                }
                (DeclarationKind::InitArray, values.len(), values)
            }
            (None, Some(InitValue::Scalar(value))) => (DeclarationKind::InitScalar, 1, vec![value]),
            (None, None) => (DeclarationKind::EmptyScalar, 1, Vec::new()),
        };

        let (name, declared) = if kind.is_array() {
            self.array_index += 1;
            let name = format!("a{}", self.array_index);
            (name.clone(), Declared::Array(ArrayRef::new(name)))
        } else {
            self.var_index += 1;
            let name = format!("v{}", self.var_index);
            (name.clone(), Declared::Scalar(VarRef::new(name)))
        };

        self.entries.push(Declaration {
            name,
            kind,
            element_type,
            size,
            values,
        });
        Ok(declared)
    }

    /// Generate the next stream source name (`r<n>`).
    pub fn next_stream_name(&mut self) -> String {
        self.stream_index += 1;
        format!("r{}", self.stream_index)
    }

    /// Look up a declaration by generated name.
    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.entries.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<Declaration> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_names() {
        let mut table = DeclarationTable::new();

        let v1 = table.declare(ElementType::Int, DeclareOptions::default()).unwrap();
        let a1 = table.declare(ElementType::Fixed, DeclareOptions::size(5)).unwrap();
        let v2 = table.declare(ElementType::Bool, DeclareOptions::value(true)).unwrap();
        let a2 = table
            .declare(ElementType::Int, DeclareOptions::value(vec![1, 2, 3]))
            .unwrap();

        assert_eq!(v1, Declared::Scalar(VarRef::new("v1")));
        assert_eq!(a1, Declared::Array(ArrayRef::new("a1")));
        assert_eq!(v2, Declared::Scalar(VarRef::new("v2")));
        assert_eq!(a2, Declared::Array(ArrayRef::new("a2")));

        let kinds: Vec<_> = table.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DeclarationKind::EmptyScalar,
                DeclarationKind::EmptyArray,
                DeclarationKind::InitScalar,
                DeclarationKind::InitArray,
            ]
        );
        assert_eq!(table.get("a1").map(|d| d.size), Some(5));
    }

    #[test]
    fn test_init_array_keeps_literal_order() {
        let mut table = DeclarationTable::new();
        table
            .declare(ElementType::Int, DeclareOptions::value(vec![1, 2, 3]))
            .unwrap();

        let decl = table.get("a1").unwrap();
        assert_eq!(
            decl.values,
            vec![Literal::Int(1), Literal::Int(2), Literal::Int(3)]
        );
        assert_eq!(decl.size, 3);
    }

    #[test]
    fn test_size_and_value_are_exclusive() {
        let mut table = DeclarationTable::new();
        let options = DeclareOptions {
            size: Some(3),
            value: Some(InitValue::Scalar(Literal::Int(1))),
        };
        assert!(matches!(
            table.declare(ElementType::Int, options),
            Err(IrError::Value(_))
        ));
        assert!(matches!(
            table.declare(ElementType::Int, DeclareOptions::size(0)),
            Err(IrError::Value(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_stream_names_use_their_own_counter() {
        let mut table = DeclarationTable::new();
        table.declare(ElementType::Int, DeclareOptions::default()).unwrap();
        assert_eq!(table.next_stream_name(), "r1");
        assert_eq!(table.next_stream_name(), "r2");
    }

    #[test]
    fn test_infer_element_type() {
        let ints = [Literal::Int(1), Literal::Int(2)];
        let mixed = [Literal::Int(1), Literal::Fixed(0.5)];
        let bools = [Literal::Bool(true)];
        let bad = [Literal::Bool(true), Literal::Int(0)];

        assert_eq!(ElementType::infer(&ints).unwrap(), ElementType::Int);
        assert_eq!(ElementType::infer(&mixed).unwrap(), ElementType::Fixed);
        assert_eq!(ElementType::infer(&bools).unwrap(), ElementType::Bool);
        assert!(matches!(ElementType::infer(&bad), Err(IrError::Type(_))));
        assert!(matches!(ElementType::infer(&[]), Err(IrError::Value(_))));
    }
}
