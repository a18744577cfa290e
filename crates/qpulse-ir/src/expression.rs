//! Typed expression trees.
//!
//! Expressions are immutable values. Operators on [`Expression`], [`VarRef`]
//! and numeric literals allocate new [`Expression::Binary`] nodes; nothing is
//! evaluated or range-checked here, numeric limits are left to the backend
//! compiler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;

use crate::declaration::ElementType;
use crate::error::{IrError, IrResult};

/// A literal value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Integer literal.
    Int(i64),
    /// Fixed-point literal, carried as `f64` until the backend quantizes it.
    Fixed(f64),
    /// Boolean literal.
    Bool(bool),
}

impl Literal {
    /// The element type a declaration initialized from this literal would get.
    pub fn element_type(&self) -> ElementType {
        match self {
            Literal::Int(_) => ElementType::Int,
            Literal::Fixed(_) => ElementType::Fixed,
            Literal::Bool(_) => ElementType::Bool,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Fixed(v) => write!(f, "{v:?}"),
            Literal::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Int(i64::from(v))
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<u32> for Literal {
    fn from(v: u32) -> Self {
        Literal::Int(i64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Fixed(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

/// Reference to a declared scalar variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef(String);

impl VarRef {
    /// Reference a variable by its generated name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The generated name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a declared array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayRef(String);

impl ArrayRef {
    /// Reference an array by its generated name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The generated name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The cell at `index`.
    pub fn at(&self, index: impl Into<Expression>) -> Expression {
        Expression::ArrayCell {
            array: self.clone(),
            index: Box::new(index.into()),
        }
    }

    /// The array length.
    pub fn length(&self) -> Expression {
        Expression::ArrayLength(self.clone())
    }
}

impl fmt::Display for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-settable input/output values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoChannel {
    Io1,
    Io2,
}

/// Host I/O value 1.
pub const IO1: IoChannel = IoChannel::Io1;
/// Host I/O value 2.
pub const IO2: IoChannel = IoChannel::Io2;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl BinaryOperator {
    /// Operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Eq => "==",
        }
    }

    /// Whether the operator yields a boolean.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
                | BinaryOperator::Eq
        )
    }
}

/// Built-in math library functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathFunction {
    Sin,
    Cos,
    Sin2Pi,
    Cos2Pi,
    Sum,
    Max,
    Min,
    ArgMax,
    ArgMin,
}

impl MathFunction {
    /// Library name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Sin2Pi => "sin2pi",
            MathFunction::Cos2Pi => "cos2pi",
            MathFunction::Sum => "sum",
            MathFunction::Max => "max",
            MathFunction::Min => "min",
            MathFunction::ArgMax => "argmax",
            MathFunction::ArgMin => "argmin",
        }
    }
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// A literal.
    Literal(Literal),
    /// A scalar variable.
    Variable(VarRef),
    /// A whole array, as consumed by reductions such as `sum`.
    Array(ArrayRef),
    /// One array cell.
    ArrayCell {
        array: ArrayRef,
        index: Box<Expression>,
    },
    /// The length of an array.
    ArrayLength(ArrayRef),
    /// A binary operation.
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// A math library call.
    Math {
        func: MathFunction,
        operand: Box<Expression>,
    },
    /// A host I/O value.
    HostIo(IoChannel),
}

impl Expression {
    /// Build a literal node.
    pub fn literal(value: impl Into<Literal>) -> Self {
        Expression::Literal(value.into())
    }

    /// Build a binary node, coercing both operands through [`to_expression`].
    pub fn binary(
        op: BinaryOperator,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> IrResult<Self> {
        Ok(Self::bin(
            op,
            to_expression(left, None)?,
            to_expression(right, None)?,
        ))
    }

    pub(crate) fn bin(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Build a math library call.
    pub fn math(func: MathFunction, operand: impl Into<Expression>) -> Self {
        Expression::Math {
            func,
            operand: Box::new(operand.into()),
        }
    }

    /// The length of an array expression.
    pub fn length(&self) -> IrResult<Expression> {
        match self {
            Expression::Array(array) => Ok(Expression::ArrayLength(array.clone())),
            other => Err(IrError::Type(format!("{other} is not an array"))),
        }
    }

    /// The literal carried by this node, if it is one.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expression::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{lit}"),
            Expression::Variable(var) => write!(f, "{var}"),
            Expression::Array(array) => write!(f, "{array}"),
            Expression::ArrayCell { array, index } => write!(f, "{array}[{index}]"),
            Expression::ArrayLength(array) => write!(f, "{array}.length()"),
            Expression::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expression::Math { func, operand } => write!(f, "{}({operand})", func.name()),
            Expression::HostIo(IoChannel::Io1) => write!(f, "IO1"),
            Expression::HostIo(IoChannel::Io2) => write!(f, "IO2"),
        }
    }
}

macro_rules! impl_from_literal {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Expression {
                fn from(v: $t) -> Self {
                    Expression::Literal(v.into())
                }
            }
        )*
    };
}

impl_from_literal!(i32, i64, u32, f64, bool, Literal);

impl From<&Expression> for Expression {
    fn from(e: &Expression) -> Self {
        e.clone()
    }
}

impl From<VarRef> for Expression {
    fn from(v: VarRef) -> Self {
        Expression::Variable(v)
    }
}

impl From<&VarRef> for Expression {
    fn from(v: &VarRef) -> Self {
        Expression::Variable(v.clone())
    }
}

impl From<ArrayRef> for Expression {
    fn from(a: ArrayRef) -> Self {
        Expression::Array(a)
    }
}

impl From<&ArrayRef> for Expression {
    fn from(a: &ArrayRef) -> Self {
        Expression::Array(a.clone())
    }
}

impl From<IoChannel> for Expression {
    fn from(io: IoChannel) -> Self {
        Expression::HostIo(io)
    }
}

/// Anything that may appear where an expression is expected.
///
/// Result streams convert into [`Operand::Stream`] so that misuse is reported
/// as an [`IrError::Type`] instead of silently producing a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Expr(Expression),
    Stream(String),
}

macro_rules! impl_operand_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::Expr(v.into())
                }
            }
        )*
    };
}

impl_operand_from!(
    i32,
    i64,
    u32,
    f64,
    bool,
    Literal,
    Expression,
    &Expression,
    VarRef,
    &VarRef,
    ArrayRef,
    &ArrayRef,
    IoChannel
);

/// Coerce a host value into an expression.
///
/// With an `index`, `value` must be an array and the result is the indexed
/// cell.
pub fn to_expression(value: impl Into<Operand>, index: Option<Operand>) -> IrResult<Expression> {
    let value = match value.into() {
        Operand::Expr(expr) => expr,
        Operand::Stream(name) => {
            return Err(IrError::Type(format!(
                "result stream '{name}' cannot be used in an expression"
            )));
        }
    };

    let Some(index) = index else {
        return Ok(value);
    };
    let index = to_expression(index, None)?;
    match value {
        Expression::Array(array) => Ok(Expression::ArrayCell {
            array,
            index: Box::new(index),
        }),
        other => Err(IrError::Type(format!("{other} is not an array"))),
    }
}

/// Shorthand for [`Expression::literal`].
pub fn literal(value: impl Into<Literal>) -> Expression {
    Expression::literal(value)
}

// ============================================================================
// Operators
// ============================================================================

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expression>> ops::$trait<R> for Expression {
            type Output = Expression;

            fn $method(self, rhs: R) -> Expression {
                Expression::bin($op, self, rhs.into())
            }
        }

        impl<R: Into<Expression>> ops::$trait<R> for &Expression {
            type Output = Expression;

            fn $method(self, rhs: R) -> Expression {
                Expression::bin($op, self.clone(), rhs.into())
            }
        }

        impl<R: Into<Expression>> ops::$trait<R> for VarRef {
            type Output = Expression;

            fn $method(self, rhs: R) -> Expression {
                Expression::bin($op, Expression::Variable(self), rhs.into())
            }
        }

        impl<R: Into<Expression>> ops::$trait<R> for &VarRef {
            type Output = Expression;

            fn $method(self, rhs: R) -> Expression {
                Expression::bin($op, self.into(), rhs.into())
            }
        }

        impl_binary_op!(@lhs $trait, $method, $op; i32, i64, f64);
    };
    (@lhs $trait:ident, $method:ident, $op:expr; $($lhs:ty),*) => {
        $(
            impl ops::$trait<Expression> for $lhs {
                type Output = Expression;

                fn $method(self, rhs: Expression) -> Expression {
                    Expression::bin($op, self.into(), rhs)
                }
            }

            impl ops::$trait<&Expression> for $lhs {
                type Output = Expression;

                fn $method(self, rhs: &Expression) -> Expression {
                    Expression::bin($op, self.into(), rhs.clone())
                }
            }

            impl ops::$trait<&VarRef> for $lhs {
                type Output = Expression;

                fn $method(self, rhs: &VarRef) -> Expression {
                    Expression::bin($op, self.into(), rhs.into())
                }
            }
        )*
    };
}

impl_binary_op!(Add, add, BinaryOperator::Add);
impl_binary_op!(Sub, sub, BinaryOperator::Sub);
impl_binary_op!(Mul, mul, BinaryOperator::Mul);
impl_binary_op!(Div, div, BinaryOperator::Div);
impl_binary_op!(Shl, shl, BinaryOperator::Shl);
impl_binary_op!(Shr, shr, BinaryOperator::Shr);
impl_binary_op!(BitAnd, bitand, BinaryOperator::BitAnd);
impl_binary_op!(BitOr, bitor, BinaryOperator::BitOr);
impl_binary_op!(BitXor, bitxor, BinaryOperator::BitXor);

macro_rules! impl_unary_ops {
    ($($t:ty),*) => {
        $(
            impl ops::Neg for $t {
                type Output = Expression;

                /// Negation is `0 - x`.
                fn neg(self) -> Expression {
                    Expression::bin(BinaryOperator::Sub, Expression::literal(0), self.into())
                }
            }

            impl ops::Not for $t {
                type Output = Expression;

                /// Not is `x ^ true`.
                fn not(self) -> Expression {
                    Expression::bin(BinaryOperator::BitXor, self.into(), Expression::literal(true))
                }
            }
        )*
    };
}

impl_unary_ops!(Expression, &Expression, VarRef, &VarRef);

/// Comparison constructors.
///
/// Comparisons are methods rather than `PartialOrd` impls because they build
/// nodes instead of answering questions.
pub trait Compare {
    /// This operand as an expression.
    fn to_expr(&self) -> Expression;

    fn lt(&self, rhs: impl Into<Expression>) -> Expression {
        Expression::bin(BinaryOperator::Lt, self.to_expr(), rhs.into())
    }

    fn le(&self, rhs: impl Into<Expression>) -> Expression {
        Expression::bin(BinaryOperator::Le, self.to_expr(), rhs.into())
    }

    fn gt(&self, rhs: impl Into<Expression>) -> Expression {
        Expression::bin(BinaryOperator::Gt, self.to_expr(), rhs.into())
    }

    fn ge(&self, rhs: impl Into<Expression>) -> Expression {
        Expression::bin(BinaryOperator::Ge, self.to_expr(), rhs.into())
    }

    fn equals(&self, rhs: impl Into<Expression>) -> Expression {
        Expression::bin(BinaryOperator::Eq, self.to_expr(), rhs.into())
    }
}

impl Compare for Expression {
    fn to_expr(&self) -> Expression {
        self.clone()
    }
}

impl Compare for VarRef {
    fn to_expr(&self) -> Expression {
        Expression::Variable(self.clone())
    }
}

/// Math library.
pub mod math {
    use super::{Expression, MathFunction};

    pub fn sin(x: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::Sin, x)
    }

    pub fn cos(x: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::Cos, x)
    }

    /// `sin(2*pi*x)`.
    pub fn sin2pi(x: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::Sin2Pi, x)
    }

    /// `cos(2*pi*x)`.
    pub fn cos2pi(x: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::Cos2Pi, x)
    }

    pub fn sum(array: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::Sum, array)
    }

    pub fn max(array: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::Max, array)
    }

    pub fn min(array: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::Min, array)
    }

    pub fn argmax(array: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::ArgMax, array)
    }

    pub fn argmin(array: impl Into<Expression>) -> Expression {
        Expression::math(MathFunction::ArgMin, array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> VarRef {
        VarRef::new(name)
    }

    #[test]
    fn test_literals_map_one_to_one() {
        assert_eq!(to_expression(3, None).unwrap(), Expression::Literal(Literal::Int(3)));
        assert_eq!(
            to_expression(0.25, None).unwrap(),
            Expression::Literal(Literal::Fixed(0.25))
        );
        assert_eq!(
            to_expression(true, None).unwrap(),
            Expression::Literal(Literal::Bool(true))
        );
    }

    #[test]
    fn test_existing_expression_unwraps() {
        let e = var("v1") + 1;
        assert_eq!(to_expression(&e, None).unwrap(), e);
    }

    #[test]
    fn test_array_index_builds_cell() {
        let a = ArrayRef::new("a1");
        let cell = to_expression(&a, Some(var("v1").into())).unwrap();
        assert_eq!(cell, a.at(var("v1")));
        assert_eq!(cell.to_string(), "a1[v1]");
    }

    #[test]
    fn test_index_on_scalar_is_type_error() {
        let err = to_expression(var("v1"), Some(0.into())).unwrap_err();
        assert!(matches!(err, IrError::Type(_)));
    }

    #[test]
    fn test_stream_operand_is_type_error() {
        let err = to_expression(Operand::Stream("r1".into()), None).unwrap_err();
        assert!(matches!(err, IrError::Type(msg) if msg.contains("r1")));

        let err = Expression::binary(BinaryOperator::Add, 1, Operand::Stream("r2".into()));
        assert!(err.is_err());
    }

    #[test]
    fn test_operators_build_binary_nodes() {
        let x = var("v1");
        let e = &x * 2 + 0.5;
        assert_eq!(e.to_string(), "((v1 * 2) + 0.5)");

        let e: Expression = 1 - &x;
        assert_eq!(e.to_string(), "(1 - v1)");

        let e = (&x << 2) ^ (&x >> 1);
        assert_eq!(e.to_string(), "((v1 << 2) ^ (v1 >> 1))");
    }

    #[test]
    fn test_comparisons() {
        let i = var("v1");
        assert_eq!(i.lt(10).to_string(), "(v1 < 10)");
        assert_eq!((&i + 1).ge(3).to_string(), "((v1 + 1) >= 3)");
        assert_eq!(i.equals(true).to_string(), "(v1 == true)");
    }

    #[test]
    fn test_unary_desugaring() {
        let x = var("v1");
        assert_eq!((-&x).to_string(), "(0 - v1)");
        assert_eq!((!x).to_string(), "(v1 ^ true)");
    }

    #[test]
    fn test_length() {
        let a = Expression::from(ArrayRef::new("a2"));
        assert_eq!(a.length().unwrap(), Expression::ArrayLength(ArrayRef::new("a2")));
        assert!(matches!(var("v1").to_expr().length(), Err(IrError::Type(_))));
    }

    #[test]
    fn test_math_and_io() {
        let a = ArrayRef::new("a1");
        assert_eq!(math::sum(&a).to_string(), "sum(a1)");
        assert_eq!(math::cos2pi(var("v3") * 0.5).to_string(), "cos2pi((v3 * 0.5))");
        assert_eq!(Expression::from(IO2).to_string(), "IO2");
    }

    #[test]
    fn test_serde_roundtrip() {
        let e = math::sin(var("v1")).lt(ArrayRef::new("a1").at(2));
        let json = serde_json::to_string(&e).unwrap();
        let back: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
