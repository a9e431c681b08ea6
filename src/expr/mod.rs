// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Parametrized values: literals, variable references and arithmetic
//! expressions over them.
//!
//! An [`Expr`] is resolved to a concrete [`Value`] by [`evaluate`] once every
//! referenced variable is bound. In a sequence document an expression is
//! written as one of:
//!
//! ```text
//! 1.5                                        literal scalar
//! [0.0, 1.0, 0.5]                            literal array
//! {"variable": "t"}                          variable reference
//! {"expression": "mul", "lhs": 1000, "rhs": {...}}   binary node
//! {"expression": "sqrt", "lhs": {...}}       unary node
//! {"expression": "index", "lhs": {"variable": "t"}, "rhs": 1}
//! ```

pub mod eval;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use eval::{
    eval_array, eval_int, eval_int_array, eval_scalar, evaluate, round_half_even, Bindings,
};

/// A concrete evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Single number
    Scalar(f64),
    /// Fixed-length numeric array
    Array(Vec<f64>),
}

impl Value {
    /// Number of elements (a scalar counts as one).
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Array(values) => values.len(),
        }
    }

    /// True for an empty array.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into an array; a scalar becomes a one-element array.
    pub fn into_vec(self) -> Vec<f64> {
        match self {
            Value::Scalar(x) => vec![x],
            Value::Array(values) => values,
        }
    }

    /// Apply `f` to every element, keeping the shape.
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Value::Scalar(x) => Value::Scalar(f(x)),
            Value::Array(values) => Value::Array(values.into_iter().map(f).collect()),
        }
    }
}

/// Element-wise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Floored modulo: the result takes the sign of the divisor.
    Mod,
    Pow,
}

impl BinaryOp {
    /// Operator name as used in sequence documents.
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Pow => "pow",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "div" => BinaryOp::Div,
            "mod" => BinaryOp::Mod,
            "pow" => BinaryOp::Pow,
            _ => return None,
        })
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }

    /// Apply to a pair of elements.
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a - b * (a / b).floor(),
            BinaryOp::Pow => a.powf(b),
        }
    }
}

/// Element-wise unary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Abs,
    Floor,
    Ceil,
    /// Round half to even, the same rule used for integer contexts.
    Round,
    Sqrt,
    Exp,
    Log2,
    Log,
    Sin,
    Cos,
    Tan,
}

impl UnaryOp {
    /// Operator name as used in sequence documents.
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Floor => "floor",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Round => "round",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Log2 => "log2",
            UnaryOp::Log => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "neg" => UnaryOp::Neg,
            "abs" => UnaryOp::Abs,
            "floor" => UnaryOp::Floor,
            "ceil" => UnaryOp::Ceil,
            "round" => UnaryOp::Round,
            "sqrt" => UnaryOp::Sqrt,
            "exp" => UnaryOp::Exp,
            "log2" => UnaryOp::Log2,
            "log" => UnaryOp::Log,
            "sin" => UnaryOp::Sin,
            "cos" => UnaryOp::Cos,
            "tan" => UnaryOp::Tan,
            _ => return None,
        })
    }

    /// Apply to one element.
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Floor => x.floor(),
            UnaryOp::Ceil => x.ceil(),
            UnaryOp::Round => round_half_even(x),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log2 => x.log2(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
        }
    }
}

/// A parametrized value.
///
/// `Index` only ever indexes a variable by name, so double indirection
/// cannot be expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExprRepr", into = "ExprRepr")]
pub enum Expr {
    /// Literal scalar or array
    Literal(Value),
    /// Reference to a declared variable (evaluates to its whole array)
    Var(String),
    /// Element-wise unary function
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Element-wise binary operator
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Select elements of a variable; shape follows `indices`
    Index { variable: String, indices: Box<Expr> },
}

impl Expr {
    /// Literal scalar.
    pub fn scalar(x: f64) -> Self {
        Expr::Literal(Value::Scalar(x))
    }

    /// Literal array.
    pub fn array(values: impl Into<Vec<f64>>) -> Self {
        Expr::Literal(Value::Array(values.into()))
    }

    /// Variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// `variable[indices]`.
    pub fn index(variable: impl Into<String>, indices: impl Into<Expr>) -> Self {
        Expr::Index {
            variable: variable.into(),
            indices: Box::new(indices.into()),
        }
    }

    /// Binary node.
    pub fn binary(op: BinaryOp, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs.into()),
            rhs: Box::new(rhs.into()),
        }
    }

    /// Unary node.
    pub fn unary(op: UnaryOp, operand: impl Into<Expr>) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand.into()),
        }
    }

    /// True when the expression references no variable.
    pub fn is_literal(&self) -> bool {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names.is_empty()
    }

    /// Add the names of all referenced variables to `out`.
    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Unary { operand, .. } => operand.collect_variables(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::Index { variable, indices } => {
                out.insert(variable.clone());
                indices.collect_variables(out);
            }
        }
    }
}

impl From<f64> for Expr {
    fn from(x: f64) -> Self {
        Expr::scalar(x)
    }
}

impl From<Vec<f64>> for Expr {
    fn from(values: Vec<f64>) -> Self {
        Expr::array(values)
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::scalar(0.0)
    }
}

macro_rules! impl_expr_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

impl_expr_binop!(Add, add, BinaryOp::Add);
impl_expr_binop!(Sub, sub, BinaryOp::Sub);
impl_expr_binop!(Mul, mul, BinaryOp::Mul);
impl_expr_binop!(Div, div, BinaryOp::Div);
impl_expr_binop!(Rem, rem, BinaryOp::Mod);

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Scalar(x)) => write!(f, "{}", x),
            Expr::Literal(Value::Array(values)) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Unary { op, operand } => write!(f, "{}({})", op.name(), operand),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Index { variable, indices } => write!(f, "{}[{}]", variable, indices),
        }
    }
}

/// Document representation of an [`Expr`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ExprRepr {
    Scalar(f64),
    Array(Vec<f64>),
    Variable {
        variable: String,
    },
    Node {
        expression: String,
        lhs: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rhs: Option<Box<Expr>>,
    },
}

impl TryFrom<ExprRepr> for Expr {
    type Error = String;

    fn try_from(repr: ExprRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ExprRepr::Scalar(x) => Ok(Expr::scalar(x)),
            ExprRepr::Array(values) => Ok(Expr::array(values)),
            ExprRepr::Variable { variable } => Ok(Expr::Var(variable)),
            ExprRepr::Node {
                expression,
                lhs,
                rhs,
            } => {
                if expression == "index" {
                    let variable = match *lhs {
                        Expr::Var(name) => name,
                        other => {
                            return Err(format!(
                                "'index' must be applied to a variable reference, got {}",
                                other
                            ))
                        }
                    };
                    let indices = rhs.ok_or("'index' requires an 'rhs' operand")?;
                    return Ok(Expr::Index { variable, indices });
                }
                if let Some(op) = BinaryOp::from_name(&expression) {
                    let rhs = rhs.ok_or_else(|| format!("'{}' requires an 'rhs' operand", expression))?;
                    return Ok(Expr::Binary { op, lhs, rhs });
                }
                if let Some(op) = UnaryOp::from_name(&expression) {
                    if rhs.is_some() {
                        return Err(format!("'{}' takes a single operand", expression));
                    }
                    return Ok(Expr::Unary { op, operand: lhs });
                }
                Err(format!("unknown expression operator '{}'", expression))
            }
        }
    }
}

impl From<Expr> for ExprRepr {
    fn from(expr: Expr) -> Self {
        match expr {
            Expr::Literal(Value::Scalar(x)) => ExprRepr::Scalar(x),
            Expr::Literal(Value::Array(values)) => ExprRepr::Array(values),
            Expr::Var(variable) => ExprRepr::Variable { variable },
            Expr::Unary { op, operand } => ExprRepr::Node {
                expression: op.name().to_string(),
                lhs: operand,
                rhs: None,
            },
            Expr::Binary { op, lhs, rhs } => ExprRepr::Node {
                expression: op.name().to_string(),
                lhs,
                rhs: Some(rhs),
            },
            Expr::Index { variable, indices } => ExprRepr::Node {
                expression: "index".to_string(),
                lhs: Box::new(Expr::Var(variable)),
                rhs: Some(indices),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Document form
    // =========================================================================

    #[test]
    fn test_parse_literals() {
        let e: Expr = serde_json::from_str("2").unwrap();
        assert_eq!(e, Expr::scalar(2.0));
        let e: Expr = serde_json::from_str("[1, 2.5]").unwrap();
        assert_eq!(e, Expr::array(vec![1.0, 2.5]));
    }

    #[test]
    fn test_parse_nested_expression() {
        let json = r#"{
            "expression": "mul",
            "lhs": 1000,
            "rhs": {"expression": "index", "lhs": {"variable": "t"}, "rhs": 1}
        }"#;
        let e: Expr = serde_json::from_str(json).unwrap();
        assert_eq!(e, Expr::scalar(1000.0) * Expr::index("t", 1.0));
    }

    #[test]
    fn test_parse_unary() {
        let e: Expr = serde_json::from_str(r#"{"expression": "sqrt", "lhs": 4}"#).unwrap();
        assert_eq!(e, Expr::unary(UnaryOp::Sqrt, 4.0));
    }

    #[test]
    fn test_parse_index_of_expression_rejected() {
        let json = r#"{
            "expression": "index",
            "lhs": {"expression": "neg", "lhs": {"variable": "t"}},
            "rhs": 0
        }"#;
        let err = serde_json::from_str::<Expr>(json).unwrap_err();
        assert!(err.to_string().contains("variable reference"));
    }

    #[test]
    fn test_parse_unknown_operator() {
        let err = serde_json::from_str::<Expr>(r#"{"expression": "xor", "lhs": 1, "rhs": 2}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown expression operator"));
    }

    #[test]
    fn test_parse_binary_missing_rhs() {
        assert!(serde_json::from_str::<Expr>(r#"{"expression": "add", "lhs": 1}"#).is_err());
    }

    #[test]
    fn test_serialize_matches_document_form() {
        let e = Expr::index("t", 0.0) + 1.0;
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "expression": "add",
                "lhs": {"expression": "index", "lhs": {"variable": "t"}, "rhs": 0.0},
                "rhs": 1.0
            })
        );
        let back: Expr = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn test_collect_variables() {
        let e = Expr::var("a") * Expr::index("b", Expr::var("i")) - 2.0;
        let mut names = BTreeSet::new();
        e.collect_variables(&mut names);
        let names: Vec<_> = names.into_iter().collect();
        assert_eq!(names, vec!["a", "b", "i"]);
        assert!(!e.is_literal());
        assert!(Expr::scalar(1.0).is_literal());
    }

    #[test]
    fn test_display() {
        let e = -(Expr::var("t") % 3.0);
        assert_eq!(e.to_string(), "neg((t % 3))");
        assert_eq!(Expr::index("t", vec![0.0, 2.0]).to_string(), "t[[0, 2]]");
    }

    #[test]
    fn test_floored_mod_sign_follows_divisor() {
        assert_eq!(BinaryOp::Mod.apply(7.0, 3.0), 1.0);
        assert_eq!(BinaryOp::Mod.apply(-7.0, 3.0), 2.0);
        assert_eq!(BinaryOp::Mod.apply(7.0, -3.0), -2.0);
    }
}
