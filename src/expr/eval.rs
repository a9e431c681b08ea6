// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Expression evaluation against variable bindings.
//!
//! All arithmetic is performed in `f64`. Where the caller needs an integer
//! (durations, indices) the final value is rounded half to even, so `2.5`
//! becomes `2` and `3.5` becomes `4`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Expr, Value};
use crate::error::{BuildErrorKind, KindResult};

/// Concrete values for declared variables, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct Bindings {
    values: BTreeMap<String, Vec<f64>>,
}

impl Bindings {
    /// Create an empty set of bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `values`, replacing any previous binding.
    pub fn insert(&mut self, name: impl Into<String>, values: impl Into<Vec<f64>>) {
        self.values.insert(name.into(), values.into());
    }

    /// Builder-style [`insert`](Bindings::insert).
    pub fn with(mut self, name: impl Into<String>, values: impl Into<Vec<f64>>) -> Self {
        self.insert(name, values);
        self
    }

    /// Values bound to `name`.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Iterate bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Bindings {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self {
            values: map.into_iter().map(|(k, v)| (k, v.into_vec())).collect(),
        }
    }
}

impl From<Bindings> for BTreeMap<String, Value> {
    fn from(bindings: Bindings) -> Self {
        bindings
            .values
            .into_iter()
            .map(|(k, v)| (k, Value::Array(v)))
            .collect()
    }
}

/// Round half to even (banker's rounding).
pub fn round_half_even(x: f64) -> f64 {
    x.round_ties_even()
}

/// Evaluate `expr` against `bindings`.
///
/// # Errors
///
/// - [`BuildErrorKind::UnboundVariable`] for a reference with no binding
/// - [`BuildErrorKind::LengthMismatch`] for element-wise ops on arrays of
///   different lengths
/// - [`BuildErrorKind::IndexOutOfRange`] for an index outside the variable
/// - [`BuildErrorKind::TypeMismatch`] for a non-finite index
pub fn evaluate(expr: &Expr, bindings: &Bindings) -> KindResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => lookup(name, bindings).map(|values| Value::Array(values.to_vec())),
        Expr::Unary { op, operand } => Ok(evaluate(operand, bindings)?.map(|x| op.apply(x))),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, bindings)?;
            let rhs = evaluate(rhs, bindings)?;
            match (lhs, rhs) {
                (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(op.apply(a, b))),
                (Value::Scalar(a), Value::Array(bs)) => Ok(Value::Array(
                    bs.into_iter().map(|b| op.apply(a, b)).collect(),
                )),
                (Value::Array(as_), Value::Scalar(b)) => Ok(Value::Array(
                    as_.into_iter().map(|a| op.apply(a, b)).collect(),
                )),
                (Value::Array(as_), Value::Array(bs)) => {
                    if as_.len() != bs.len() {
                        return Err(BuildErrorKind::LengthMismatch {
                            lhs: as_.len(),
                            rhs: bs.len(),
                        });
                    }
                    Ok(Value::Array(
                        as_.into_iter()
                            .zip(bs)
                            .map(|(a, b)| op.apply(a, b))
                            .collect(),
                    ))
                }
            }
        }
        Expr::Index { variable, indices } => {
            let values = lookup(variable, bindings)?;
            let pick = |raw: f64| -> KindResult<f64> {
                let index = to_int(raw, "index")?;
                if index < 0 || index as usize >= values.len() {
                    return Err(BuildErrorKind::IndexOutOfRange {
                        variable: variable.clone(),
                        index,
                        len: values.len(),
                    });
                }
                Ok(values[index as usize])
            };
            match evaluate(indices, bindings)? {
                Value::Scalar(i) => Ok(Value::Scalar(pick(i)?)),
                Value::Array(is) => Ok(Value::Array(
                    is.into_iter().map(pick).collect::<KindResult<_>>()?,
                )),
            }
        }
    }
}

fn lookup<'a>(name: &str, bindings: &'a Bindings) -> KindResult<&'a [f64]> {
    bindings
        .get(name)
        .ok_or_else(|| BuildErrorKind::UnboundVariable(name.to_string()))
}

/// Convert a floating result to an integer, rounding half to even.
fn to_int(x: f64, what: &str) -> KindResult<i64> {
    if !x.is_finite() {
        return Err(BuildErrorKind::TypeMismatch(format!(
            "{} must be a finite number, got {}",
            what, x
        )));
    }
    Ok(round_half_even(x) as i64)
}

/// Evaluate in a scalar context. A one-element array is accepted.
pub fn eval_scalar(expr: &Expr, bindings: &Bindings, what: &str) -> KindResult<f64> {
    match evaluate(expr, bindings)? {
        Value::Scalar(x) => Ok(x),
        Value::Array(values) if values.len() == 1 => Ok(values[0]),
        Value::Array(values) => Err(BuildErrorKind::TypeMismatch(format!(
            "{} expects a scalar, got an array of length {}",
            what,
            values.len()
        ))),
    }
}

/// Evaluate in an integer scalar context.
pub fn eval_int(expr: &Expr, bindings: &Bindings, what: &str) -> KindResult<i64> {
    to_int(eval_scalar(expr, bindings, what)?, what)
}

/// Evaluate in an array context. A scalar becomes a one-element array.
pub fn eval_array(expr: &Expr, bindings: &Bindings) -> KindResult<Vec<f64>> {
    Ok(evaluate(expr, bindings)?.into_vec())
}

/// Evaluate in an integer array context.
pub fn eval_int_array(expr: &Expr, bindings: &Bindings, what: &str) -> KindResult<Vec<i64>> {
    eval_array(expr, bindings)?
        .into_iter()
        .map(|x| to_int(x, what))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::UnaryOp;
    use approx::assert_relative_eq;

    fn bindings() -> Bindings {
        Bindings::new()
            .with("v", vec![10.0, 20.0, 30.0])
            .with("t", vec![2.0, 3.0])
            .with("x", vec![0.5])
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    #[test]
    fn test_literal() {
        assert_eq!(
            evaluate(&Expr::scalar(1.5), &Bindings::new()).unwrap(),
            Value::Scalar(1.5)
        );
    }

    #[test]
    fn test_variable_is_array() {
        assert_eq!(
            evaluate(&Expr::var("t"), &bindings()).unwrap(),
            Value::Array(vec![2.0, 3.0])
        );
    }

    #[test]
    fn test_unbound_variable() {
        let err = evaluate(&Expr::var("nope"), &bindings()).unwrap_err();
        assert_eq!(err, BuildErrorKind::UnboundVariable("nope".into()));
    }

    // =========================================================================
    // Index
    // =========================================================================

    #[test]
    fn test_index_array_indices() {
        let e = Expr::index("v", vec![2.0]);
        assert_eq!(evaluate(&e, &bindings()).unwrap(), Value::Array(vec![30.0]));
    }

    #[test]
    fn test_index_scalar_index_gives_scalar() {
        let e = Expr::index("v", 1.0);
        assert_eq!(evaluate(&e, &bindings()).unwrap(), Value::Scalar(20.0));
    }

    #[test]
    fn test_index_result_follows_index_length() {
        let e = Expr::index("v", vec![0.0, 0.0, 2.0, 1.0]);
        assert_eq!(
            evaluate(&e, &bindings()).unwrap(),
            Value::Array(vec![10.0, 10.0, 30.0, 20.0])
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let e = Expr::index("v", vec![5.0]);
        let err = evaluate(&e, &bindings()).unwrap_err();
        assert_eq!(
            err,
            BuildErrorKind::IndexOutOfRange {
                variable: "v".into(),
                index: 5,
                len: 3
            }
        );
    }

    #[test]
    fn test_index_negative() {
        let e = Expr::index("v", -1.0);
        assert!(matches!(
            evaluate(&e, &bindings()),
            Err(BuildErrorKind::IndexOutOfRange { index: -1, .. })
        ));
    }

    #[test]
    fn test_index_by_variable() {
        let b = bindings().with("i", vec![1.0, 0.0]);
        let e = Expr::index("t", Expr::var("i"));
        assert_eq!(evaluate(&e, &b).unwrap(), Value::Array(vec![3.0, 2.0]));
    }

    // =========================================================================
    // Element-wise arithmetic
    // =========================================================================

    #[test]
    fn test_scalar_broadcasts() {
        let e = Expr::scalar(1000.0) * Expr::var("t");
        assert_eq!(
            evaluate(&e, &bindings()).unwrap(),
            Value::Array(vec![2000.0, 3000.0])
        );
        let e = Expr::var("t") - 1.0;
        assert_eq!(
            evaluate(&e, &bindings()).unwrap(),
            Value::Array(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_array_array_equal_lengths() {
        let e = Expr::var("t") + Expr::array(vec![1.0, 1.0]);
        assert_eq!(
            evaluate(&e, &bindings()).unwrap(),
            Value::Array(vec![3.0, 4.0])
        );
    }

    #[test]
    fn test_array_length_mismatch() {
        let e = Expr::var("t") + Expr::var("v");
        assert_eq!(
            evaluate(&e, &bindings()).unwrap_err(),
            BuildErrorKind::LengthMismatch { lhs: 2, rhs: 3 }
        );
    }

    #[test]
    fn test_pow_and_unary() {
        let e = Expr::unary(
            UnaryOp::Sqrt,
            Expr::binary(crate::expr::BinaryOp::Pow, 3.0, 2.0),
        );
        assert_relative_eq!(eval_scalar(&e, &Bindings::new(), "x").unwrap(), 3.0);
        let e = Expr::unary(UnaryOp::Log2, 8.0);
        assert_relative_eq!(eval_scalar(&e, &Bindings::new(), "x").unwrap(), 3.0);
        let e = Expr::unary(UnaryOp::Cos, 0.0);
        assert_relative_eq!(eval_scalar(&e, &Bindings::new(), "x").unwrap(), 1.0);
    }

    #[test]
    fn test_evaluation_is_pure() {
        let b = bindings();
        let e = Expr::var("t") * Expr::index("v", 0.0);
        assert_eq!(evaluate(&e, &b).unwrap(), evaluate(&e, &b).unwrap());
        assert_eq!(b, bindings());
    }

    // =========================================================================
    // Contexts and rounding
    // =========================================================================

    #[test]
    fn test_scalar_context_accepts_single_element() {
        assert_eq!(eval_scalar(&Expr::var("x"), &bindings(), "phase").unwrap(), 0.5);
    }

    #[test]
    fn test_scalar_context_rejects_array() {
        let err = eval_scalar(&Expr::var("t"), &bindings(), "phase").unwrap_err();
        assert!(matches!(err, BuildErrorKind::TypeMismatch(msg) if msg.contains("phase")));
    }

    #[test]
    fn test_int_context_rounds_half_to_even() {
        let b = Bindings::new();
        assert_eq!(eval_int(&Expr::scalar(2.5), &b, "d").unwrap(), 2);
        assert_eq!(eval_int(&Expr::scalar(3.5), &b, "d").unwrap(), 4);
        assert_eq!(eval_int(&Expr::scalar(-2.5), &b, "d").unwrap(), -2);
        assert_eq!(eval_int(&Expr::scalar(2.4999), &b, "d").unwrap(), 2);
        assert_eq!(eval_int(&Expr::scalar(2.5001), &b, "d").unwrap(), 3);
    }

    #[test]
    fn test_round_operator_matches_int_context() {
        let e = Expr::unary(UnaryOp::Round, Expr::array(vec![0.5, 1.5, 2.5]));
        assert_eq!(
            evaluate(&e, &Bindings::new()).unwrap(),
            Value::Array(vec![0.0, 2.0, 2.0])
        );
    }

    #[test]
    fn test_int_context_rejects_nan() {
        let e = Expr::unary(UnaryOp::Sqrt, -1.0);
        assert!(matches!(
            eval_int(&e, &Bindings::new(), "duration"),
            Err(BuildErrorKind::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_int_array_context() {
        let e = Expr::var("t") + 1.0;
        assert_eq!(eval_int_array(&e, &bindings(), "targets").unwrap(), vec![3, 4]);
        assert_eq!(eval_int_array(&Expr::scalar(2.0), &bindings(), "t").unwrap(), vec![2]);
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    #[test]
    fn test_bindings_from_json_scalars_and_arrays() {
        let b: Bindings = serde_json::from_str(r#"{"t": [2, 3], "delay": 120}"#).unwrap();
        assert_eq!(b.get("t"), Some(&[2.0, 3.0][..]));
        assert_eq!(b.get("delay"), Some(&[120.0][..]));
        assert_eq!(b.len(), 2);
    }
}
