//! Boolean permission expressions over checkers
//!
//! Expressions are built once and evaluated many times:
//!
//! ```text
//! let can_edit = (Checker::owner() | Checker::ancestor("write")) & !Checker::global("frozen");
//! ```
//!
//! `And`/`Or` evaluate left to right and short-circuit. In speculative mode
//! both sides start together and the undecided side is dropped (cancelled)
//! as soon as the other side settles the result; the answer, errors
//! included, is always the one sequential evaluation would give.

use crate::checkers::{CheckEnv, CheckRequest, Checker};
use crate::error::{RbacError, Result};
use futures::future::{select, BoxFuture, Either};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// How `And`/`Or` schedule their operands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Right operand starts only if the left one did not decide
    #[default]
    Sequential,

    /// Both operands start together; the loser is cancelled
    Speculative,
}

/// Permission expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Leaf(Checker),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Evaluate against one request
    pub fn evaluate<'a>(
        &'a self,
        env: &'a CheckEnv,
        request: &'a CheckRequest,
        mode: EvaluationMode,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            match self {
                Expr::Leaf(checker) => checker.check(env, request).await,
                Expr::Not(child) => Ok(!child.evaluate(env, request, mode).await?),
                Expr::And(left, right) => {
                    combine(left, right, false, env, request, mode).await
                }
                Expr::Or(left, right) => {
                    combine(left, right, true, env, request, mode).await
                }
            }
        }
        .boxed()
    }

    /// Every checker in the tree, left to right
    pub fn checkers(&self) -> Vec<&Checker> {
        let mut found = Vec::new();
        self.collect_checkers(&mut found);
        found
    }

    fn collect_checkers<'a>(&'a self, found: &mut Vec<&'a Checker>) {
        match self {
            Expr::Leaf(checker) => found.push(checker),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_checkers(found);
                right.collect_checkers(found);
            }
            Expr::Not(child) => child.collect_checkers(found),
        }
    }

    /// Parse an expression document
    ///
    /// Leaves are checker documents such as `{"propagated": "write"}`;
    /// `{"and": [..]}` and `{"or": [..]}` fold their operands left to right,
    /// `{"not": x}` negates one operand.
    ///
    /// # Errors
    ///
    /// `ExpressionType` if an operand is not an expression document.
    pub fn from_json(doc: &Value) -> Result<Self> {
        let Value::Object(fields) = doc else {
            return Err(RbacError::ExpressionType(format!(
                "expected an expression document, found {}",
                kind_of(doc)
            )));
        };

        let mut entries = fields.iter();
        let (key, operand) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(RbacError::ExpressionType(format!(
                    "expression document must have exactly one key, found {}",
                    fields.len()
                )))
            }
        };

        match key.as_str() {
            "not" => Ok(!Self::from_json(operand)?),
            "and" | "or" => {
                let Value::Array(operands) = operand else {
                    return Err(RbacError::ExpressionType(format!(
                        "'{}' takes a list of expressions, found {}",
                        key,
                        kind_of(operand)
                    )));
                };

                let mut parsed = operands.iter().map(Self::from_json);
                let first = parsed.next().ok_or_else(|| {
                    RbacError::ExpressionType(format!("'{}' needs at least one operand", key))
                })??;

                parsed.try_fold(first, |acc, next| {
                    let next = next?;
                    Ok(if key == "and" { acc & next } else { acc | next })
                })
            }
            _ => serde_json::from_value::<Checker>(doc.clone())
                .map(Expr::Leaf)
                .map_err(|e| RbacError::ExpressionType(format!("invalid checker '{}': {}", key, e))),
        }
    }

    /// Parse an expression document from text
    pub fn parse(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_json(&doc)
    }

    /// Render as an expression document
    pub fn to_json(&self) -> Value {
        match self {
            Expr::Leaf(checker) => {
                serde_json::to_value(checker).unwrap_or_else(|_| Value::Object(Map::new()))
            }
            Expr::And(left, right) => json!({ "and": [left.to_json(), right.to_json()] }),
            Expr::Or(left, right) => json!({ "or": [left.to_json(), right.to_json()] }),
            Expr::Not(child) => json!({ "not": child.to_json() }),
        }
    }
}

/// Shared shape of `And` (`decisive = false`) and `Or` (`decisive = true`)
async fn combine(
    left: &Expr,
    right: &Expr,
    decisive: bool,
    env: &CheckEnv,
    request: &CheckRequest,
    mode: EvaluationMode,
) -> Result<bool> {
    match mode {
        EvaluationMode::Sequential => {
            if left.evaluate(env, request, mode).await? == decisive {
                return Ok(decisive);
            }
            right.evaluate(env, request, mode).await
        }
        EvaluationMode::Speculative => {
            let lhs = left.evaluate(env, request, mode);
            let rhs = right.evaluate(env, request, mode);

            match select(lhs, rhs).await {
                Either::Left((left_result, pending_right)) => {
                    if left_result? == decisive {
                        // Dropping the pending side cancels it
                        return Ok(decisive);
                    }
                    pending_right.await
                }
                Either::Right((right_result, pending_left)) => {
                    if pending_left.await? == decisive {
                        return Ok(decisive);
                    }
                    right_result
                }
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

impl From<Checker> for Expr {
    fn from(checker: Checker) -> Self {
        Expr::Leaf(checker)
    }
}

impl<R: Into<Expr>> BitAnd<R> for Expr {
    type Output = Expr;

    fn bitand(self, rhs: R) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs.into()))
    }
}

impl<R: Into<Expr>> BitOr<R> for Expr {
    type Output = Expr;

    fn bitor(self, rhs: R) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs.into()))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl<R: Into<Expr>> BitAnd<R> for Checker {
    type Output = Expr;

    fn bitand(self, rhs: R) -> Expr {
        Expr::from(self) & rhs
    }
}

impl<R: Into<Expr>> BitOr<R> for Checker {
    type Output = Expr;

    fn bitor(self, rhs: R) -> Expr {
        Expr::from(self) | rhs
    }
}

impl Not for Checker {
    type Output = Expr;

    fn not(self) -> Expr {
        !Expr::from(self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Leaf(checker) => write!(f, "{}", checker),
            Expr::And(left, right) => write!(f, "({} & {})", left, right),
            Expr::Or(left, right) => write!(f, "({} | {})", left, right),
            Expr::Not(child) => write!(f, "~{}", child),
        }
    }
}
