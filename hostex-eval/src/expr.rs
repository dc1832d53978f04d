use std::collections::HashMap;

use hostex_core::Value;

use crate::error::ExpressionError;
use crate::functions::Function;
use crate::parser::{tokenize, Parser};

/// Variable bindings for one evaluation: decoded variable name → raw value.
pub type Bindings = HashMap<String, Value>;

/// Binary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
        }
    }
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Number(f64),
    Variable(String),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

impl Node {
    pub(crate) fn add(lhs: Node, rhs: Node) -> Node {
        Node::Binary(BinaryOp::Add, Box::new(lhs), Box::new(rhs))
    }

    pub(crate) fn sub(lhs: Node, rhs: Node) -> Node {
        Node::Binary(BinaryOp::Sub, Box::new(lhs), Box::new(rhs))
    }

    pub(crate) fn mul(lhs: Node, rhs: Node) -> Node {
        Node::Binary(BinaryOp::Mul, Box::new(lhs), Box::new(rhs))
    }

    pub(crate) fn div(lhs: Node, rhs: Node) -> Node {
        Node::Binary(BinaryOp::Div, Box::new(lhs), Box::new(rhs))
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Node::Number(_) => {}
            Node::Variable(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            Node::Neg(inner) => inner.collect_variables(out),
            Node::Binary(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Node::Call(_, args) => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }

    fn evaluate(&self, bindings: &Bindings) -> Result<Value, ExpressionError> {
        match self {
            Node::Number(value) => Ok(Value::Scalar(*value)),
            Node::Variable(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownVariable(name.clone())),
            Node::Neg(inner) => {
                let value = inner
                    .evaluate(bindings)?
                    .as_scalar()
                    .ok_or(ExpressionError::TypeMismatch("unary '-'"))?;
                Ok(Value::Scalar(-value))
            }
            Node::Binary(op, lhs, rhs) => {
                let lhs = lhs
                    .evaluate(bindings)?
                    .as_scalar()
                    .ok_or(ExpressionError::TypeMismatch(op.symbol()))?;
                let rhs = rhs
                    .evaluate(bindings)?
                    .as_scalar()
                    .ok_or(ExpressionError::TypeMismatch(op.symbol()))?;
                Ok(Value::Scalar(op.apply(lhs, rhs)))
            }
            Node::Call(function, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Scalar(function.apply(&args)))
            }
        }
    }
}

/// A compiled, reusable expression.
///
/// Built once at configuration load and evaluated once per scrape per
/// metric; never mutated after compile, so it is shared freely across
/// concurrent scrapes.
#[derive(Clone, Debug)]
pub struct Expression {
    source: String,
    root: Node,
    variables: Vec<String>,
}

impl Expression {
    /// Compiles an expression string against the built-in function table.
    pub fn compile(source: &str) -> Result<Expression, ExpressionError> {
        let tokens = tokenize(source)?;
        let root = Parser::new(tokens).parse()?;

        let mut variables = Vec::new();
        root.collect_variables(&mut variables);

        Ok(Expression { source: source.to_string(), root, variables })
    }

    /// The free variables this expression references, in first-appearance
    /// order. Cached at compile time so each scrape only does lookups.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The original expression string.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against the given bindings, producing a single number.
    ///
    /// Fails when a referenced variable is unbound or an arithmetic operator
    /// is handed a per-instance sequence.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<f64, ExpressionError> {
        match self.root.evaluate(bindings)? {
            Value::Scalar(v) => Ok(v),
            Value::Sequence(_) => Err(ExpressionError::TypeMismatch("expression result")),
        }
    }
}

#[cfg(test)]
mod tests {
    use hostex_core::Value;

    use super::{Bindings, Expression};
    use crate::error::ExpressionError;

    fn bind(pairs: &[(&str, Value)]) -> Bindings {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn arithmetic_with_precedence() {
        let expr = Expression::compile("1 + 2 * 3 - 4 / 2").unwrap();
        assert_eq!(expr.evaluate(&Bindings::new()).unwrap(), 5.0);

        let expr = Expression::compile("(1 + 2) * 3").unwrap();
        assert_eq!(expr.evaluate(&Bindings::new()).unwrap(), 9.0);

        let expr = Expression::compile("-(2 + 3)").unwrap();
        assert_eq!(expr.evaluate(&Bindings::new()).unwrap(), -5.0);
    }

    #[test]
    fn variables_are_cached_in_first_appearance_order() {
        let expr = Expression::compile("a.core@0 + b * a.core@0").unwrap();
        assert_eq!(expr.variables(), &["a.core@0".to_string(), "b".to_string()]);
    }

    #[test]
    fn aggregates_over_sequence_bindings() {
        let expr = Expression::compile("sum(busy.core@) / count(busy.core@)").unwrap();
        let bindings = bind(&[("busy.core@", vec![10.0, 20.0, 30.0].into())]);
        assert_eq!(expr.evaluate(&bindings).unwrap(), 20.0);

        let expr = Expression::compile("100 - average(idle.core@)").unwrap();
        let bindings = bind(&[("idle.core@", vec![80.0, 60.0].into())]);
        assert_eq!(expr.evaluate(&bindings).unwrap(), 30.0);
    }

    #[test]
    fn mixed_scalar_and_sequence_arguments() {
        let expr = Expression::compile("sum(1, 2, rest)").unwrap();
        let bindings = bind(&[("rest", vec![3.0, 4.0].into())]);
        assert_eq!(expr.evaluate(&bindings).unwrap(), 10.0);

        let expr = Expression::compile("count(1, rest)").unwrap();
        assert_eq!(expr.evaluate(&bindings).unwrap(), 3.0);
    }

    #[test]
    fn unknown_variable_fails_evaluation() {
        let expr = Expression::compile("missing + 1").unwrap();
        assert_eq!(
            expr.evaluate(&Bindings::new()),
            Err(ExpressionError::UnknownVariable("missing".to_string()))
        );
    }

    #[test]
    fn sequence_in_arithmetic_is_a_type_mismatch() {
        let expr = Expression::compile("cores + 1").unwrap();
        let bindings = bind(&[("cores", vec![1.0, 2.0].into())]);
        assert_eq!(expr.evaluate(&bindings), Err(ExpressionError::TypeMismatch("+")));
    }

    #[test]
    fn compile_errors_are_reported_up_front() {
        assert!(matches!(
            Expression::compile("median(x)"),
            Err(ExpressionError::UnknownFunction(name)) if name == "median"
        ));
        assert!(matches!(
            Expression::compile("1 +"),
            Err(ExpressionError::UnexpectedEnd)
        ));
        assert!(matches!(
            Expression::compile("(1 + 2"),
            Err(ExpressionError::UnexpectedEnd)
        ));
        assert!(matches!(
            Expression::compile("1 2"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn empty_call_argument_lists() {
        let expr = Expression::compile("sum() + count()").unwrap();
        assert_eq!(expr.evaluate(&Bindings::new()).unwrap(), 0.0);
    }
}
