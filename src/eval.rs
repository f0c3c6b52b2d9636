use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::ast::{ASTNode, Expression, Function, Prototype};

/// Deepest chain of nested calls before evaluation gives up. The language
/// has no branches, so any recursive definition would otherwise never end.
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("unknown variable referenced {0}")]
    UnknownVariable(String),
    #[error("unknown operator {0}")]
    UnknownOperator(char),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("invalid number of args in call {0} expected {1} found {2}")]
    InvalidCall(String, usize, usize),
    #[error("function {0} is already defined")]
    Redefinition(String),
    #[error("function {0} redeclared with {2} args, previously {1}")]
    IncompatibleRedeclaration(String, usize, usize),
    #[error("extern {0} has no definition")]
    Unresolved(String),
    #[error("call depth exceeded in call to {0}")]
    CallDepthExceeded(String),
}

#[derive(Debug, Clone, Copy)]
enum Native {
    Unary(fn(f64) -> f64),
    Binary(fn(f64, f64) -> f64),
}

impl Native {
    fn arity(self) -> usize {
        match self {
            Native::Unary(_) => 1,
            Native::Binary(_) => 2,
        }
    }

    fn call(self, args: &[f64]) -> f64 {
        match self {
            Native::Unary(f) => f(args[0]),
            Native::Binary(f) => f(args[0], args[1]),
        }
    }
}

lazy_static! {
    static ref NATIVES: HashMap<&'static str, Native> = {
        let mut natives = HashMap::new();
        natives.insert("sin", Native::Unary(f64::sin));
        natives.insert("cos", Native::Unary(f64::cos));
        natives.insert("tan", Native::Unary(f64::tan));
        natives.insert("sqrt", Native::Unary(f64::sqrt));
        natives.insert("exp", Native::Unary(f64::exp));
        natives.insert("log", Native::Unary(f64::ln));
        natives.insert("fabs", Native::Unary(f64::abs));
        natives.insert("floor", Native::Unary(f64::floor));
        natives.insert("ceil", Native::Unary(f64::ceil));
        natives.insert("pow", Native::Binary(f64::powf));
        natives
    };
}

#[derive(Debug, Clone)]
enum Callable {
    Native(Native),
    Declared(Prototype),
    Defined(Function),
}

impl Callable {
    fn arity(&self) -> usize {
        match self {
            Callable::Native(native) => native.arity(),
            Callable::Declared(proto) => proto.args.len(),
            Callable::Defined(function) => function.prototype.args.len(),
        }
    }
}

/// Tree-walking consumer of parsed units. Keeps the table of known
/// functions across units, the way a module accumulates definitions.
#[derive(Debug, Default)]
pub struct Evaluator {
    functions: HashMap<String, Callable>,
}

type Scope<'a> = HashMap<&'a str, f64>;

fn apply_binary(op: char, lhs: f64, rhs: f64) -> Result<f64, EvalError> {
    match op {
        '+' => Ok(lhs + rhs),
        '-' => Ok(lhs - rhs),
        '*' => Ok(lhs * rhs),
        '/' => Ok(lhs / rhs),
        '<' => Ok(if lhs < rhs { 1.0 } else { 0.0 }),
        _ => Err(EvalError::UnknownOperator(op)),
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.functions.get(name).map(Callable::arity)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        matches!(self.functions.get(name), Some(Callable::Defined(_)))
    }

    fn check_arity(&self, name: &str, arity: usize) -> Result<(), EvalError> {
        match self.arity(name) {
            Some(known) if known != arity => Err(EvalError::IncompatibleRedeclaration(
                name.to_string(),
                known,
                arity,
            )),
            _ => Ok(()),
        }
    }

    /// Register an extern. Re-declaring with the same arity is a no-op.
    pub fn declare(&mut self, proto: &Prototype) -> Result<(), EvalError> {
        self.check_arity(&proto.name, proto.args.len())?;
        if self.functions.contains_key(&proto.name) {
            return Ok(());
        }

        let callable = match NATIVES.get(proto.name.as_str()) {
            Some(native) if native.arity() != proto.args.len() => {
                return Err(EvalError::IncompatibleRedeclaration(
                    proto.name.clone(),
                    native.arity(),
                    proto.args.len(),
                ))
            }
            Some(&native) => Callable::Native(native),
            None => Callable::Declared(proto.clone()),
        };
        self.functions.insert(proto.name.clone(), callable);
        Ok(())
    }

    /// Register a named function after checking its body refers only to its
    /// parameters and to known functions.
    pub fn define(&mut self, function: Function) -> Result<(), EvalError> {
        let proto = &function.prototype;
        if self.is_defined(&proto.name) {
            return Err(EvalError::Redefinition(proto.name.clone()));
        }
        self.check_arity(&proto.name, proto.args.len())?;
        self.check(&function.body, proto)?;

        self.functions
            .insert(proto.name.clone(), Callable::Defined(function));
        Ok(())
    }

    fn check(&self, expr: &Expression, proto: &Prototype) -> Result<(), EvalError> {
        match expr {
            Expression::Literal(_) => Ok(()),
            Expression::Variable(name) => {
                if proto.args.contains(name) {
                    Ok(())
                } else {
                    Err(EvalError::UnknownVariable(name.clone()))
                }
            }
            Expression::Binary { .. } => {
                let (leftmost, chain) = expr.operator_chain();
                self.check(leftmost, proto)?;
                for (op, rhs) in chain {
                    if !matches!(op, '+' | '-' | '*' | '/' | '<') {
                        return Err(EvalError::UnknownOperator(op));
                    }
                    self.check(rhs, proto)?;
                }
                Ok(())
            }
            Expression::Call { callee, args } => {
                let arity = if *callee == proto.name && !proto.is_anonymous() {
                    proto.args.len()
                } else {
                    self.arity(callee)
                        .ok_or_else(|| EvalError::UnknownFunction(callee.clone()))?
                };
                if arity != args.len() {
                    return Err(EvalError::InvalidCall(callee.clone(), arity, args.len()));
                }
                for arg in args {
                    self.check(arg, proto)?;
                }
                Ok(())
            }
        }
    }

    fn eval_expr(&self, expr: &Expression, scope: &Scope, depth: usize) -> Result<f64, EvalError> {
        match expr {
            Expression::Literal(value) => Ok(*value),
            Expression::Variable(name) => match scope.get(name.as_str()) {
                Some(value) => Ok(*value),
                None => Err(EvalError::UnknownVariable(name.clone())),
            },
            Expression::Binary { .. } => {
                let (leftmost, chain) = expr.operator_chain();
                let mut lhs = self.eval_expr(leftmost, scope, depth)?;
                for (op, rhs) in chain {
                    let rhs = self.eval_expr(rhs, scope, depth)?;
                    lhs = apply_binary(op, lhs, rhs)?;
                }
                Ok(lhs)
            }
            Expression::Call { callee, args } => {
                let func = self
                    .functions
                    .get(callee)
                    .ok_or_else(|| EvalError::UnknownFunction(callee.clone()))?;

                if func.arity() != args.len() {
                    return Err(EvalError::InvalidCall(
                        callee.clone(),
                        func.arity(),
                        args.len(),
                    ));
                }

                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, scope, depth)?);
                }

                match func {
                    Callable::Native(native) => Ok(native.call(&values)),
                    Callable::Declared(_) => Err(EvalError::Unresolved(callee.clone())),
                    Callable::Defined(function) => {
                        if depth >= MAX_CALL_DEPTH {
                            return Err(EvalError::CallDepthExceeded(callee.clone()));
                        }
                        let frame: Scope = function
                            .prototype
                            .args
                            .iter()
                            .map(String::as_str)
                            .zip(values)
                            .collect();
                        self.eval_expr(&function.body, &frame, depth + 1)
                    }
                }
            }
        }
    }

    /// Evaluate a closed expression, one with no free variables.
    pub fn evaluate(&self, expr: &Expression) -> Result<f64, EvalError> {
        self.eval_expr(expr, &Scope::new(), 0)
    }

    /// Feed one unit through. Anonymous functions are run on the spot and
    /// produce their value; definitions and externs are only registered.
    pub fn run(&mut self, node: ASTNode) -> Result<Option<f64>, EvalError> {
        match node {
            ASTNode::Extern(proto) => self.declare(&proto).map(|_| None),
            ASTNode::Function(function) if function.prototype.is_anonymous() => {
                self.check(&function.body, &function.prototype)?;
                self.evaluate(&function.body).map(Some)
            }
            ASTNode::Function(function) => self.define(function).map(|_| None),
        }
    }

    /// Run every unit in order, collecting the values of top-level expressions.
    pub fn run_all(&mut self, ast_nodes: Vec<ASTNode>) -> Result<Vec<f64>, EvalError> {
        let mut values = Vec::new();
        for node in ast_nodes {
            if let Some(value) = self.run(node)? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use pretty_assertions::assert_eq;

    fn run_source(source: &str) -> Result<Vec<f64>, EvalError> {
        let ast = parse_str(source).unwrap();
        Evaluator::new().run_all(ast)
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run_source("1+2*3; (1+2)*3; 8/4/2; 10-4-3").unwrap(), vec![7.0, 9.0, 1.0, 3.0]);
    }

    #[test]
    fn comparison_yields_one_or_zero() {
        assert_eq!(run_source("1 < 2; 2 < 1; 1 < 1").unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn functions_and_calls() {
        let values = run_source("def add(x y) x+y; def twice(v) add(v, v); twice(add(1, 2))").unwrap();
        assert_eq!(values, vec![6.0]);
    }

    #[test]
    fn externs_bind_natives() {
        let values = run_source("extern sqrt(x); extern pow(b e); sqrt(16) + pow(2, 3)").unwrap();
        assert_eq!(values, vec![12.0]);
    }

    #[test]
    fn extern_without_native_is_unresolved() {
        assert_eq!(
            run_source("extern mystery(a); mystery(1)"),
            Err(EvalError::Unresolved("mystery".to_string()))
        );
    }

    #[test]
    fn extern_then_define() {
        assert_eq!(run_source("extern sq(x); def sq(x) x*x; sq(5)").unwrap(), vec![25.0]);
    }

    #[test]
    fn undeclared_calls_are_rejected() {
        assert_eq!(
            run_source("sin(1)"),
            Err(EvalError::UnknownFunction("sin".to_string()))
        );
        assert_eq!(
            run_source("def f(x) g(x)"),
            Err(EvalError::UnknownFunction("g".to_string()))
        );
    }

    #[test]
    fn unknown_variables() {
        assert_eq!(
            run_source("def f(x) x + y"),
            Err(EvalError::UnknownVariable("y".to_string()))
        );
        assert_eq!(run_source("a"), Err(EvalError::UnknownVariable("a".to_string())));
    }

    #[test]
    fn arity_is_checked() {
        assert_eq!(
            run_source("def f(a b) a; f(1)"),
            Err(EvalError::InvalidCall("f".to_string(), 2, 1))
        );
        assert_eq!(
            run_source("extern cos(a b)"),
            Err(EvalError::IncompatibleRedeclaration("cos".to_string(), 1, 2))
        );
        assert_eq!(
            run_source("extern h(a); def h(a b) a"),
            Err(EvalError::IncompatibleRedeclaration("h".to_string(), 1, 2))
        );
    }

    #[test]
    fn redefinition_rejected() {
        let mut evaluator = Evaluator::new();
        evaluator.run_all(parse_str("def f(x) x").unwrap()).unwrap();
        assert_eq!(
            evaluator.run_all(parse_str("def f(x) x*2").unwrap()),
            Err(EvalError::Redefinition("f".to_string()))
        );
        assert_eq!(evaluator.run_all(parse_str("extern f(y); f(3)").unwrap()), Ok(vec![3.0]));
        assert_eq!(evaluator.arity("f"), Some(1));
        assert!(evaluator.is_defined("f"));
    }

    #[test]
    fn failed_definition_is_not_registered() {
        let mut evaluator = Evaluator::new();
        assert!(evaluator.run_all(parse_str("def f(x) nope").unwrap()).is_err());
        assert_eq!(evaluator.arity("f"), None);
    }

    #[test]
    fn recursion_is_bounded() {
        assert_eq!(
            run_source("def loop(x) loop(x+1); loop(0)"),
            Err(EvalError::CallDepthExceeded("loop".to_string()))
        );
    }

    #[test]
    fn long_flat_chains() {
        let terms = 100_000;
        let sum = format!("1{}", "+1".repeat(terms - 1));
        assert_eq!(run_source(&sum).unwrap(), vec![terms as f64]);

        let difference = format!("def down(x) x{}; down(0)", "-1".repeat(terms));
        assert_eq!(run_source(&difference).unwrap(), vec![-(terms as f64)]);

        let mixed = format!("1{}", "+2*3".repeat(terms));
        assert_eq!(run_source(&mixed).unwrap(), vec![1.0 + 6.0 * terms as f64]);
    }

    #[test]
    fn unknown_operator_in_tree() {
        let evaluator = Evaluator::new();
        let expr = Expression::binary('%', Expression::Literal(1.0), Expression::Literal(2.0));
        assert_eq!(evaluator.evaluate(&expr), Err(EvalError::UnknownOperator('%')));
    }
}
