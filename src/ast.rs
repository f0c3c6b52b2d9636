use std::{fmt, mem};

use serde_json::Value;

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Literal(f64),
    Variable(String),
    Binary {
        op: char,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Call {
        callee: String,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn binary(op: char, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn variable(name: &str) -> Self {
        Expression::Variable(name.to_string())
    }

    pub fn call(callee: &str, args: Vec<Expression>) -> Self {
        Expression::Call {
            callee: callee.to_string(),
            args,
        }
    }

    /// Split a left-leaning chain of binary expressions into its leftmost
    /// operand and the `(op, rhs)` pairs applied to it, in source order.
    ///
    /// Equal-precedence operators fold to the left, so `1+1+...+1` is as
    /// deep as it is long. Consumers walk the chain with this instead of
    /// recursing down `lhs`.
    pub fn operator_chain(&self) -> (&Expression, Vec<(char, &Expression)>) {
        let mut chain = Vec::new();
        let mut leftmost = self;
        while let Expression::Binary { op, lhs, rhs } = leftmost {
            chain.push((*op, &**rhs));
            leftmost = &**lhs;
        }
        chain.reverse();
        (leftmost, chain)
    }

    fn has_children(&self) -> bool {
        matches!(self, Expression::Binary { .. } | Expression::Call { .. })
    }
}

// children are dropped from a work list, the derived drop would recurse once
// per node of a long operator chain
impl Drop for Expression {
    fn drop(&mut self) {
        if !self.has_children() {
            return;
        }
        let mut pending = Vec::new();
        detach_children(self, &mut pending);
        while let Some(mut expr) = pending.pop() {
            detach_children(&mut expr, &mut pending);
        }
    }
}

fn detach_children(expr: &mut Expression, pending: &mut Vec<Expression>) {
    let mut detach = |child: &mut Expression| {
        if child.has_children() {
            pending.push(mem::replace(child, Expression::Literal(0.0)));
        }
    };
    match expr {
        Expression::Binary { lhs, rhs, .. } => {
            detach(&mut **lhs);
            detach(&mut **rhs);
        }
        Expression::Call { args, .. } => args.iter_mut().for_each(detach),
        Expression::Literal(_) | Expression::Variable(_) => {}
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
}

impl Prototype {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// The nameless, parameterless prototype wrapping top-level expressions.
    pub fn anonymous() -> Self {
        Self {
            name: String::new(),
            args: Vec::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expression,
}

impl Function {
    pub fn anonymous(body: Expression) -> Self {
        Self {
            prototype: Prototype::anonymous(),
            body,
        }
    }
}

/// One top-level unit as produced by the parser.
#[derive(Debug, PartialEq, Clone)]
pub enum ASTNode {
    Extern(Prototype),
    Function(Function),
}

/// Structured description of a node as compact JSON text, for diagnostics
/// and tests only. Every node is an object whose `type` names its kind.
pub trait Describe {
    fn describe_into(&self, out: &mut String);

    fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out);
        out
    }
}

fn push_json(out: &mut String, value: impl Into<Value>) {
    out.push_str(&value.into().to_string());
}

impl Describe for Expression {
    fn describe_into(&self, out: &mut String) {
        match self {
            Expression::Literal(value) => {
                out.push_str(r#"{"type":"number","value":"#);
                push_json(out, *value);
                out.push('}');
            }
            Expression::Variable(name) => {
                out.push_str(r#"{"type":"variable","name":"#);
                push_json(out, name.as_str());
                out.push('}');
            }
            Expression::Binary { .. } => {
                let (leftmost, chain) = self.operator_chain();
                for (op, _) in chain.iter().rev() {
                    out.push_str(r#"{"type":"binary","op":"#);
                    push_json(out, op.to_string());
                    out.push_str(r#","lhs":"#);
                }
                leftmost.describe_into(out);
                for (_, rhs) in chain {
                    out.push_str(r#","rhs":"#);
                    rhs.describe_into(out);
                    out.push('}');
                }
            }
            Expression::Call { callee, args } => {
                out.push_str(r#"{"type":"call","callee":"#);
                push_json(out, callee.as_str());
                out.push_str(r#","args":["#);
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.describe_into(out);
                }
                out.push_str("]}");
            }
        }
    }
}

impl Describe for Prototype {
    fn describe_into(&self, out: &mut String) {
        out.push_str(r#"{"type":"prototype","name":"#);
        push_json(out, self.name.as_str());
        out.push_str(r#","args":"#);
        push_json(out, self.args.clone());
        out.push('}');
    }
}

impl Describe for Function {
    fn describe_into(&self, out: &mut String) {
        out.push_str(r#"{"type":"function","prototype":"#);
        self.prototype.describe_into(out);
        out.push_str(r#","body":"#);
        self.body.describe_into(out);
        out.push('}');
    }
}

impl Describe for ASTNode {
    fn describe_into(&self, out: &mut String) {
        match self {
            ASTNode::Extern(proto) => {
                out.push_str(r#"{"type":"extern","prototype":"#);
                proto.describe_into(out);
                out.push('}');
            }
            ASTNode::Function(function) => function.describe_into(out),
        }
    }
}

// fully parenthesized, so the grouping chosen by the parser is visible
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Binary { .. } => {
                let (leftmost, chain) = self.operator_chain();
                for _ in 0..chain.len() {
                    write!(f, "(")?;
                }
                write!(f, "{}", leftmost)?;
                for (op, rhs) in chain {
                    write!(f, " {} {})", op, rhs)?;
                }
                Ok(())
            }
            Expression::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(" "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prototype.is_anonymous() {
            write!(f, "{}", self.body)
        } else {
            write!(f, "def {} {}", self.prototype, self.body)
        }
    }
}

impl fmt::Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ASTNode::Extern(proto) => write!(f, "extern {}", proto),
            ASTNode::Function(function) => write!(f, "{}", function),
        }
    }
}
