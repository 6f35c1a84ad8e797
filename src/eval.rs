use std::fmt::Display;

use miette::{Diagnostic, Error};
use thiserror::Error;

use crate::{
    token::TokenKind,
    value::{Parameters, TypeFlag, Value},
};

#[derive(Error, Debug, Diagnostic)]
#[error("{}", self.message())]
#[diagnostic(help("check the operand types of `{symbol}`"))]
pub struct TypeMismatchError {
    pub symbol: Symbol,
    pub left: Option<TypeFlag>,
    pub right: TypeFlag,
}

impl TypeMismatchError {
    fn message(&self) -> String {
        match self.left {
            Some(left) => format!(
                "type mismatch for operator [{}]: left='{left}', right='{}'",
                self.symbol, self.right
            ),
            None => format!(
                "type mismatch for operator [{}]: right='{}'",
                self.symbol, self.right
            ),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("no parameter '{name}' found")]
#[diagnostic(help("bind `{name}` before evaluating the expression"))]
pub struct MissingParameterError {
    pub name: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("unsupported type")]
#[diagnostic(help("parameter `{name}` must be a boolean, number or string"))]
pub struct UnsupportedTypeError {
    pub name: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("number divide by zero")]
pub struct DivideByZeroError;

/// The role of a node in the expression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Value,
    Literal,
    Noop,
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulus,
    Invert,
    Positive,
    Negative,
}

type TypeChecker = fn(left: TypeFlag, right: TypeFlag) -> bool;

// + > < >= <=
fn number_or_string(left: TypeFlag, right: TypeFlag) -> bool {
    (left.is_string() && right.is_string()) || (left.is_number() && right.is_number())
}

// - * / %
fn double_number(left: TypeFlag, right: TypeFlag) -> bool {
    left.is_number() && right.is_number()
}

// == !=
fn comparable(left: TypeFlag, right: TypeFlag) -> bool {
    number_or_string(left, right) || double_bool(left, right)
}

fn double_bool(left: TypeFlag, right: TypeFlag) -> bool {
    left.is_bool() && right.is_bool()
}

fn single_bool(_: TypeFlag, right: TypeFlag) -> bool {
    right.is_bool()
}

fn single_number(_: TypeFlag, right: TypeFlag) -> bool {
    right.is_number()
}

impl Symbol {
    /// Operand precondition for this symbol; leaves and `Noop` have none.
    fn type_checker(self) -> Option<TypeChecker> {
        match self {
            Symbol::Value | Symbol::Literal | Symbol::Noop => None,
            Symbol::Eq | Symbol::Neq => Some(comparable),
            Symbol::Gt | Symbol::Lt | Symbol::Gte | Symbol::Lte | Symbol::Plus => {
                Some(number_or_string)
            }
            Symbol::And | Symbol::Or => Some(double_bool),
            Symbol::Minus | Symbol::Multiply | Symbol::Divide | Symbol::Modulus => {
                Some(double_number)
            }
            Symbol::Invert => Some(single_bool),
            Symbol::Positive | Symbol::Negative => Some(single_number),
        }
    }

    fn is_unary(self) -> bool {
        matches!(self, Symbol::Invert | Symbol::Positive | Symbol::Negative)
    }

    pub(crate) fn multiplicative(kind: TokenKind) -> Option<Symbol> {
        match kind {
            TokenKind::Multiply => Some(Symbol::Multiply),
            TokenKind::Divide => Some(Symbol::Divide),
            TokenKind::Modulus => Some(Symbol::Modulus),
            _ => None,
        }
    }

    pub(crate) fn additive(kind: TokenKind) -> Option<Symbol> {
        match kind {
            TokenKind::Addition => Some(Symbol::Plus),
            TokenKind::Subtraction => Some(Symbol::Minus),
            _ => None,
        }
    }

    pub(crate) fn comparator(kind: TokenKind) -> Option<Symbol> {
        match kind {
            TokenKind::GreaterThan => Some(Symbol::Gt),
            TokenKind::GreaterEqual => Some(Symbol::Gte),
            TokenKind::LessThan => Some(Symbol::Lt),
            TokenKind::LessEqual => Some(Symbol::Lte),
            TokenKind::Equal => Some(Symbol::Eq),
            TokenKind::NotEqual => Some(Symbol::Neq),
            _ => None,
        }
    }

    pub(crate) fn logical_not(kind: TokenKind) -> Option<Symbol> {
        (kind == TokenKind::Not).then_some(Symbol::Invert)
    }

    pub(crate) fn logical_and(kind: TokenKind) -> Option<Symbol> {
        (kind == TokenKind::And).then_some(Symbol::And)
    }

    pub(crate) fn logical_or(kind: TokenKind) -> Option<Symbol> {
        (kind == TokenKind::Or).then_some(Symbol::Or)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Symbol::Value => "VALUE",
            Symbol::Literal => "LITERAL",
            Symbol::Noop => "NOOP",
            Symbol::Eq => "==",
            Symbol::Neq => "!=",
            Symbol::Gt => ">",
            Symbol::Lt => "<",
            Symbol::Gte => ">=",
            Symbol::Lte => "<=",
            Symbol::And => "&&",
            Symbol::Or => "||",
            Symbol::Plus | Symbol::Positive => "+",
            Symbol::Minus | Symbol::Negative => "-",
            Symbol::Multiply => "*",
            Symbol::Divide => "/",
            Symbol::Modulus => "%",
            Symbol::Invert => "!",
        };
        f.write_str(s)
    }
}

/// A node of a compiled expression.
///
/// Leaves (`Literal`, `Value`) have no children, unary nodes only a right
/// child, binary nodes both. Each evaluation overwrites the value and type of
/// every node, bottom-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    symbol: Symbol,
    name: Option<String>,
    value: Option<Value>,
    flag: TypeFlag,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    pub fn new(left: Option<Node>, right: Option<Node>, symbol: Symbol) -> Self {
        Node {
            symbol,
            name: None,
            value: None,
            flag: TypeFlag::Null,
            left: left.map(Box::new),
            right: right.map(Box::new),
        }
    }

    pub fn literal(value: Value) -> Self {
        Node {
            symbol: Symbol::Literal,
            name: None,
            flag: value.type_flag(),
            value: Some(value),
            left: None,
            right: None,
        }
    }

    /// A reference to the variable `name`, resolved on every evaluation.
    pub fn variable(name: impl Into<String>) -> Self {
        Node {
            symbol: Symbol::Value,
            name: Some(name.into()),
            value: None,
            flag: TypeFlag::Null,
            left: None,
            right: None,
        }
    }

    /// Builds a unary `+`/`-` node over an operand planned at multiplicative
    /// precedence.
    ///
    /// When the operand is a binary node (other than another sign), the sign
    /// belongs to its left operand only: `-a * b` is `(-a) * b`. The operand
    /// node is then rewritten in place and returned as the new root.
    ///
    /// # Panics
    ///
    /// If `symbol` is not `Positive` or `Negative`.
    pub fn with_prefix_fix(right: Option<Node>, symbol: Symbol) -> Self {
        assert!(
            matches!(symbol, Symbol::Positive | Symbol::Negative),
            "prefix fix used for non-sign symbol {symbol:?}"
        );

        match right {
            Some(mut right)
                if right.left.is_some()
                    && right.right.is_some()
                    && !matches!(right.symbol, Symbol::Positive | Symbol::Negative) =>
            {
                let operand = right.left.take().map(|node| *node);
                right.left = Some(Box::new(Node::new(None, operand, symbol)));
                right
            }
            right => Node::new(None, right, symbol),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn left(&self) -> Option<&Node> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&Node> {
        self.right.as_deref()
    }

    /// The result of the last evaluation (or the literal itself).
    pub fn value(&self) -> (Option<&Value>, TypeFlag) {
        (self.value.as_ref(), self.flag)
    }

    /// Evaluates the tree post-order against `params`.
    pub fn eval(&mut self, params: &dyn Parameters) -> Result<(), Error> {
        if let Some(left) = self.left.as_deref_mut() {
            left.eval(params)?;
        }
        if let Some(right) = self.right.as_deref_mut() {
            right.eval(params)?;
        }

        if let Some(check) = self.symbol.type_checker() {
            let left = self.left.as_ref().map_or(TypeFlag::Null, |n| n.flag);
            let right = self.right.as_ref().map_or(TypeFlag::Null, |n| n.flag);
            if !check(left, right) {
                return Err(self.type_mismatch().into());
            }
        }

        let (value, flag) = self.operate(params)?;
        tracing::trace!(symbol = %self.symbol, %flag, "evaluated node");
        self.value = value;
        self.flag = flag;
        Ok(())
    }

    fn type_mismatch(&self) -> TypeMismatchError {
        let flag = |child: &Option<Box<Node>>| child.as_ref().map_or(TypeFlag::Null, |n| n.flag);
        TypeMismatchError {
            symbol: self.symbol,
            left: (!self.symbol.is_unary()).then(|| flag(&self.left)),
            right: flag(&self.right),
        }
    }

    /// The evaluated value of a child, or a type error naming this operator
    /// when the child is absent or produced nothing.
    fn operand<'a>(&self, child: Option<&'a Node>) -> Result<&'a Value, Error> {
        child
            .and_then(|n| n.value.as_ref())
            .ok_or_else(|| self.type_mismatch().into())
    }

    fn operate(&self, params: &dyn Parameters) -> Result<(Option<Value>, TypeFlag), Error> {
        let left = self.left.as_deref();
        let right = self.right.as_deref();
        Ok(match self.symbol {
            Symbol::Value => {
                let name = self.name.as_deref().unwrap_or_default();
                let param = params.get(name).ok_or_else(|| MissingParameterError {
                    name: name.to_string(),
                })?;
                let value = param.normalize().ok_or_else(|| UnsupportedTypeError {
                    name: name.to_string(),
                })?;
                let flag = value.type_flag();
                (Some(value), flag)
            }
            Symbol::Literal => (self.value.clone(), self.flag),
            Symbol::Noop | Symbol::Positive => {
                right.map_or((None, TypeFlag::Null), |n| (n.value.clone(), n.flag))
            }
            Symbol::Negative => match self.operand(right)? {
                Value::Float(n) => (Some(Value::Float(-n)), TypeFlag::Float),
                Value::Integer(n) => (Some(Value::Integer(n.wrapping_neg())), TypeFlag::Integer),
                other => return Err(mismatch(self.symbol, None, other)),
            },
            Symbol::Invert => match self.operand(right)? {
                Value::Bool(b) => (Some(Value::Bool(!b)), TypeFlag::Bool),
                other => return Err(mismatch(self.symbol, None, other)),
            },
            Symbol::And | Symbol::Or => match (self.operand(left)?, self.operand(right)?) {
                (Value::Bool(l), Value::Bool(r)) => {
                    let b = if self.symbol == Symbol::And { *l && *r } else { *l || *r };
                    (Some(Value::Bool(b)), TypeFlag::Bool)
                }
                (l, r) => return Err(mismatch(self.symbol, Some(l), r)),
            },
            Symbol::Plus => match (self.operand(left)?, self.operand(right)?) {
                (Value::Text(l), Value::Text(r)) => {
                    (Some(Value::Text(format!("{l}{r}"))), TypeFlag::String)
                }
                (l, r) => numeric(self.symbol, l, r)?,
            },
            Symbol::Minus | Symbol::Multiply | Symbol::Divide | Symbol::Modulus => {
                numeric(self.symbol, self.operand(left)?, self.operand(right)?)?
            }
            Symbol::Gt | Symbol::Lt | Symbol::Gte | Symbol::Lte | Symbol::Eq | Symbol::Neq => {
                compare(self.symbol, self.operand(left)?, self.operand(right)?)?
            }
        })
    }
}

fn mismatch(symbol: Symbol, left: Option<&Value>, right: &Value) -> Error {
    TypeMismatchError {
        symbol,
        left: left.map(Value::type_flag),
        right: right.type_flag(),
    }
    .into()
}

/// Applies an arithmetic or ordering operator to two numbers.
///
/// Both operands stay integers only when both values are integers; otherwise
/// both widen to `f64`. `/` on integers that do not divide evenly widens
/// too. `%` on floats keeps reporting `Integer` as its type.
fn numeric(symbol: Symbol, l: &Value, r: &Value) -> Result<(Option<Value>, TypeFlag), Error> {
    if let (Value::Integer(a), Value::Integer(b)) = (l, r) {
        let (a, b) = (*a, *b);
        let int = |n| Ok((Some(Value::Integer(n)), TypeFlag::Integer));
        let boolean = |b| Ok((Some(Value::Bool(b)), TypeFlag::Bool));
        match symbol {
            Symbol::Plus => return int(a.wrapping_add(b)),
            Symbol::Minus => return int(a.wrapping_sub(b)),
            Symbol::Multiply => return int(a.wrapping_mul(b)),
            Symbol::Divide => {
                if b == 0 {
                    return Err(DivideByZeroError.into());
                }
                if a.wrapping_rem(b) == 0 {
                    return int(a.wrapping_div(b));
                }
            }
            Symbol::Modulus => {
                if b == 0 {
                    return Err(DivideByZeroError.into());
                }
                return int(a.wrapping_rem(b));
            }
            Symbol::Gt => return boolean(a > b),
            Symbol::Lt => return boolean(a < b),
            Symbol::Gte => return boolean(a >= b),
            Symbol::Lte => return boolean(a <= b),
            Symbol::Eq => return boolean(a == b),
            Symbol::Neq => return boolean(a != b),
            _ => {}
        }
    }

    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(mismatch(symbol, Some(l), r));
    };
    let float = |n| Ok((Some(Value::Float(n)), TypeFlag::Float));
    let boolean = |b| Ok((Some(Value::Bool(b)), TypeFlag::Bool));
    match symbol {
        Symbol::Plus => float(a + b),
        Symbol::Minus => float(a - b),
        Symbol::Multiply => float(a * b),
        Symbol::Divide => {
            if b == 0.0 {
                return Err(DivideByZeroError.into());
            }
            float(a / b)
        }
        Symbol::Modulus => Ok((Some(Value::Float(a % b)), TypeFlag::Integer)),
        Symbol::Gt => boolean(a > b),
        Symbol::Lt => boolean(a < b),
        Symbol::Gte => boolean(a >= b),
        Symbol::Lte => boolean(a <= b),
        Symbol::Eq => boolean(a == b),
        Symbol::Neq => boolean(a != b),
        _ => Err(mismatch(symbol, Some(l), r)),
    }
}

fn compare(symbol: Symbol, l: &Value, r: &Value) -> Result<(Option<Value>, TypeFlag), Error> {
    let result = match (symbol, l, r) {
        (_, Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            return numeric(symbol, l, r);
        }
        (Symbol::Gt, Value::Text(a), Value::Text(b)) => a > b,
        (Symbol::Lt, Value::Text(a), Value::Text(b)) => a < b,
        (Symbol::Gte, Value::Text(a), Value::Text(b)) => a >= b,
        (Symbol::Lte, Value::Text(a), Value::Text(b)) => a <= b,
        (Symbol::Eq, Value::Text(a), Value::Text(b)) => a == b,
        (Symbol::Neq, Value::Text(a), Value::Text(b)) => a != b,
        (Symbol::Eq, Value::Bool(a), Value::Bool(b)) => a == b,
        (Symbol::Neq, Value::Bool(a), Value::Bool(b)) => a != b,
        _ => return Err(mismatch(symbol, Some(l), r)),
    };
    Ok((Some(Value::Bool(result)), TypeFlag::Bool))
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.symbol {
            Symbol::Value => write!(f, "{}", self.name.as_deref().unwrap_or_default()),
            Symbol::Literal => match &self.value {
                Some(Value::Text(s)) => write!(f, "{s:?}"),
                Some(Value::Float(n)) if n.is_finite() && *n == n.trunc() => write!(f, "{n}.0"),
                Some(value) => write!(f, "{value}"),
                None => write!(f, "nil"),
            },
            symbol => {
                match symbol {
                    Symbol::Noop => write!(f, "(group")?,
                    symbol => write!(f, "({symbol}")?,
                }
                for child in [&self.left, &self.right].into_iter().flatten() {
                    write!(f, " {child}")?;
                }
                write!(f, ")")
            }
        }
    }
}
