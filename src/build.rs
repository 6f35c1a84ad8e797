use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::{
    eval::{Node, Symbol},
    parse::Parser,
    token::{TokenKind, TokenValue},
    value::Value,
};

#[derive(Error, Debug, Diagnostic)]
#[error("expected `)` to close the group, found {found}")]
#[diagnostic(help("close the parenthesis opened here"))]
pub struct MissingParenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("group ends here")]
    bad_bit: SourceSpan,

    pub found: TokenKind,
}

#[derive(Error, Debug, Diagnostic)]
#[error("unable to plan token kind: '{kind}', value: '{value}'")]
#[diagnostic(help("a value, variable, group or unary operator is expected here"))]
pub struct UnplannableTokenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("not a value")]
    bad_bit: SourceSpan,

    pub kind: TokenKind,
    pub value: TokenValue,
}

#[derive(Error, Debug, Diagnostic)]
#[error("expression is empty")]
pub struct EmptyExpressionError;

/// One tier of the operator grammar, lowest binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    LogicalOr,
    LogicalAnd,
    LogicalNot,
    Comparator,
    Additive,
    Multiplicative,
}

impl Precedence {
    pub const LOWEST: Precedence = Precedence::LogicalOr;

    /// The tier that binds one step tighter, if any.
    pub fn next(self) -> Option<Precedence> {
        match self {
            Precedence::LogicalOr => Some(Precedence::LogicalAnd),
            Precedence::LogicalAnd => Some(Precedence::LogicalNot),
            Precedence::LogicalNot => Some(Precedence::Comparator),
            Precedence::Comparator => Some(Precedence::Additive),
            Precedence::Additive => Some(Precedence::Multiplicative),
            Precedence::Multiplicative => None,
        }
    }

    /// The operator a token kind stands for at this tier.
    pub fn symbol_for(self, kind: TokenKind) -> Option<Symbol> {
        match self {
            Precedence::LogicalOr => Symbol::logical_or(kind),
            Precedence::LogicalAnd => Symbol::logical_and(kind),
            Precedence::LogicalNot => Symbol::logical_not(kind),
            Precedence::Comparator => Symbol::comparator(kind),
            Precedence::Additive => Symbol::additive(kind),
            Precedence::Multiplicative => Symbol::multiplicative(kind),
        }
    }
}

/// Turns a grammar-checked token sequence into an expression tree.
///
/// Each tier takes its left operand from the next tighter tier, then applies
/// at most one of its own operators, taking the right operand from itself.
/// Runs of same-tier operators therefore nest to the right: `10 - 3 - 2` is
/// `10 - (3 - 2)`. Recursion depth grows with nesting depth of the input.
pub struct Builder<'p, 'de> {
    parser: &'p mut Parser<'de>,
}

impl<'p, 'de> Builder<'p, 'de> {
    pub fn new(parser: &'p mut Parser<'de>) -> Self {
        Builder { parser }
    }

    /// Plans a whole expression starting at the current token.
    ///
    /// Returns `None` when there is nothing to plan.
    pub fn build(&mut self) -> Result<Option<Node>, Error> {
        self.plan(Precedence::LOWEST)
    }

    /// Plans the whole sequence. A token left over before `Eof` (a `)` closing
    /// nothing the planner opened) is an error rather than silently dropped.
    pub fn build_all(&mut self) -> Result<Option<Node>, Error> {
        let root = self.build()?;
        let trailing = self
            .parser
            .next()
            .filter(|t| t.kind != TokenKind::Eof)
            .cloned();
        if let Some(token) = trailing {
            return Err(UnplannableTokenError {
                src: self.parser.src(),
                bad_bit: token.span,
                kind: token.kind,
                value: token.value,
            }
            .into());
        }
        Ok(root)
    }

    fn plan(&mut self, level: Precedence) -> Result<Option<Node>, Error> {
        let left = match level.next() {
            Some(higher) => self.plan(higher)?,
            None => self.plan_value(level)?,
        };

        let Some(kind) = self.parser.next().map(|t| t.kind) else {
            return Ok(left);
        };
        let symbol = match level.symbol_for(kind) {
            Some(symbol) if kind != TokenKind::Eof => symbol,
            _ => {
                self.parser.rewind();
                return Ok(left);
            }
        };

        let right = self.plan(level)?;
        Ok(Some(Node::new(left, right, symbol)))
    }

    fn plan_value(&mut self, level: Precedence) -> Result<Option<Node>, Error> {
        let Some(token) = self.parser.next().cloned() else {
            return Ok(None);
        };

        let literal = |value| Ok(Some(Node::literal(value)));
        match (token.kind, token.value) {
            (TokenKind::OpenParen, _) => {
                let inner = self.build()?;
                match self.parser.next() {
                    Some(t) if t.kind == TokenKind::CloseParen => {}
                    found => {
                        let (found, bad_bit) = match found {
                            Some(t) => (t.kind, t.span),
                            None => {
                                let end = self.parser.whole.len();
                                (TokenKind::Eof, SourceSpan::from(end..end))
                            }
                        };
                        return Err(MissingParenError {
                            src: self.parser.src(),
                            bad_bit,
                            found,
                        }
                        .into());
                    }
                }
                Ok(Some(Node::new(None, inner, Symbol::Noop)))
            }
            (TokenKind::Identifier, TokenValue::Str(name)) => Ok(Some(Node::variable(name))),
            (TokenKind::BoolLiteral, TokenValue::Bool(b)) => literal(Value::Bool(b)),
            (TokenKind::IntegerLiteral, TokenValue::Int(n)) => literal(Value::Integer(n)),
            (TokenKind::FloatLiteral, TokenValue::Float(n)) => literal(Value::Float(n)),
            (TokenKind::StringLiteral, TokenValue::Str(s)) => literal(Value::Text(s)),
            (TokenKind::Subtraction, _) => {
                let operand = self.plan(level)?;
                Ok(Some(Node::with_prefix_fix(operand, Symbol::Negative)))
            }
            (TokenKind::Addition, _) => {
                let operand = self.plan(level)?;
                Ok(Some(Node::with_prefix_fix(operand, Symbol::Positive)))
            }
            // `!` belongs to the logical-not tier; hand it back.
            (TokenKind::Not, _) => {
                self.parser.rewind();
                Ok(None)
            }
            (kind, value) => Err(UnplannableTokenError {
                src: self.parser.src(),
                bad_bit: token.span,
                kind,
                value,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lex::scan_all;

    fn tree(input: &str) -> String {
        let tokens = scan_all(None, input).expect("scan succeeds");
        let mut parser = Parser::new(None, input, tokens);
        parser.check_syntax().expect("grammar accepts");
        Builder::new(&mut parser)
            .build_all()
            .expect("builds")
            .expect("non-empty")
            .to_string()
    }

    fn build_unchecked(input: &str) -> Result<Option<Node>, Error> {
        let tokens = scan_all(None, input).expect("scan succeeds");
        let mut parser = Parser::new(None, input, tokens);
        Builder::new(&mut parser).build()
    }

    #[test]
    fn tiers_nest_by_binding_strength() {
        assert_eq!(tree("2 + 3 * 4"), "(+ 2 (* 3 4))");
        assert_eq!(tree("2 * 3 + 4"), "(+ (* 2 3) 4)");
        assert_eq!(tree("a > 1 && b || c"), "(|| (&& (> a 1) b) c)");
        assert_eq!(tree("a == 1 || b != 'x'"), "(|| (== a 1) (!= b \"x\"))");
    }

    #[test]
    fn groups_are_wrapped() {
        assert_eq!(tree("(2 + 3) * 4"), "(* (group (+ 2 3)) 4)");
        assert_eq!(tree("((x))"), "(group (group x))");
        assert_eq!(tree("(a + (b))"), "(group (+ a (group b)))");
        assert_eq!(tree("((1 + 2)) * 3"), "(* (group (group (+ 1 2))) 3)");
    }

    #[test]
    fn tokens_after_the_root_are_rejected() {
        for input in ["1 + 2) * (3", "true) || (false"] {
            let tokens = scan_all(None, input).expect("scan succeeds");
            let mut parser = Parser::new(None, input, tokens);
            parser.check_balance().expect("balanced");
            parser.check_syntax().expect("grammar accepts");
            let e = Builder::new(&mut parser).build_all().expect_err(input);
            let e = e.downcast_ref::<UnplannableTokenError>().expect("plan error");
            assert_eq!(e.kind, TokenKind::CloseParen, "{input}");
        }
    }

    #[test]
    fn same_tier_operators_nest_to_the_right() {
        assert_eq!(tree("10 - 3 - 2"), "(- 10 (- 3 2))");
        assert_eq!(tree("8 / 4 / 2"), "(/ 8 (/ 4 2))");
    }

    #[test]
    fn logical_not_binds_below_comparison() {
        assert_eq!(tree("!a && b"), "(&& (! a) b)");
        assert_eq!(tree("!a > 1"), "(! (> a 1))");
        assert_eq!(tree("!!flag"), "(! (! flag))");
        assert_eq!(tree("a || !b"), "(|| a (! b))");
    }

    #[test]
    fn unary_signs_attach_to_the_left_operand() {
        assert_eq!(tree("-8 + 2 - 4"), "(+ (- 8) (- 2 4))");
        assert_eq!(tree("-a * b"), "(* (- a) b)");
        assert_eq!(tree("-(2 + 3)"), "(- (group (+ 2 3)))");
        assert_eq!(tree("--2"), "(- (- 2))");
        assert_eq!(tree("1 - -2"), "(- 1 (- 2))");
        assert_eq!(tree("+1.5"), "(+ 1.5)");
    }

    #[test]
    fn literals_keep_their_decoded_values() {
        assert_eq!(tree("true"), "true");
        assert_eq!(tree("2.0"), "2.0");
        assert_eq!(tree(r#""a\tb""#), "\"a\\tb\"");
    }

    #[test]
    fn operator_in_value_position() {
        let e = build_unchecked("* 2").expect_err("not a value");
        let e = e.downcast_ref::<UnplannableTokenError>().expect("plan error");
        assert_eq!(e.kind, TokenKind::Multiply);
        assert_eq!(e.to_string(), "unable to plan token kind: '*', value: 'null'");
    }

    #[test]
    fn unclosed_group() {
        let e = build_unchecked("(1 2").expect_err("unclosed");
        let e = e.downcast_ref::<MissingParenError>().expect("paren error");
        assert_eq!(e.found, TokenKind::IntegerLiteral);
    }

    #[test]
    fn nothing_to_plan() {
        let mut parser = Parser::new(None, "", Vec::new());
        assert!(Builder::new(&mut parser).build().expect("no error").is_none());
    }
}
