//! Compiles small rule expressions (arithmetic, comparison and boolean logic
//! over literals and named variables) into a tree, then evaluates that tree
//! against caller-supplied bindings.
//!
//! ```
//! use rule_engine::{Value, TypeFlag};
//! use std::collections::HashMap;
//!
//! let mut root = rule_engine::compile("x * 2 > 10 && name == 'rule'").unwrap();
//! let mut params = HashMap::new();
//! params.insert("x".to_string(), Value::Integer(6));
//! params.insert("name".to_string(), Value::Text("rule".into()));
//! root.eval(&params).unwrap();
//! assert_eq!(root.value(), (Some(&Value::Bool(true)), TypeFlag::Bool));
//! ```

use miette::Error;

pub mod build;
pub mod eval;
pub mod lex;
pub mod parse;
pub mod token;
pub mod value;

pub use build::{Builder, EmptyExpressionError};
pub use eval::{Node, Symbol};
pub use lex::{Lexer, scan_all};
pub use parse::Parser;
pub use token::{Token, TokenKind, TokenValue};
pub use value::{NoParameters, Parameter, Parameters, TypeFlag, Value};

/// Scans, checks and builds `source` into an evaluable tree.
pub fn compile(source: &str) -> Result<Node, Error> {
    compile_named(None, source)
}

/// Like [`compile`], naming the source in diagnostics.
pub fn compile_named(filename: Option<&str>, source: &str) -> Result<Node, Error> {
    let tokens = scan_all(filename, source)?;
    let mut parser = Parser::new(filename, source, tokens);
    parser.check_balance()?;
    parser.check_syntax()?;

    let root = Builder::new(&mut parser)
        .build_all()?
        .ok_or(EmptyExpressionError)?;
    tracing::debug!(symbol = %root.symbol(), tree = %root, "compiled expression");
    Ok(root)
}

/// Compiles and evaluates `source` once, returning the result and its type.
pub fn evaluate(source: &str, params: &dyn Parameters) -> Result<(Option<Value>, TypeFlag), Error> {
    let mut root = compile(source)?;
    root.eval(params)?;
    let (value, flag) = root.value();
    tracing::debug!(%flag, "evaluated expression");
    Ok((value.cloned(), flag))
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn compile_runs_every_stage() {
        test_utils::init_test_logging();
        assert_eq!(
            evaluate("2 + 3 * 4", &NoParameters).expect("evaluates"),
            (Some(Value::Integer(14)), TypeFlag::Integer)
        );
    }

    #[test]
    fn balance_is_checked_before_grammar() {
        let e = compile("(1 +").expect_err("unbalanced");
        assert!(e.downcast_ref::<parse::UnbalancedParenError>().is_some());
    }

    #[test]
    fn named_sources_show_up_in_reports() {
        let e = compile_named(Some("rules/a.rule"), "1 1").expect_err("rejected");
        let report = format!("{e:?}");
        assert!(report.contains("rules/a.rule"), "{report}");
    }
}
