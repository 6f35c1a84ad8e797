use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Error, Debug, Diagnostic)]
#[error("unbalanced parenthesis")]
#[diagnostic(help("every `(` needs a matching `)`"))]
pub struct UnbalancedParenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("{open} opened, {close} closed")]
    whole: SourceSpan,

    pub open: usize,
    pub close: usize,
}

#[derive(Error, Debug, Diagnostic)]
#[error("cannot transition token types from {from} to {to}")]
#[diagnostic(help("`{from_kind}` cannot be followed by `{to_kind}`"))]
pub struct TransitionError {
    #[source_code]
    src: NamedSource<String>,

    #[label("unexpected here")]
    bad_bit: SourceSpan,

    pub from_kind: TokenKind,
    pub to_kind: TokenKind,
    from: String,
    to: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("unexpected end of expression")]
#[diagnostic(help("the expression stops after an operator or an opening parenthesis"))]
pub struct Eof {
    #[source_code]
    src: NamedSource<String>,

    #[label("expression ends here")]
    bad_line: SourceSpan,
}

/// A cursor over scanned tokens, plus the grammar checks run before building.
pub struct Parser<'de> {
    filename: Option<&'de str>,
    pub(crate) whole: &'de str,
    tokens: Vec<Token>,
    index: usize,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str, tokens: Vec<Token>) -> Self {
        Parser {
            filename,
            whole,
            tokens,
            index: 0,
        }
    }

    pub(crate) fn src(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<expression>"), self.whole.to_string())
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn has_next(&self) -> bool {
        self.index < self.tokens.len()
    }

    /// Returns the current token and advances past it.
    pub fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.index)?;
        self.index += 1;
        Some(token)
    }

    /// Steps back exactly one token.
    pub fn rewind(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Counts `(` against `)` over the whole sequence.
    pub fn check_balance(&mut self) -> Result<(), Error> {
        let (mut open, mut close) = (0, 0);
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::OpenParen => open += 1,
                TokenKind::CloseParen => close += 1,
                _ => {}
            }
        }

        if open != close {
            return Err(UnbalancedParenError {
                src: self.src(),
                whole: SourceSpan::from(0..self.whole.len()),
                open,
                close,
            }
            .into());
        }
        self.index = 0;
        Ok(())
    }

    /// Walks the sequence through the token transition grammar.
    pub fn check_syntax(&mut self) -> Result<(), Error> {
        let mut last: Option<Token> = None;
        let mut state = TokenKind::Illegal.lexer_state();

        while let Some(token) = self.next() {
            let token = token.clone();
            tracing::trace!(kind = %token.kind, position = token.position, "grammar step");
            if !state.can_transition_to(token.kind) {
                let from_kind = last.as_ref().map_or(TokenKind::Illegal, |t| t.kind);
                return Err(TransitionError {
                    src: self.src(),
                    bad_bit: token.span,
                    from_kind,
                    to_kind: token.kind,
                    from: last.as_ref().map_or_else(|| from_kind.to_string(), Token::describe),
                    to: token.describe(),
                }
                .into());
            }
            state = token.kind.lexer_state();
            last = Some(token);
        }

        if !state.is_eof() {
            let end = self.whole.len();
            return Err(Eof {
                src: self.src(),
                bad_line: SourceSpan::from(end.saturating_sub(1)..end),
            }
            .into());
        }
        self.index = 0;
        Ok(())
    }
}
