use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::token::{self, Token, TokenKind, TokenValue};

#[derive(Error, Debug, Diagnostic)]
#[error("illegal character '{token}'")]
#[diagnostic(help("remove or correct the character: `{token}`"))]
pub struct SingleTokenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this character")]
    bad_bit: SourceSpan,

    pub token: char,
}

#[derive(Error, Debug, Diagnostic)]
#[error("{kind} literal not terminated")]
#[diagnostic(help("add the closing `{quote}`"))]
pub struct StringTerminationError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this literal never ends")]
    bad_line: SourceSpan,

    pub kind: &'static str,
    pub quote: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeProblem {
    Unknown,
    Unterminated,
    IllegalDigit(char),
    InvalidCodePoint(u32),
}

impl Display for EscapeProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscapeProblem::Unknown => write!(f, "unknown escape sequence"),
            EscapeProblem::Unterminated => write!(f, "escape sequence not terminated"),
            EscapeProblem::IllegalDigit(c) => {
                write!(f, "illegal character {c:?} in escape sequence")
            }
            EscapeProblem::InvalidCodePoint(x) => {
                write!(f, "escape sequence {x:#x} is invalid Unicode code point")
            }
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("{problem}")]
#[diagnostic(help(
    "valid escapes are \\a \\b \\f \\n \\r \\t \\v \\\\ \\' \\\", \\NNN, \\xHH, \\uHHHH and \\UHHHHHHHH"
))]
pub struct EscapeError {
    #[source_code]
    src: NamedSource<String>,

    #[label("in this escape")]
    bad_bit: SourceSpan,

    pub problem: EscapeProblem,
}

#[derive(Error, Debug, Diagnostic)]
#[error("unable to compile numeric value '{literal}'")]
#[diagnostic(help("numbers are decimal integers or floats such as `12` and `1.5`"))]
pub struct NumberLiteralError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this numeric literal")]
    bad_bit: SourceSpan,

    pub literal: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("expected `{expected}`, but only found `{found}`")]
#[diagnostic(help("use `{expected}` here instead"))]
pub struct ExpectedPairError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    bad_bit: SourceSpan,

    pub expected: &'static str,
    pub found: char,
}

/// Scans an expression into tokens.
///
/// Works on code points, not bytes: `position` in every produced token is a
/// code-point offset. The final token is always `Eof`; after it (or after the
/// first error) the iterator is exhausted.
pub struct Lexer<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    chars: Vec<(usize, char)>,
    position: usize,
    done: bool,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: Option<&'de str>, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            chars: input.char_indices().collect(),
            position: 0,
            done: false,
        }
    }

    fn src(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<expression>"), self.whole.to_string())
    }

    fn cur(&self) -> Option<char> {
        self.chars.get(self.position).map(|&(_, c)| c)
    }

    fn read(&mut self) -> Option<char> {
        let c = self.cur()?;
        self.position += 1;
        Some(c)
    }

    /// Byte offset of the code point at `position`.
    fn byte(&self, position: usize) -> usize {
        self.chars
            .get(position)
            .map_or(self.whole.len(), |&(byte, _)| byte)
    }

    fn span(&self, from: usize, to: usize) -> SourceSpan {
        let start = self.byte(from);
        SourceSpan::from(start..self.byte(to).max(start))
    }

    fn skip_whitespace(&mut self) {
        while self.cur().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let mut literal = String::new();
        while let Some(c) = self.cur().filter(|&c| keep(c)) {
            literal.push(c);
            self.position += 1;
        }
        literal
    }

    fn scan_string(&mut self, start: usize, quote: char) -> Result<String, Error> {
        self.read();
        let mut decoded = String::new();
        loop {
            match self.read() {
                None => {
                    return Err(StringTerminationError {
                        src: self.src(),
                        bad_line: self.span(start, self.chars.len()),
                        kind: "string",
                        quote,
                    }
                    .into());
                }
                Some(c) if c == quote => return Ok(decoded),
                Some('\\') => decoded.push(self.scan_escape()?),
                Some(c) => decoded.push(c),
            }
        }
    }

    fn scan_raw_string(&mut self, start: usize) -> Result<String, Error> {
        self.read();
        let literal = self.take_while(|c| c != '`');
        match self.read() {
            Some('`') => Ok(literal),
            _ => Err(StringTerminationError {
                src: self.src(),
                bad_line: self.span(start, self.chars.len()),
                kind: "raw string",
                quote: '`',
            }
            .into()),
        }
    }

    /// Decodes one escape sequence; the backslash is already consumed.
    ///
    /// On error the offending character is left unconsumed.
    fn scan_escape(&mut self) -> Result<char, Error> {
        let backslash = self.position - 1;
        let fail = |lexer: &Self, problem| -> Error {
            EscapeError {
                src: lexer.src(),
                bad_bit: lexer.span(backslash, lexer.position + 1),
                problem,
            }
            .into()
        };

        let (mut digits, base, max) = match self.cur() {
            Some(c @ ('a' | 'b' | 'f' | 'n' | 'r' | 't' | 'v' | '\\' | '\'' | '"')) => {
                self.read();
                return Ok(match c {
                    'a' => '\x07',
                    'b' => '\x08',
                    'f' => '\x0c',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'v' => '\x0b',
                    c => c,
                });
            }
            Some('0'..='7') => (3, 8, 255),
            Some('x') => {
                self.read();
                (2, 16, 255)
            }
            Some('u') => {
                self.read();
                (4, 16, char::MAX as u32)
            }
            Some('U') => {
                self.read();
                (8, 16, char::MAX as u32)
            }
            Some(_) => return Err(fail(self, EscapeProblem::Unknown)),
            None => return Err(fail(self, EscapeProblem::Unterminated)),
        };

        let mut x: u32 = 0;
        while digits > 0 {
            let Some(c) = self.cur() else {
                return Err(fail(self, EscapeProblem::Unterminated));
            };
            let Some(d) = c.to_digit(base) else {
                return Err(fail(self, EscapeProblem::IllegalDigit(c)));
            };
            x = x * base + d;
            self.read();
            digits -= 1;
        }

        if x > max || (0xD800..0xE000).contains(&x) {
            return Err(fail(self, EscapeProblem::InvalidCodePoint(x)));
        }
        char::from_u32(x).ok_or_else(|| fail(self, EscapeProblem::InvalidCodePoint(x)))
    }
}

/// Scans the whole input, stopping at the first error.
///
/// On success the last token is `Eof`.
pub fn scan_all(filename: Option<&str>, input: &str) -> Result<Vec<Token>, Error> {
    let tokens = Lexer::new(filename, input).collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(tokens = tokens.len(), "scanned expression");
    Ok(tokens)
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.skip_whitespace();
        let start = self.position;

        let token = |lexer: &Self, kind: TokenKind, value: TokenValue| Token {
            kind,
            value,
            position: start,
            span: lexer.span(start, lexer.position),
        };

        let Some(c) = self.cur() else {
            self.done = true;
            return Some(Ok(token(self, TokenKind::Eof, TokenValue::None)));
        };

        enum Start {
            Ident,
            Number,
            String(char),
            RawString,
            IfEqualElse(TokenKind, TokenKind),
            Pair(char, TokenKind, &'static str),
        }

        let single = match c {
            '(' => Some(TokenKind::OpenParen),
            ')' => Some(TokenKind::CloseParen),
            '+' => Some(TokenKind::Addition),
            '-' => Some(TokenKind::Subtraction),
            '*' => Some(TokenKind::Multiply),
            '/' => Some(TokenKind::Divide),
            '%' => Some(TokenKind::Modulus),
            _ => None,
        };
        if let Some(kind) = single {
            self.read();
            return Some(Ok(token(self, kind, TokenValue::None)));
        }

        let started = match c {
            '<' => Start::IfEqualElse(TokenKind::LessEqual, TokenKind::LessThan),
            '>' => Start::IfEqualElse(TokenKind::GreaterEqual, TokenKind::GreaterThan),
            '!' => Start::IfEqualElse(TokenKind::NotEqual, TokenKind::Not),
            '=' => Start::Pair('=', TokenKind::Equal, "=="),
            '&' => Start::Pair('&', TokenKind::And, "&&"),
            '|' => Start::Pair('|', TokenKind::Or, "||"),
            '"' | '\'' => Start::String(c),
            '`' => Start::RawString,
            c if c.is_alphabetic() || c == '_' => Start::Ident,
            c if c.is_ascii_digit() || c == '.' => Start::Number,
            c => {
                self.done = true;
                return Some(Err(SingleTokenError {
                    src: self.src(),
                    bad_bit: self.span(start, start + 1),
                    token: c,
                }
                .into()));
            }
        };

        let scanned = match started {
            Start::Ident => {
                let literal =
                    self.take_while(|c| c.is_alphabetic() || c.is_ascii_digit() || c == '_');
                let kind = token::lookup(&literal);
                let value = match kind {
                    TokenKind::BoolLiteral => TokenValue::Bool(literal == "true"),
                    _ => TokenValue::Str(literal),
                };
                Ok(token(self, kind, value))
            }
            Start::Number => {
                let literal = self.take_while(|c| c.is_ascii_digit() || c == '.');
                let parsed = if literal.contains('.') {
                    literal
                        .parse()
                        .map(|n| (TokenKind::FloatLiteral, TokenValue::Float(n)))
                        .ok()
                } else {
                    literal
                        .parse()
                        .map(|n| (TokenKind::IntegerLiteral, TokenValue::Int(n)))
                        .ok()
                };
                match parsed {
                    Some((kind, value)) => Ok(token(self, kind, value)),
                    None => Err(NumberLiteralError {
                        src: self.src(),
                        bad_bit: self.span(start, self.position),
                        literal,
                    }
                    .into()),
                }
            }
            Start::String(quote) => self
                .scan_string(start, quote)
                .map(|s| token(self, TokenKind::StringLiteral, TokenValue::Str(s))),
            Start::RawString => self
                .scan_raw_string(start)
                .map(|s| token(self, TokenKind::StringLiteral, TokenValue::Str(s))),
            Start::IfEqualElse(yes, no) => {
                self.read();
                if self.cur() == Some('=') {
                    self.read();
                    Ok(token(self, yes, TokenValue::None))
                } else {
                    Ok(token(self, no, TokenValue::None))
                }
            }
            Start::Pair(second, kind, expected) => {
                self.read();
                if self.cur() == Some(second) {
                    self.read();
                    Ok(token(self, kind, TokenValue::None))
                } else {
                    Err(ExpectedPairError {
                        src: self.src(),
                        bad_bit: self.span(start, self.position),
                        expected,
                        found: c,
                    }
                    .into())
                }
            }
        };

        if scanned.is_err() {
            self.done = true;
        }
        Some(scanned)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        scan_all(None, input)
            .expect("scan succeeds")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn values(input: &str) -> Vec<TokenValue> {
        scan_all(None, input)
            .expect("scan succeeds")
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    fn scan_error(input: &str) -> Error {
        match scan_all(None, input) {
            Ok(tokens) => panic!("expected an error, got {tokens:?}"),
            Err(e) => e,
        }
    }

    #[test]
    fn empty_input_is_just_eof() {
        assert_eq!(kinds(""), vec![Eof]);
        assert_eq!(kinds("  \t\n"), vec![Eof]);
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("+ - * / % ( ) > >= < <= == != && || !"),
            vec![
                Addition,
                Subtraction,
                Multiply,
                Divide,
                Modulus,
                OpenParen,
                CloseParen,
                GreaterThan,
                GreaterEqual,
                LessThan,
                LessEqual,
                Equal,
                NotEqual,
                And,
                Or,
                Not,
                Eof,
            ]
        );
    }

    #[test]
    fn long_forms_need_adjacent_equals() {
        assert_eq!(kinds("!x"), vec![Not, Identifier, Eof]);
        assert!(scan_error("> = 1").downcast_ref::<ExpectedPairError>().is_some());
    }

    #[test]
    fn identifiers_and_keywords() {
        assert_eq!(
            values("a_1 true false _x héllo"),
            vec![
                TokenValue::Str("a_1".into()),
                TokenValue::Bool(true),
                TokenValue::Bool(false),
                TokenValue::Str("_x".into()),
                TokenValue::Str("héllo".into()),
                TokenValue::None,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            values("12 1.5 .5 3."),
            vec![
                TokenValue::Int(12),
                TokenValue::Float(1.5),
                TokenValue::Float(0.5),
                TokenValue::Float(3.0),
                TokenValue::None,
            ]
        );
        assert_eq!(kinds("12 1.5"), vec![IntegerLiteral, FloatLiteral, Eof]);
    }

    #[test]
    fn malformed_numbers() {
        let e = scan_error("1.2.3");
        let e = e.downcast_ref::<NumberLiteralError>().expect("number error");
        assert_eq!(e.literal, "1.2.3");

        assert!(
            scan_error("99999999999999999999")
                .downcast_ref::<NumberLiteralError>()
                .is_some()
        );
    }

    #[test]
    fn quoted_strings_decode_escapes() {
        assert_eq!(
            values(r#""a\tb" 'it\'s' "\x41\101é\U0001F600" "say \"hi\"""#),
            vec![
                TokenValue::Str("a\tb".into()),
                TokenValue::Str("it's".into()),
                TokenValue::Str("AAé😀".into()),
                TokenValue::Str("say \"hi\"".into()),
                TokenValue::None,
            ]
        );
    }

    #[test]
    fn every_escape_decodes() {
        assert_eq!(
            values(r#""\a\b\f\n\r\t\v\\\'\"" '\u00e9\u4e2d' '\060\x7A\U0001F600'"#),
            vec![
                TokenValue::Str("\x07\x08\x0c\n\r\t\x0b\\'\"".into()),
                TokenValue::Str("é中".into()),
                TokenValue::Str("0z😀".into()),
                TokenValue::None,
            ]
        );
        assert_eq!(
            scan_error(r#""\u12""#)
                .downcast_ref::<EscapeError>()
                .expect("escape error")
                .problem,
            EscapeProblem::IllegalDigit('"')
        );
    }

    #[test]
    fn numeric_symbols_outside_ascii_digits_are_illegal() {
        let e = scan_error("x²");
        let e = e.downcast_ref::<SingleTokenError>().expect("illegal character");
        assert_eq!(e.token, '²');

        let e = scan_error("1½");
        let e = e.downcast_ref::<SingleTokenError>().expect("illegal character");
        assert_eq!(e.token, '½');

        assert_eq!(
            values("héllo_2"),
            vec![TokenValue::Str("héllo_2".into()), TokenValue::None]
        );
    }

    #[test]
    fn raw_strings_are_verbatim() {
        assert_eq!(
            values(r"`a\nb`"),
            vec![TokenValue::Str(r"a\nb".into()), TokenValue::None]
        );
    }

    #[test]
    fn string_errors() {
        let e = scan_error("\"abc");
        let e = e.downcast_ref::<StringTerminationError>().expect("termination");
        assert_eq!(e.kind, "string");

        let e = scan_error("`abc");
        let e = e.downcast_ref::<StringTerminationError>().expect("termination");
        assert_eq!(e.kind, "raw string");

        let problem = |input| {
            scan_error(input)
                .downcast_ref::<EscapeError>()
                .expect("escape error")
                .problem
        };
        assert_eq!(problem(r#""\q""#), EscapeProblem::Unknown);
        assert_eq!(problem(r#""\xZ1""#), EscapeProblem::IllegalDigit('Z'));
        assert_eq!(problem(r#""\ud800""#), EscapeProblem::InvalidCodePoint(0xd800));
        assert_eq!(problem(r#""\U00110000""#), EscapeProblem::InvalidCodePoint(0x110000));
        assert_eq!(problem(r#""\777""#), EscapeProblem::InvalidCodePoint(0o777));
        assert_eq!(problem("\"\\"), EscapeProblem::Unterminated);
    }

    #[test]
    fn lone_pairs() {
        let e = scan_error("a & b");
        let e = e.downcast_ref::<ExpectedPairError>().expect("pair error");
        assert_eq!(e.to_string(), "expected `&&`, but only found `&`");

        let e = scan_error("a | b");
        assert_eq!(e.to_string(), "expected `||`, but only found `|`");

        let e = scan_error("a = b");
        assert_eq!(e.to_string(), "expected `==`, but only found `=`");
    }

    #[test]
    fn illegal_character_stops_scanning() {
        let mut lexer = Lexer::new(None, "1 # 2");
        assert_eq!(lexer.next().map(|t| t.map(|t| t.kind).ok()), Some(Some(IntegerLiteral)));
        let e = lexer.next().expect("an item").expect_err("an error");
        let e = e.downcast_ref::<SingleTokenError>().expect("illegal character");
        assert_eq!(e.token, '#');
        assert!(lexer.next().is_none());
    }

    #[test]
    fn positions_count_code_points() {
        let tokens = scan_all(None, "'é' + x").expect("scan succeeds");
        let positions: Vec<_> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 4, 6, 7]);
        assert_eq!(tokens[1].span, SourceSpan::from(5..6));
    }
}
