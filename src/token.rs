use std::fmt::Display;

use miette::SourceSpan;

/// A single scanned token.
///
/// `position` is the offset of the first code point of the token in the
/// source, counted in code points. `span` is the same token measured in bytes,
/// used only for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub position: usize,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Illegal,
    Eof,

    Identifier,
    BoolLiteral,
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,

    OpenParen,
    CloseParen,

    Addition,
    Subtraction,
    Multiply,
    Divide,
    Modulus,

    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,

    And,
    Or,
    Not,
}

/// Where the grammar may go after a token of some kind.
#[derive(Debug)]
pub struct LexerState {
    is_eof: bool,
    valid_next_kinds: &'static [TokenKind],
}

impl LexerState {
    pub fn can_transition_to(&self, kind: TokenKind) -> bool {
        self.valid_next_kinds.contains(&kind)
    }

    /// Whether an expression may legally end after this state.
    pub fn is_eof(&self) -> bool {
        self.is_eof
    }
}

use TokenKind::*;

const VALUE_START: &[TokenKind] = &[
    Identifier,
    BoolLiteral,
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    OpenParen,
    Addition,
    Subtraction,
    Not,
];

const AFTER_NUMBER: &[TokenKind] = &[
    CloseParen,
    Addition,
    Subtraction,
    Multiply,
    Divide,
    Modulus,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Eof,
];

const AFTER_ARITHMETIC: &[TokenKind] = &[
    Identifier,
    IntegerLiteral,
    FloatLiteral,
    OpenParen,
    Addition,
    Subtraction,
];

// `+ 145 > +146` and `- 145 > -146` are both fine
const AFTER_ORDERING: &[TokenKind] = AFTER_ARITHMETIC;

const AFTER_EQUALITY: &[TokenKind] = &[
    Identifier,
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    BoolLiteral,
    OpenParen,
    Addition,
    Subtraction,
];

// `true || -7 > 9`
const AFTER_LOGIC: &[TokenKind] = &[
    Identifier,
    BoolLiteral,
    OpenParen,
    Subtraction,
    Addition,
    FloatLiteral,
    IntegerLiteral,
    Not,
];

static EOF_STATE: LexerState = LexerState {
    is_eof: true,
    valid_next_kinds: &[],
};

static START_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: VALUE_START,
};

static IDENTIFIER_STATE: LexerState = LexerState {
    is_eof: true,
    valid_next_kinds: AFTER_NUMBER,
};

static BOOL_STATE: LexerState = LexerState {
    is_eof: true,
    valid_next_kinds: &[CloseParen, Equal, NotEqual, And, Or, Eof],
};

static NUMBER_STATE: LexerState = LexerState {
    is_eof: true,
    valid_next_kinds: AFTER_NUMBER,
};

static STRING_STATE: LexerState = LexerState {
    is_eof: true,
    valid_next_kinds: &[CloseParen, Addition, Equal, NotEqual, Eof, And, Or],
};

static OPEN_PAREN_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: VALUE_START,
};

// `((a))` nests, so `)` may close several groups in a row
static CLOSE_PAREN_STATE: LexerState = LexerState {
    is_eof: true,
    valid_next_kinds: &[
        CloseParen,
        Addition,
        Subtraction,
        Multiply,
        Divide,
        Modulus,
        GreaterThan,
        LessThan,
        GreaterEqual,
        LessEqual,
        Equal,
        NotEqual,
        And,
        Or,
        Eof,
    ],
};

static ADDITION_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: &[
        Identifier,
        IntegerLiteral,
        FloatLiteral,
        StringLiteral,
        OpenParen,
        Subtraction,
        Addition,
    ],
};

static ARITHMETIC_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: AFTER_ARITHMETIC,
};

static MODULUS_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: &[Identifier, IntegerLiteral, FloatLiteral, OpenParen],
};

static ORDERING_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: AFTER_ORDERING,
};

static EQUALITY_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: AFTER_EQUALITY,
};

static LOGIC_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: AFTER_LOGIC,
};

static NOT_STATE: LexerState = LexerState {
    is_eof: false,
    valid_next_kinds: &[Identifier, BoolLiteral, OpenParen, Not],
};

impl TokenKind {
    /// The grammar rule for what may follow this kind.
    ///
    /// `Illegal` doubles as the implicit token before the first real one, so
    /// its state lists everything an expression may start with.
    pub fn lexer_state(self) -> &'static LexerState {
        match self {
            Eof => &EOF_STATE,
            Illegal => &START_STATE,
            Identifier => &IDENTIFIER_STATE,
            BoolLiteral => &BOOL_STATE,
            IntegerLiteral | FloatLiteral => &NUMBER_STATE,
            StringLiteral => &STRING_STATE,
            OpenParen => &OPEN_PAREN_STATE,
            CloseParen => &CLOSE_PAREN_STATE,
            Addition => &ADDITION_STATE,
            Subtraction | Multiply | Divide => &ARITHMETIC_STATE,
            Modulus => &MODULUS_STATE,
            GreaterThan | LessThan | GreaterEqual | LessEqual => &ORDERING_STATE,
            Equal | NotEqual => &EQUALITY_STATE,
            And | Or => &LOGIC_STATE,
            Not => &NOT_STATE,
        }
    }

    /// Upper-case name used when printing a token stream.
    pub fn name(self) -> &'static str {
        match self {
            Illegal => "ILLEGAL",
            Eof => "EOF",
            Identifier => "IDENTIFIER",
            BoolLiteral => "BOOL",
            IntegerLiteral => "INTEGER",
            FloatLiteral => "FLOAT",
            StringLiteral => "STRING",
            OpenParen => "LEFT_PAREN",
            CloseParen => "RIGHT_PAREN",
            Addition => "PLUS",
            Subtraction => "MINUS",
            Multiply => "STAR",
            Divide => "SLASH",
            Modulus => "PERCENT",
            GreaterThan => "GREATER",
            LessThan => "LESS",
            GreaterEqual => "GREATER_EQUAL",
            LessEqual => "LESS_EQUAL",
            Equal => "EQUAL_EQUAL",
            NotEqual => "BANG_EQUAL",
            And => "AND",
            Or => "OR",
            Not => "BANG",
        }
    }
}

/// Maps a scanned word to its keyword kind, or `Identifier`.
pub fn lookup(ident: &str) -> TokenKind {
    match ident {
        "true" | "false" => BoolLiteral,
        _ => Identifier,
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Illegal => "Illegal",
            Eof => "Eof",
            Identifier => "Identifier",
            BoolLiteral => "BoolLiteral",
            IntegerLiteral => "IntegerLiteral",
            FloatLiteral => "FloatLiteral",
            StringLiteral => "StringLiteral",
            OpenParen => "(",
            CloseParen => ")",
            Addition => "+",
            Subtraction => "-",
            Multiply => "*",
            Divide => "/",
            Modulus => "%",
            GreaterThan => ">",
            LessThan => "<",
            GreaterEqual => ">=",
            LessEqual => "<=",
            Equal => "==",
            NotEqual => "!=",
            And => "&&",
            Or => "||",
            Not => "!",
        };
        f.write_str(s)
    }
}

impl Display for TokenValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenValue::None => write!(f, "null"),
            TokenValue::Bool(b) => write!(f, "{b}"),
            TokenValue::Int(n) => write!(f, "{n}"),
            TokenValue::Float(n) => {
                if n.is_finite() && *n == n.trunc() {
                    write!(f, "{n}.0")
                } else {
                    write!(f, "{n}")
                }
            }
            TokenValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = self.kind.name();
        match (&self.kind, &self.value) {
            (Eof, _) => write!(f, "{kind}  null"),
            (_, TokenValue::None) => write!(f, "{kind} {} null", self.kind),
            (Identifier, TokenValue::Str(name)) => write!(f, "{kind} {name}"),
            (_, value) => write!(f, "{kind} {value}"),
        }
    }
}

impl Token {
    /// The kind together with its decoded value, as named in grammar errors.
    pub fn describe(&self) -> String {
        match &self.value {
            TokenValue::None => self.kind.to_string(),
            value => format!("{} [{value}]", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_state_admits_only_value_starts() {
        let start = Illegal.lexer_state();
        assert!(!start.is_eof());
        for kind in [Identifier, IntegerLiteral, OpenParen, Subtraction, Not] {
            assert!(start.can_transition_to(kind), "{kind}");
        }
        for kind in [Eof, CloseParen, Multiply, And, Equal] {
            assert!(!start.can_transition_to(kind), "{kind}");
        }
    }

    #[test]
    fn every_value_kind_may_end_an_expression() {
        for kind in [
            Identifier,
            BoolLiteral,
            IntegerLiteral,
            FloatLiteral,
            StringLiteral,
            CloseParen,
            Eof,
        ] {
            assert!(kind.lexer_state().is_eof(), "{kind}");
        }
        for kind in [OpenParen, Addition, Modulus, Equal, And, Not] {
            assert!(!kind.lexer_state().is_eof(), "{kind}");
        }
    }

    #[test]
    fn strings_only_concatenate_or_compare_for_equality() {
        let state = StringLiteral.lexer_state();
        assert!(state.can_transition_to(Addition));
        assert!(state.can_transition_to(Equal));
        assert!(!state.can_transition_to(Subtraction));
        assert!(!state.can_transition_to(LessThan));
        assert!(!Subtraction.lexer_state().can_transition_to(StringLiteral));
    }

    #[test]
    fn groups_nest_both_ways() {
        assert!(OpenParen.lexer_state().can_transition_to(OpenParen));
        assert!(CloseParen.lexer_state().can_transition_to(CloseParen));
        assert!(!OpenParen.lexer_state().can_transition_to(CloseParen));
        assert!(!CloseParen.lexer_state().can_transition_to(OpenParen));
    }

    #[test]
    fn keywords() {
        assert_eq!(lookup("true"), BoolLiteral);
        assert_eq!(lookup("false"), BoolLiteral);
        assert_eq!(lookup("truth"), Identifier);
    }

    #[test]
    fn printable_forms() {
        assert_eq!(GreaterEqual.to_string(), ">=");
        assert_eq!(Identifier.to_string(), "Identifier");
        let token = Token {
            kind: IntegerLiteral,
            value: TokenValue::Int(12),
            position: 0,
            span: (0..2).into(),
        };
        assert_eq!(token.to_string(), "INTEGER 12");
        assert_eq!(token.describe(), "IntegerLiteral [12]");
    }
}
