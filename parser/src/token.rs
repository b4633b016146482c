//! Token types produced by the lexer.

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    /// String literal. The lexeme includes the surrounding quotes.
    String,
    Number,

    // Keywords.
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    /// A malformed token. The lexeme is the error message.
    Error,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Human-readable name for debugging output.
    pub fn name(self) -> &'static str {
        match self {
            Self::LeftParen => "`(`",
            Self::RightParen => "`)`",
            Self::LeftBrace => "`{`",
            Self::RightBrace => "`}`",
            Self::Comma => "`,`",
            Self::Dot => "`.`",
            Self::Minus => "`-`",
            Self::Plus => "`+`",
            Self::Semicolon => "`;`",
            Self::Slash => "`/`",
            Self::Star => "`*`",
            Self::Bang => "`!`",
            Self::BangEqual => "`!=`",
            Self::Equal => "`=`",
            Self::EqualEqual => "`==`",
            Self::Greater => "`>`",
            Self::GreaterEqual => "`>=`",
            Self::Less => "`<`",
            Self::LessEqual => "`<=`",
            Self::Identifier => "identifier",
            Self::String => "string",
            Self::Number => "number",
            Self::And => "`and`",
            Self::Class => "`class`",
            Self::Else => "`else`",
            Self::False => "`false`",
            Self::For => "`for`",
            Self::Fun => "`fun`",
            Self::If => "`if`",
            Self::Nil => "`nil`",
            Self::Or => "`or`",
            Self::Print => "`print`",
            Self::Return => "`return`",
            Self::Super => "`super`",
            Self::This => "`this`",
            Self::True => "`true`",
            Self::Var => "`var`",
            Self::While => "`while`",
            Self::Error => "error",
            Self::Eof => "end of input",
        }
    }

    /// Keyword for an identifier lexeme, if it is reserved.
    pub fn keyword(ident: &str) -> Option<Self> {
        Some(match ident {
            "and" => Self::And,
            "class" => Self::Class,
            "else" => Self::Else,
            "false" => Self::False,
            "for" => Self::For,
            "fun" => Self::Fun,
            "if" => Self::If,
            "nil" => Self::Nil,
            "or" => Self::Or,
            "print" => Self::Print,
            "return" => Self::Return,
            "super" => Self::Super,
            "this" => Self::This,
            "true" => Self::True,
            "var" => Self::Var,
            "while" => Self::While,
            _ => return None,
        })
    }
}

/// A token borrowing its lexeme from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// The source text of this token, or the message for [`TokenKind::Error`].
    pub lexeme: &'src str,
    /// Line number (1-based).
    pub line: u32,
}

impl<'src> Token<'src> {
    pub const fn new(kind: TokenKind, lexeme: &'src str, line: u32) -> Self {
        Self { kind, lexeme, line }
    }

    /// A placeholder used before the first token is read.
    pub const fn synthetic(lexeme: &'src str) -> Self {
        Self { kind: TokenKind::Error, lexeme, line: 0 }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}
