//! On-demand lexer over an in-memory source string.
//!
//! Tokens borrow their lexemes from the source. Malformed input produces a
//! [`TokenKind::Error`] token whose lexeme is the message, so the compiler
//! reports lexical and syntax errors through one path.
//!
//! | Syntax     | Notes                                   |
//! |------------|-----------------------------------------|
//! | `// …`     | Line comment, runs to end of line       |
//! | `"…"`      | String, may span lines, no escapes      |
//! | `12`, `1.5`| Number, no leading or trailing `.`      |

use crate::token::{Token, TokenKind};

pub struct Lexer<'src> {
    source: &'src str,
    /// Start of the token being scanned.
    start: usize,
    current: usize,
    line: u32,
    emitted_eof: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            emitted_eof: false,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    // ───────────────────────────────────────────────────────────
    //  Cursor
    // ───────────────────────────────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.current += 1;
        Some(b)
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn make(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, &self.source[self.start..self.current], self.line)
    }

    fn error(&self, message: &'static str) -> Token<'src> {
        Token::new(TokenKind::Error, message, self.line)
    }

    // ───────────────────────────────────────────────────────────
    //  Whitespace and comments
    // ───────────────────────────────────────────────────────────

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' => {
                    self.current += 1;
                }
                b'\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                b'/' if self.peek_next() == Some(b'/') => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.current += 1;
                    }
                }
                _ => break,
            }
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Literals
    // ───────────────────────────────────────────────────────────

    fn string(&mut self) -> Token<'src> {
        while let Some(b) = self.peek() {
            if b == b'"' {
                break;
            }
            if b == b'\n' {
                self.line += 1;
            }
            self.current += 1;
        }
        if self.is_at_end() {
            return self.error("Unterminated string.");
        }
        self.current += 1; // closing quote
        self.make(TokenKind::String)
    }

    fn number(&mut self) -> Token<'src> {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.current += 1;
        }
        if self.peek() == Some(b'.')
            && self.peek_next().is_some_and(|b| b.is_ascii_digit())
        {
            self.current += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.current += 1;
            }
        }
        self.make(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'src> {
        while self.peek().is_some_and(|b| is_alpha(b) || b.is_ascii_digit()) {
            self.current += 1;
        }
        let text = &self.source[self.start..self.current];
        self.make(TokenKind::keyword(text).unwrap_or(TokenKind::Identifier))
    }

    // ───────────────────────────────────────────────────────────
    //  Entry point
    // ───────────────────────────────────────────────────────────

    /// Scan the next token. Returns [`TokenKind::Eof`] forever once the
    /// input is exhausted.
    pub fn scan_token(&mut self) -> Token<'src> {
        self.skip_whitespace();
        self.start = self.current;

        let Some(c) = self.advance() else {
            return self.make(TokenKind::Eof);
        };

        if is_alpha(c) {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        match c {
            b'(' => self.make(TokenKind::LeftParen),
            b')' => self.make(TokenKind::RightParen),
            b'{' => self.make(TokenKind::LeftBrace),
            b'}' => self.make(TokenKind::RightBrace),
            b';' => self.make(TokenKind::Semicolon),
            b',' => self.make(TokenKind::Comma),
            b'.' => self.make(TokenKind::Dot),
            b'-' => self.make(TokenKind::Minus),
            b'+' => self.make(TokenKind::Plus),
            b'/' => self.make(TokenKind::Slash),
            b'*' => self.make(TokenKind::Star),
            b'!' => {
                let kind = if self.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make(kind)
            }
            b'=' => {
                let kind = if self.matches(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make(kind)
            }
            b'<' => {
                let kind = if self.matches(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make(kind)
            }
            b'>' => {
                let kind = if self.matches(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make(kind)
            }
            b'"' => self.string(),
            _ => {
                // Skip the rest of a multi-byte character so the next token
                // starts on a char boundary.
                while !self.source.is_char_boundary(self.current) {
                    self.current += 1;
                }
                self.error("Unexpected character.")
            }
        }
    }
}

fn is_alpha(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Token<'src>> {
        if self.emitted_eof {
            return None;
        }
        let tok = self.scan_token();
        if tok.is_eof() {
            self.emitted_eof = true;
        }
        Some(tok)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════
