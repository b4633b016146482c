//! Lexer for the scripting language.
//!
//! The compiler in the `vm` crate pulls tokens one at a time from a
//! [`Lexer`] and emits bytecode directly, so there is no syntax tree.

mod token;
mod lexer;

pub use token::{Token, TokenKind};
pub use lexer::Lexer;
