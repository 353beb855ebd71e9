//! Kiln lexer module

mod scanner;
mod token;

pub use scanner::{Lexed, Lexer};
pub use token::{Keyword, Token, TokenKind, TokenStream};
