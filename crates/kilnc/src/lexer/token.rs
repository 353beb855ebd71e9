//! Kiln token definitions using logos

use crate::common::{Location, StrId, WordId, Words};
use crate::types::TypeTag;
use logos::Logos;
use std::fmt;

/// Raw token kinds as recognized by logos, before interning
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub(super) enum RawToken {
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("let")]
    Let,
    #[token("struct")]
    Struct,
    #[token("int")]
    Int,
    #[token("bool")]
    Bool,
    #[token("ptr")]
    Ptr,
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"0x[0-9a-fA-F]+", priority = 4, callback = |lex| parse_hex(lex.slice()))]
    HexLiteral(i64),
    #[regex(r"-?[0-9]+", priority = 3, callback = |lex| lex.slice().parse::<i64>().ok())]
    IntLiteral(i64),

    #[regex(r#""([^"\\]|\\.)*""#, callback = |lex| unescape(lex.slice()))]
    StringLiteral(String),

    // Anything else that is not whitespace, a colon or a quote
    #[regex(r#"[^ \t\r\n\f:"]+"#, priority = 1, callback = |lex| lex.slice().to_string())]
    Word(String),
}

fn parse_hex(literal: &str) -> Option<i64> {
    i64::from_str_radix(&literal[2..], 16).ok()
}

/// Strip the quotes from a string literal and resolve escapes
fn unescape(quoted: &str) -> Option<String> {
    let body = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            _ => return None,
        }
    }
    Some(out)
}

/// Reserved words and punctuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Else,
    End,
    Let,
    Struct,
    Int,
    Bool,
    Ptr,
    Arrow,
    Colon,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::Let => "let",
            Keyword::Struct => "struct",
            Keyword::Int => "int",
            Keyword::Bool => "bool",
            Keyword::Ptr => "ptr",
            Keyword::Arrow => "->",
            Keyword::Colon => ":",
        }
    }

    /// The scalar type named by this keyword, if any
    pub fn scalar_type(self) -> Option<TypeTag> {
        match self {
            Keyword::Int => Some(TypeTag::Int),
            Keyword::Bool => Some(TypeTag::Bool),
            Keyword::Ptr => Some(TypeTag::Ptr),
            _ => None,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token payload after interning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Word(WordId),
    Int(i64),
    Bool(bool),
    Ptr(i64),
    Str(StrId),
}

/// A Kiln token with its kind and source location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Location,
}

impl Token {
    pub fn new(kind: TokenKind, loc: Location) -> Self {
        Self { kind, loc }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn word(&self) -> Option<WordId> {
        match self.kind {
            TokenKind::Word(id) => Some(id),
            _ => None,
        }
    }

    /// Human-readable spelling for diagnostics
    pub fn describe(&self, words: &Words) -> String {
        match self.kind {
            TokenKind::Keyword(kw) => format!("keyword `{}`", kw),
            TokenKind::Word(id) => format!("word `{}`", words.text(id)),
            TokenKind::Int(n) => format!("integer `{}`", n),
            TokenKind::Bool(b) => format!("boolean `{}`", b),
            TokenKind::Ptr(p) => format!("pointer `{}`", p),
            TokenKind::Str(_) => "string literal".to_string(),
        }
    }
}

/// Token queue consumed by the resolver.
///
/// Peeking never consumes; only `advance`/`next_token` move the cursor.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    eof: Location,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>, eof: Location) -> Self {
        Self {
            tokens,
            pos: 0,
            eof,
        }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Peek at the token at offset (0 = next, 1 = after next, etc.)
    pub fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    pub fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn advance(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.tokens.len());
    }

    /// Remaining tokens, starting at the cursor
    pub fn rest(&self) -> &[Token] {
        &self.tokens[self.pos..]
    }

    /// Location reported for "unexpected end of input"
    pub fn eof_loc(&self) -> &Location {
        &self.eof
    }
}
