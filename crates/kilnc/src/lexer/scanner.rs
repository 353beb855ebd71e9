//! Kiln lexer implementation using logos

use super::token::{Keyword, RawToken, Token, TokenKind, TokenStream};
use crate::common::{CompileError, CompileResult, LineIndex, Location, Span, StringTable, Words};
use logos::Logos;

/// Output of a full scan: the token stream plus the arenas it indexes into
#[derive(Debug)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub words: Words,
    pub strings: StringTable,
    pub eof: Location,
}

impl Lexed {
    pub fn into_stream(self) -> (TokenStream, Words, StringTable) {
        (TokenStream::new(self.tokens, self.eof), self.words, self.strings)
    }
}

/// Lexer for Kiln source code
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, RawToken>,
    lines: LineIndex,
    words: Words,
    strings: StringTable,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'a str, file: &str) -> Self {
        Self {
            inner: RawToken::lexer(source),
            lines: LineIndex::new(file, source),
            words: Words::new(),
            strings: StringTable::new(),
        }
    }

    /// Scan one token, interning words and strings on the way
    fn scan_token(&mut self) -> CompileResult<Option<Token>> {
        let Some(raw) = self.inner.next() else {
            return Ok(None);
        };
        let range = self.inner.span();
        let loc = self.lines.locate(Span::new(range.start, range.end));

        let kind = match raw {
            Ok(RawToken::If) => TokenKind::Keyword(Keyword::If),
            Ok(RawToken::Else) => TokenKind::Keyword(Keyword::Else),
            Ok(RawToken::End) => TokenKind::Keyword(Keyword::End),
            Ok(RawToken::Let) => TokenKind::Keyword(Keyword::Let),
            Ok(RawToken::Struct) => TokenKind::Keyword(Keyword::Struct),
            Ok(RawToken::Int) => TokenKind::Keyword(Keyword::Int),
            Ok(RawToken::Bool) => TokenKind::Keyword(Keyword::Bool),
            Ok(RawToken::Ptr) => TokenKind::Keyword(Keyword::Ptr),
            Ok(RawToken::Arrow) => TokenKind::Keyword(Keyword::Arrow),
            Ok(RawToken::Colon) => TokenKind::Keyword(Keyword::Colon),
            Ok(RawToken::True) => TokenKind::Bool(true),
            Ok(RawToken::False) => TokenKind::Bool(false),
            Ok(RawToken::Null) => TokenKind::Ptr(0),
            Ok(RawToken::HexLiteral(n)) | Ok(RawToken::IntLiteral(n)) => TokenKind::Int(n),
            Ok(RawToken::StringLiteral(text)) => TokenKind::Str(self.strings.intern(text)),
            Ok(RawToken::Word(text)) => TokenKind::Word(self.words.intern(&text)),
            Err(()) => {
                return Err(CompileError::lexer(
                    format!("unexpected input `{}`", self.inner.slice()),
                    loc,
                ));
            }
        };
        Ok(Some(Token::new(kind, loc)))
    }

    /// Tokenize the entire source
    pub fn tokenize(mut self) -> CompileResult<Lexed> {
        let mut tokens = Vec::new();
        while let Some(token) = self.scan_token()? {
            tokens.push(token);
        }
        let len = self.inner.source().len();
        let eof = self.lines.locate(Span::new(len, len));
        Ok(Lexed {
            tokens,
            words: self.words,
            strings: self.strings,
            eof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> (Vec<TokenKind>, Lexed) {
        let lexed = Lexer::new(source, "test.kln").tokenize().unwrap();
        (lexed.tokens.iter().map(|t| t.kind).collect(), lexed)
    }

    #[test]
    fn test_keywords() {
        let (kinds, _) = kinds("if else end let struct int bool ptr -> :");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::If),
                TokenKind::Keyword(Keyword::Else),
                TokenKind::Keyword(Keyword::End),
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Keyword(Keyword::Struct),
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Keyword(Keyword::Bool),
                TokenKind::Keyword(Keyword::Ptr),
                TokenKind::Keyword(Keyword::Arrow),
                TokenKind::Keyword(Keyword::Colon),
            ]
        );
    }

    #[test]
    fn test_double_colon_is_two_colons() {
        let (kinds, _) = kinds("main ::");
        assert_eq!(kinds.len(), 3);
        assert!(matches!(kinds[1], TokenKind::Keyword(Keyword::Colon)));
        assert!(matches!(kinds[2], TokenKind::Keyword(Keyword::Colon)));
    }

    #[test]
    fn test_literals() {
        let (kinds, _) = kinds("42 -7 0x1F true false null");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int(42),
                TokenKind::Int(-7),
                TokenKind::Int(31),
                TokenKind::Bool(true),
                TokenKind::Bool(false),
                TokenKind::Ptr(0),
            ]
        );
    }

    #[test]
    fn test_words_with_sigils() {
        let (kinds, lexed) = kinds("!p *p p.x .x .*y #*Point - + iffy");
        let texts: Vec<&str> = kinds
            .iter()
            .map(|k| match k {
                TokenKind::Word(id) => lexed.words.text(*id),
                other => panic!("expected word, got {:?}", other),
            })
            .collect();
        let expected = [
            "!p", "*p", "p.x", ".x", ".*y", "#*Point", "-", "+", "iffy",
        ];
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_string_literals_are_interned() {
        let (kinds, lexed) = kinds(r#""hi\n" "hi\n""#);
        assert_eq!(kinds[0], kinds[1]);
        match kinds[0] {
            TokenKind::Str(id) => {
                assert_eq!(lexed.strings.get(id).text, "hi\n");
                assert_eq!(lexed.strings.get(id).len, 3);
            }
            ref other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_comments_and_locations() {
        let lexed = Lexer::new("// header\n  dup // trailing\nend", "test.kln")
            .tokenize()
            .unwrap();
        assert_eq!(lexed.tokens.len(), 2);
        assert_eq!((lexed.tokens[0].loc.line, lexed.tokens[0].loc.col), (2, 3));
        assert!(lexed.tokens[1].is_keyword(Keyword::End));
        assert_eq!(lexed.eof.line, 3);
    }

    #[test]
    fn test_bad_escape_is_lexer_error() {
        let err = Lexer::new(r#""\q""#, "test.kln").tokenize().unwrap_err();
        assert!(matches!(err, CompileError::Lexer { .. }));
        assert!(err.to_string().starts_with("test.kln:1:1: [ERROR]"));
    }
}
