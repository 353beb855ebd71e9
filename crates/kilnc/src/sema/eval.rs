//! Compile-time evaluator for declaration initializers
//!
//! Folds a token sequence up to its terminating `end` into a list of typed
//! values. Only literals, stack shuffles, a few arithmetic operators, casts
//! and previously declared constants are understood.

use super::symbols::SymbolTables;
use crate::common::{CompileError, CompileResult, Location, Words};
use crate::lexer::{Keyword, Token, TokenKind};
use crate::types::{TypeTag, Value};

/// Result of folding an initializer
#[derive(Debug, Clone, PartialEq)]
pub struct Folded {
    /// Values left on the evaluation stack, bottom first. A sequence that
    /// pushes nothing yields the single elided marker.
    pub values: Vec<Value>,
    /// Tokens consumed, including the closing `end`
    pub consumed: usize,
}

impl Folded {
    pub fn is_elided(&self) -> bool {
        matches!(self.values.as_slice(), [v] if v.is_elided())
    }

    /// Require exactly `count` real values
    pub fn require(&self, count: usize, what: &str, loc: &Location) -> CompileResult<&[Value]> {
        if self.is_elided() {
            return Err(CompileError::evaluation(
                format!("{} needs a value, but its initializer is empty", what),
                loc.clone(),
            ));
        }
        if self.values.len() != count {
            return Err(CompileError::evaluation(
                format!(
                    "{} expects {} value{}, but its initializer produced {}",
                    what,
                    count,
                    if count == 1 { "" } else { "s" },
                    self.values.len()
                ),
                loc.clone(),
            ));
        }
        Ok(&self.values)
    }

    /// Like [`Folded::require`], but with `allow_elided` an empty
    /// initializer is accepted and reported as `None`.
    pub fn expect(
        &self,
        count: usize,
        allow_elided: bool,
        what: &str,
        loc: &Location,
    ) -> CompileResult<Option<&[Value]>> {
        if allow_elided && self.is_elided() {
            return Ok(None);
        }
        self.require(count, what, loc).map(Some)
    }
}

pub struct Evaluator<'a> {
    symbols: &'a SymbolTables,
    words: &'a Words,
    stack: Vec<(Value, Location)>,
}

impl<'a> Evaluator<'a> {
    pub fn new(symbols: &'a SymbolTables, words: &'a Words) -> Self {
        Self {
            symbols,
            words,
            stack: Vec::new(),
        }
    }

    /// Fold `tokens` up to and including the first `end`
    pub fn fold(mut self, tokens: &[Token], eof: &Location) -> CompileResult<Folded> {
        let words = self.words;
        for (i, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Keyword(Keyword::End) => {
                    let mut values: Vec<Value> = self.stack.into_iter().map(|(v, _)| v).collect();
                    if values.is_empty() {
                        values.push(Value::ELIDED);
                    }
                    let consumed = i + 1;
                    return Ok(Folded { values, consumed });
                }
                TokenKind::Int(n) => self.push(Value::int(n), &token.loc),
                TokenKind::Bool(b) => self.push(Value::bool(b), &token.loc),
                TokenKind::Ptr(p) => self.push(Value::new(p, TypeTag::Ptr), &token.loc),
                TokenKind::Word(id) => self.word(words.text(id), token)?,
                TokenKind::Keyword(_) | TokenKind::Str(_) => {
                    return Err(CompileError::evaluation(
                        format!(
                            "{} cannot appear in a constant expression",
                            token.describe(words)
                        ),
                        token.loc.clone(),
                    ));
                }
            }
        }
        Err(CompileError::evaluation(
            "constant expression is missing its closing `end`",
            eof.clone(),
        ))
    }

    fn push(&mut self, value: Value, loc: &Location) {
        self.stack.push((value, loc.clone()));
    }

    fn pop(&mut self, what: &str, loc: &Location) -> CompileResult<Value> {
        match self.stack.pop() {
            Some((value, _)) => Ok(value),
            None => Err(CompileError::evaluation(
                format!("`{what}` needs more values than the constant expression provides"),
                loc.clone(),
            )),
        }
    }

    /// Pop two operands that must share a type: (below, top)
    fn pop_pair(&mut self, what: &str, loc: &Location) -> CompileResult<(Value, Value)> {
        let b = self.pop(what, loc)?;
        let a = self.pop(what, loc)?;
        if a.ty != b.ty {
            return Err(CompileError::evaluation(
                format!(
                    "`{}` operands differ in type: {} and {}",
                    what,
                    self.symbols.type_name(a.ty, self.words),
                    self.symbols.type_name(b.ty, self.words)
                ),
                loc.clone(),
            ));
        }
        Ok((a, b))
    }

    fn word(&mut self, text: &str, token: &Token) -> CompileResult<()> {
        let loc = &token.loc;
        match text {
            "dup" => {
                let a = self.pop(text, loc)?;
                self.push(a, loc);
                self.push(a, loc);
            }
            "drop" => {
                self.pop(text, loc)?;
            }
            "swap" => {
                let b = self.pop(text, loc)?;
                let a = self.pop(text, loc)?;
                self.push(b, loc);
                self.push(a, loc);
            }
            "over" => {
                let b = self.pop(text, loc)?;
                let a = self.pop(text, loc)?;
                self.push(a, loc);
                self.push(b, loc);
                self.push(a, loc);
            }
            "rot" => {
                let c = self.pop(text, loc)?;
                let b = self.pop(text, loc)?;
                let a = self.pop(text, loc)?;
                self.push(b, loc);
                self.push(c, loc);
                self.push(a, loc);
            }
            "+" | "-" => {
                let (a, b) = self.pop_pair(text, loc)?;
                let value = if text == "+" {
                    a.value.wrapping_add(b.value)
                } else {
                    a.value.wrapping_sub(b.value)
                };
                self.push(Value::new(value, a.ty), loc);
            }
            "*" => {
                let (a, b) = self.pop_pair(text, loc)?;
                if a.ty != TypeTag::Int {
                    return Err(CompileError::evaluation(
                        format!(
                            "`*` expects int operands, found {}",
                            self.symbols.type_name(a.ty, self.words)
                        ),
                        loc.clone(),
                    ));
                }
                self.push(Value::int(a.value.wrapping_mul(b.value)), loc);
            }
            "=" | "!=" => {
                let (a, b) = self.pop_pair(text, loc)?;
                self.push(Value::bool((a.value == b.value) == (text == "=")), loc);
            }
            _ => return self.named(text, token),
        }
        Ok(())
    }

    /// Casts and previously declared constants
    fn named(&mut self, text: &str, token: &Token) -> CompileResult<()> {
        let loc = &token.loc;
        if let Some(target) = text.strip_prefix('#') {
            let Some(ty) = self.symbols.cast_target(target, self.words) else {
                return Err(CompileError::evaluation(
                    format!("unknown cast target `{}`", target),
                    loc.clone(),
                ));
            };
            let value = self.pop(text, loc)?;
            self.push(Value::new(value.value, ty), loc);
            return Ok(());
        }

        let name = token.word();
        if let Some(family) = name.and_then(|n| self.symbols.find_struct_const(n)) {
            for &member in &self.symbols.struct_consts[family].members {
                let c = &self.symbols.consts[member];
                self.stack.push((Value::new(c.value, c.ty), loc.clone()));
            }
            return Ok(());
        }
        if let Some(index) = name.and_then(|n| self.symbols.find_const(n)) {
            let c = &self.symbols.consts[index];
            self.push(Value::new(c.value, c.ty), loc);
            return Ok(());
        }

        Err(CompileError::evaluation(
            format!("`{}` cannot be evaluated at compile time", text),
            loc.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn fold(source: &str) -> CompileResult<Folded> {
        let lexed = Lexer::new(source, "test.kln").tokenize()?;
        let symbols = SymbolTables::new();
        Evaluator::new(&symbols, &lexed.words).fold(&lexed.tokens, &lexed.eof)
    }

    #[test]
    fn test_arithmetic_and_shuffles() {
        let folded = fold("2 3 + dup * 1 swap - end trailing").unwrap();
        assert_eq!(folded.values, vec![Value::int(-24)]);
        assert_eq!(folded.consumed, 9);
    }

    #[test]
    fn test_comparison_and_cast() {
        let folded = fold("4 4 = 7 #ptr 1 2 != end").unwrap();
        assert_eq!(
            folded.values,
            vec![
                Value::bool(true),
                Value::new(7, TypeTag::Ptr),
                Value::bool(true),
            ]
        );
    }

    #[test]
    fn test_empty_initializer_is_elided() {
        let folded = fold("end").unwrap();
        assert!(folded.is_elided());
        assert_eq!(folded.consumed, 1);
        let loc = Location::synthetic("test.kln");
        assert_eq!(folded.expect(1, true, "`x`", &loc).unwrap(), None);
        assert!(folded.expect(1, false, "`x`", &loc).is_err());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(fold("+ end"), Err(CompileError::Evaluation { .. })));
        assert!(matches!(fold("1 true + end"), Err(CompileError::Evaluation { .. })));
        assert!(matches!(fold("1 print end"), Err(CompileError::Evaluation { .. })));
        assert!(matches!(fold("1 2"), Err(CompileError::Evaluation { .. })));
        assert!(matches!(fold("\"s\" end"), Err(CompileError::Evaluation { .. })));
    }

    #[test]
    fn test_count_mismatch() {
        let folded = fold("1 2 end").unwrap();
        let loc = Location::synthetic("test.kln");
        let err = folded.expect(1, true, "constant `X`", &loc).unwrap_err();
        assert!(err.message().contains("produced 2"));
    }
}
