//! Identifier and string-literal arenas
//!
//! Word text is interned once by the lexer and referenced everywhere else by
//! `WordId`. String literal contents live in a separate append-only table
//! because the code generator needs their byte length as well as their text.

use std::collections::HashMap;
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Index of an interned word
pub type WordId = DefaultSymbol;

/// Interned word text
#[derive(Debug, Default)]
pub struct Words {
    interner: DefaultStringInterner,
}

impl Words {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> WordId {
        self.interner.get_or_intern(text)
    }

    /// Look up a word without interning it
    pub fn get(&self, text: &str) -> Option<WordId> {
        self.interner.get(text)
    }

    pub fn text(&self, id: WordId) -> &str {
        self.interner.resolve(id).unwrap_or("<unknown>")
    }
}

/// Index of an interned string literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub u32);

/// A string literal as it will be laid out in the data segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrLit {
    pub text: String,
    pub len: usize,
}

/// Append-only table of string literals, deduplicated by content
#[derive(Debug, Default)]
pub struct StringTable {
    entries: Vec<StrLit>,
    index: HashMap<String, StrId>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: String) -> StrId {
        if let Some(id) = self.index.get(&text) {
            return *id;
        }
        let id = StrId(self.entries.len() as u32);
        self.index.insert(text.clone(), id);
        self.entries.push(StrLit {
            len: text.len(),
            text,
        });
        id
    }

    pub fn get(&self, id: StrId) -> &StrLit {
        &self.entries[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StrId, &StrLit)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, lit)| (StrId(i as u32), lit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_intern_once() {
        let mut words = Words::new();
        let a = words.intern("dup");
        let b = words.intern("dup");
        assert_eq!(a, b);
        assert_eq!(words.text(a), "dup");
        assert_eq!(words.get("swap"), None);
    }

    #[test]
    fn test_string_table_dedups_and_measures_bytes() {
        let mut strings = StringTable::new();
        let hello = strings.intern("héllo".to_string());
        let again = strings.intern("héllo".to_string());
        assert_eq!(hello, again);
        assert_eq!(strings.len(), 1);
        assert_eq!(strings.get(hello).len, 6);
    }
}
