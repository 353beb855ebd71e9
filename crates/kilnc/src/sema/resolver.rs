//! Word resolution
//!
//! A single forward pass over the token stream. Every word is looked up in a
//! fixed order (struct constants, member access, `let` bindings, intrinsics
//! and casts, memory, procedures, constants, variables) and turned into
//! operations. A word that matches nothing starts a declaration, whose shape
//! is decided by the tokens that follow it.

use super::eval::{Evaluator, Folded};
use super::symbols::{Proc, StructConst, StructVar, SymbolTables, TypedWord};
use crate::common::{CompileError, CompileResult, Location, StringTable, WordId, Words};
use crate::ir::{
    BlockKind, Intrinsic, MemRef, MemberAccess, Op, OpBuilder, OpKind, ProcId, Scope, VarRef,
};
use crate::lexer::{Keyword, Lexed, TokenKind, TokenStream};
use crate::types::{Member, StructDef, StructId, TypeTag, Value};
use tracing::{debug, trace};

/// A resolved program: the flat operation list plus every table it indexes
#[derive(Debug)]
pub struct Program {
    pub words: Words,
    pub strings: StringTable,
    pub symbols: SymbolTables,
    pub ops: Vec<Op>,
}

/// Shapes a declaration can take, decided by lookahead
#[derive(Debug, Clone, Copy, PartialEq)]
enum Declaration {
    /// `Name struct member type [default] ... end`
    Struct,
    /// `name type [init] end`
    Var(TypeTag),
    /// `name type :: init end`
    Const(TypeTag),
    /// `name : Struct [init...] end`
    StructVar(StructId),
    /// `name : Struct :: init... end`
    StructConst(StructId),
    /// `name : size end`
    Memory,
    /// `name :: init end` folding to one value; carries the tokens consumed
    Untyped(Value, usize),
    /// `name :: [ins] [-> outs] body end`
    Proc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum VarAccess {
    Load,
    Store,
    Addr,
}

/// What a word resolved to
struct Found {
    ops: Vec<OpKind>,
    /// Where the symbol was declared, for user-defined symbols
    declared: Option<Location>,
}

impl Found {
    fn builtin(kind: OpKind) -> Self {
        Self {
            ops: vec![kind],
            declared: None,
        }
    }

    fn symbol(ops: Vec<OpKind>, declared: &Location) -> Self {
        Self {
            ops,
            declared: Some(declared.clone()),
        }
    }
}

/// Operations that push a folded value as if it were written as a literal
fn push_value(value: Value, ops: &mut Vec<OpKind>) {
    match value.ty {
        TypeTag::Int | TypeTag::Any => ops.push(OpKind::PushInt(value.value)),
        TypeTag::Bool => ops.push(OpKind::PushBool(value.value != 0)),
        TypeTag::Ptr => ops.push(OpKind::PushPtr(value.value)),
        TypeTag::Struct(_) => {
            ops.push(OpKind::PushPtr(value.value));
            ops.push(OpKind::Cast(value.ty));
        }
    }
}

pub struct Resolver {
    tokens: TokenStream,
    words: Words,
    strings: StringTable,
    symbols: SymbolTables,
    builder: OpBuilder,
    current: Option<ProcId>,
}

impl Resolver {
    pub fn new(lexed: Lexed) -> Self {
        let (tokens, words, strings) = lexed.into_stream();
        Self {
            tokens,
            words,
            strings,
            symbols: SymbolTables::new(),
            builder: OpBuilder::new(),
            current: None,
        }
    }

    /// Resolve the whole token stream
    pub fn resolve(mut self) -> CompileResult<Program> {
        while let Some(token) = self.tokens.next_token() {
            match token.kind {
                TokenKind::Int(n) => self.emit_literal(OpKind::PushInt(n), token.loc)?,
                TokenKind::Bool(b) => self.emit_literal(OpKind::PushBool(b), token.loc)?,
                TokenKind::Ptr(p) => self.emit_literal(OpKind::PushPtr(p), token.loc)?,
                TokenKind::Str(s) => self.emit_literal(OpKind::PushStr(s), token.loc)?,
                TokenKind::Keyword(kw) => self.resolve_keyword(kw, token.loc)?,
                TokenKind::Word(id) => self.resolve_word(id, token.loc)?,
            }
        }
        let ops = self.builder.finish(self.tokens.eof_loc().clone())?;
        debug!(
            ops = ops.len(),
            procs = self.symbols.procs.len(),
            structs = self.symbols.structs.len(),
            "resolution finished"
        );
        Ok(Program {
            words: self.words,
            strings: self.strings,
            symbols: self.symbols,
            ops,
        })
    }

    fn require_proc(&self, what: &str, loc: &Location) -> CompileResult<ProcId> {
        self.current.ok_or_else(|| {
            CompileError::nesting(
                format!("{} is only allowed inside a procedure body", what),
                loc.clone(),
            )
        })
    }

    fn emit_literal(&mut self, kind: OpKind, loc: Location) -> CompileResult<()> {
        let what = match kind {
            OpKind::PushStr(_) => "a string literal",
            _ => "a literal",
        };
        self.require_proc(what, &loc)?;
        self.builder.emit(kind, loc);
        Ok(())
    }

    fn resolve_keyword(&mut self, keyword: Keyword, loc: Location) -> CompileResult<()> {
        match keyword {
            Keyword::If => {
                self.require_proc("`if`", &loc)?;
                self.builder.open(BlockKind::If, OpKind::If, loc);
                Ok(())
            }
            Keyword::Else => self.builder.open_else(loc),
            Keyword::End => self.close_block(loc),
            Keyword::Let => self.open_let(loc),
            other => Err(CompileError::parse(format!("unexpected keyword `{}`", other), loc)),
        }
    }

    fn close_block(&mut self, loc: Location) -> CompileResult<()> {
        let block = self.builder.close(loc.clone())?;
        match block.kind {
            BlockKind::If | BlockKind::Else => {}
            BlockKind::Proc(id) => {
                let frame = self.symbols.proc(id).frame_size;
                self.builder.emit(OpKind::ProcEnd { proc: id, frame }, loc);
                self.current = None;
                debug!(
                    proc = self.words.text(self.symbols.proc(id).name),
                    frame,
                    "closed procedure"
                );
            }
            BlockKind::Let(count) => {
                let proc = self.require_proc("`end`", &loc)?;
                let bindings = &mut self.symbols.proc_mut(proc).bindings;
                if bindings.len() < count {
                    return Err(CompileError::nesting(
                        format!(
                            "binding scope closes {} names but only {} are bound",
                            count,
                            bindings.len()
                        ),
                        loc,
                    )
                    .with_note("`let` opened here", block.loc));
                }
                bindings.truncate(bindings.len() - count);
                self.builder.emit(OpKind::Unbind(count), loc);
            }
        }
        Ok(())
    }

    /// `let a b ... :` opens a binding scope over the popped values
    fn open_let(&mut self, loc: Location) -> CompileResult<()> {
        let proc = self.require_proc("`let`", &loc)?;
        let mut names = Vec::new();
        loop {
            let Some(token) = self.tokens.next_token() else {
                return Err(CompileError::parse(
                    "unterminated `let`: expected `:` after the bound names",
                    self.tokens.eof_loc().clone(),
                )
                .with_note("`let` opened here", loc));
            };
            match token.kind {
                TokenKind::Keyword(Keyword::Colon) => break,
                TokenKind::Word(name) => names.push(name),
                _ => {
                    return Err(CompileError::parse(
                        format!(
                            "expected a binding name or `:`, found {}",
                            token.describe(&self.words)
                        ),
                        token.loc,
                    ));
                }
            }
        }
        if names.is_empty() {
            return Err(CompileError::parse("`let` must bind at least one name", loc));
        }

        let count = names.len();
        trace!(count, "opened binding scope");
        self.symbols.proc_mut(proc).bindings.extend(names);
        self.builder.open(BlockKind::Let(count), OpKind::Bind(count), loc);
        Ok(())
    }

    fn resolve_word(&mut self, id: WordId, loc: Location) -> CompileResult<()> {
        let text = self.words.text(id).to_string();
        trace!(word = %text, %loc, "resolving word");

        let Some(found) = self.lookup(id, &text, &loc)? else {
            return self.declare(id, &text, loc);
        };
        if self.current.is_none() {
            let mut err = CompileError::nesting(
                format!("`{}` used outside of a procedure body", text),
                loc,
            );
            if let Some(declared) = found.declared {
                err = err.with_note(format!("`{}` is already declared here", text), declared);
            }
            return Err(err);
        }
        for kind in found.ops {
            self.builder.emit(kind, loc.clone());
        }
        Ok(())
    }

    fn lookup(&mut self, id: WordId, text: &str, loc: &Location) -> CompileResult<Option<Found>> {
        if let Some(index) = self.symbols.find_struct_const(id) {
            let family = &self.symbols.struct_consts[index];
            let mut ops = Vec::new();
            for &member in &family.members {
                let c = &self.symbols.consts[member];
                push_value(Value::new(c.value, c.ty), &mut ops);
            }
            return Ok(Some(Found::symbol(ops, &family.loc)));
        }

        if let Some(rest) = text.strip_prefix('.') {
            let (access, member) = match rest.strip_prefix('*') {
                Some(member) => (MemberAccess::Addr, member),
                None => (MemberAccess::Load, rest),
            };
            if !member.is_empty() {
                let name = self.words.intern(member);
                return Ok(Some(Found::builtin(OpKind::Member {
                    access,
                    name,
                    offset: None,
                })));
            }
        }

        if let Some(proc) = self.current {
            if let Some(index) = self.symbols.proc(proc).binding_index(id) {
                return Ok(Some(Found::builtin(OpKind::PushBinding(index))));
            }
        }

        if let Some(intrinsic) = Intrinsic::from_name(text) {
            return Ok(Some(Found::builtin(OpKind::Intrinsic(intrinsic))));
        }
        if let Some(target) = text.strip_prefix('#') {
            return match self.symbols.cast_target(target, &self.words) {
                Some(ty) => Ok(Some(Found::builtin(OpKind::Cast(ty)))),
                None => Err(CompileError::unresolved(
                    format!("unknown cast target `{}`", target),
                    loc.clone(),
                )),
            };
        }

        if let Some(proc) = self.current {
            if let Some(index) = self.symbols.proc(proc).find_memory(id) {
                let region = &self.symbols.proc(proc).memory[index];
                let mem = MemRef {
                    scope: Scope::Local(proc),
                    index,
                };
                return Ok(Some(Found::symbol(vec![OpKind::PushMem(mem)], &region.loc)));
            }
        }
        if let Some(index) = self.symbols.find_memory(id) {
            let mem = MemRef {
                scope: Scope::Global,
                index,
            };
            let region = &self.symbols.memory[index];
            return Ok(Some(Found::symbol(vec![OpKind::PushMem(mem)], &region.loc)));
        }

        if let Some(proc) = self.symbols.find_proc(id) {
            let declared = &self.symbols.proc(proc).loc;
            return Ok(Some(Found::symbol(vec![OpKind::Call(proc)], declared)));
        }

        if let Some(index) = self.symbols.find_const(id) {
            let c = &self.symbols.consts[index];
            let mut ops = Vec::new();
            push_value(Value::new(c.value, c.ty), &mut ops);
            return Ok(Some(Found::symbol(ops, &c.loc)));
        }

        Ok(self.lookup_variable(text))
    }

    /// Variables, with an optional `!` (store) or `*` (address) prefix.
    /// Locals shadow globals.
    fn lookup_variable(&self, text: &str) -> Option<Found> {
        let (access, name) = if let Some(rest) = text.strip_prefix('!') {
            (VarAccess::Store, rest)
        } else if let Some(rest) = text.strip_prefix('*') {
            (VarAccess::Addr, rest)
        } else {
            (VarAccess::Load, text)
        };
        let name = self.words.get(name)?;

        if let Some(id) = self.current {
            let proc = self.symbols.proc(id);
            if let Some(index) = proc.find_local_struct(name) {
                let var = &proc.local_structs[index];
                return Some(self.struct_var_ops(var, Scope::Local(id), access));
            }
            if let Some(index) = proc.find_local(name) {
                let var = VarRef {
                    scope: Scope::Local(id),
                    index,
                };
                return Some(scalar_var_ops(var, &proc.locals[index], access));
            }
        }
        if let Some(index) = self.symbols.find_global_struct(name) {
            let var = &self.symbols.global_structs[index];
            return Some(self.struct_var_ops(var, Scope::Global, access));
        }
        if let Some(index) = self.symbols.find_global(name) {
            let var = VarRef {
                scope: Scope::Global,
                index,
            };
            return Some(scalar_var_ops(var, &self.symbols.globals[index], access));
        }
        None
    }

    /// A struct variable expands to its members: loads push them in
    /// declaration order, stores pop them in reverse, and the address is
    /// that of the first member, typed as a reference to the struct.
    fn struct_var_ops(&self, var: &StructVar, scope: Scope, access: VarAccess) -> Found {
        let def = &self.symbols.structs[var.def];
        let slots = var
            .members
            .iter()
            .zip(&def.members)
            .map(|(&index, member)| (VarRef { scope, index }, member.ty));
        let ops = match access {
            VarAccess::Load => slots.map(|(var, ty)| OpKind::LoadVar { var, ty }).collect(),
            VarAccess::Store => slots
                .rev()
                .map(|(var, ty)| OpKind::StoreVar { var, ty })
                .collect(),
            VarAccess::Addr => vec![OpKind::VarAddr {
                var: VarRef {
                    scope,
                    index: var.members[0],
                },
                ty: TypeTag::Struct(var.def),
            }],
        };
        Found::symbol(ops, &var.loc)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn is_colon(&self, offset: usize) -> bool {
        self.tokens
            .peek_at(offset)
            .is_some_and(|t| t.is_keyword(Keyword::Colon))
    }

    fn fold(&self, skip: usize) -> CompileResult<Folded> {
        let rest = self.tokens.rest();
        let tokens = rest.get(skip..).unwrap_or(&[]);
        Evaluator::new(&self.symbols, &self.words).fold(tokens, self.tokens.eof_loc())
    }

    fn classify(&self, text: &str, loc: &Location) -> CompileResult<Declaration> {
        let colons = (0..).take_while(|&i| self.is_colon(i)).count();
        let undeclared =
            || CompileError::unresolved(format!("undeclared word `{}`", text), loc.clone());
        match colons {
            0 => match self.tokens.peek().map(|t| t.kind) {
                Some(TokenKind::Keyword(Keyword::Struct)) => Ok(Declaration::Struct),
                Some(TokenKind::Keyword(kw)) => match kw.scalar_type() {
                    Some(ty) if self.is_colon(1) && self.is_colon(2) => Ok(Declaration::Const(ty)),
                    Some(ty) => Ok(Declaration::Var(ty)),
                    None => Err(undeclared()),
                },
                _ => Err(undeclared()),
            },
            1 => {
                let Some(token) = self.tokens.peek_at(1) else {
                    return Err(CompileError::parse(
                        format!("unexpected end of input in the declaration of `{}`", text),
                        self.tokens.eof_loc().clone(),
                    ));
                };
                match token.kind {
                    TokenKind::Word(w) => match self.symbols.find_struct(w) {
                        Some(k) if self.is_colon(2) && self.is_colon(3) => {
                            Ok(Declaration::StructConst(k))
                        }
                        Some(k) => Ok(Declaration::StructVar(k)),
                        None if self.symbols.find_const(w).is_some() => Ok(Declaration::Memory),
                        None => Err(CompileError::parse(
                            format!(
                                "unknown struct type `{}` in the declaration of `{}`",
                                self.words.text(w),
                                text
                            ),
                            token.loc.clone(),
                        )),
                    },
                    TokenKind::Int(_) => Ok(Declaration::Memory),
                    _ => Err(CompileError::parse(
                        format!(
                            "expected a struct type or a memory size after `{} :`, found {}",
                            text,
                            token.describe(&self.words)
                        ),
                        token.loc.clone(),
                    )),
                }
            }
            2 => match self.fold(2) {
                Ok(folded) if folded.values.len() == 1 && !folded.is_elided() => {
                    Ok(Declaration::Untyped(folded.values[0], folded.consumed))
                }
                _ => Ok(Declaration::Proc),
            },
            _ => {
                let extra = self.tokens.peek_at(2).map_or(loc, |t| &t.loc);
                Err(CompileError::parse(
                    format!("unexpected `:` in the declaration of `{}`", text),
                    extra.clone(),
                ))
            }
        }
    }

    fn declare(&mut self, name: WordId, text: &str, loc: Location) -> CompileResult<()> {
        if let Some(k) = self.symbols.find_struct(name) {
            return Err(CompileError::parse(
                format!("struct type `{}` cannot be used as a word", text),
                loc,
            )
            .with_note(
                format!("`{}` declared here", text),
                self.symbols.structs[k].loc.clone(),
            ));
        }

        let shape = self.classify(text, &loc)?;
        debug!(name = text, ?shape, %loc, "declaration");
        match shape {
            Declaration::Struct => self.declare_struct(name, text, loc),
            Declaration::Var(ty) => self.declare_var(name, text, ty, loc),
            Declaration::Const(ty) => self.declare_const(name, text, ty, loc),
            Declaration::StructVar(k) => self.declare_struct_var(name, text, k, loc),
            Declaration::StructConst(k) => self.declare_struct_const(name, text, k, loc),
            Declaration::Memory => self.declare_memory(name, text, loc),
            Declaration::Untyped(value, consumed) => {
                self.tokens.advance(2 + consumed);
                self.symbols.add_const(TypedWord {
                    name,
                    value: value.value,
                    ty: value.ty,
                    loc,
                });
                Ok(())
            }
            Declaration::Proc => self.declare_proc(name, text, loc),
        }
    }

    fn check_value(
        &self,
        value: Value,
        expected: TypeTag,
        what: &str,
        loc: &Location,
    ) -> CompileResult<Value> {
        if value.ty != expected {
            return Err(CompileError::evaluation(
                format!(
                    "{} expects {}, but its initializer has type {}",
                    what,
                    self.symbols.type_name(expected, &self.words),
                    self.symbols.type_name(value.ty, &self.words)
                ),
                loc.clone(),
            ));
        }
        Ok(value)
    }

    fn define_var(&mut self, word: TypedWord) -> VarRef {
        match self.current {
            Some(proc) => VarRef {
                scope: Scope::Local(proc),
                index: self.symbols.proc_mut(proc).add_local(word),
            },
            None => VarRef {
                scope: Scope::Global,
                index: self.symbols.add_global(word),
            },
        }
    }

    fn declare_var(
        &mut self,
        name: WordId,
        text: &str,
        ty: TypeTag,
        loc: Location,
    ) -> CompileResult<()> {
        let folded = self.fold(1)?;
        let what = format!("variable `{}`", text);
        let value = match folded.expect(1, true, &what, &loc)? {
            None => ty.zero_value(),
            Some(values) => self.check_value(values[0], ty, &what, &loc)?,
        };
        self.tokens.advance(1 + folded.consumed);
        self.define_var(TypedWord {
            name,
            value: value.value,
            ty,
            loc,
        });
        Ok(())
    }

    fn declare_const(
        &mut self,
        name: WordId,
        text: &str,
        ty: TypeTag,
        loc: Location,
    ) -> CompileResult<()> {
        let folded = self.fold(3)?;
        let what = format!("constant `{}`", text);
        let value = self.check_value(folded.require(1, &what, &loc)?[0], ty, &what, &loc)?;
        self.tokens.advance(3 + folded.consumed);
        self.symbols.add_const(TypedWord {
            name,
            value: value.value,
            ty,
            loc,
        });
        Ok(())
    }

    /// Initial member values of a struct declaration: explicit values
    /// checked against the member types, or the member defaults
    fn member_values(
        &self,
        k: StructId,
        folded: &Folded,
        allow_elided: bool,
        what: &str,
        loc: &Location,
    ) -> CompileResult<Vec<Value>> {
        let def = &self.symbols.structs[k];
        match folded.expect(def.members.len(), allow_elided, what, loc)? {
            None => Ok(def.members.iter().map(|m| m.default).collect()),
            Some(values) => values
                .iter()
                .zip(&def.members)
                .map(|(&value, member)| {
                    let what = format!("member `{}` of {}", self.words.text(member.name), what);
                    self.check_value(value, member.ty, &what, loc)
                })
                .collect(),
        }
    }

    /// Interned `owner.member` names for every member of struct `k`
    fn member_names(&mut self, owner: &str, k: StructId) -> Vec<WordId> {
        let texts: Vec<String> = self.symbols.structs[k]
            .members
            .iter()
            .map(|m| format!("{}.{}", owner, self.words.text(m.name)))
            .collect();
        texts.iter().map(|t| self.words.intern(t)).collect()
    }

    fn declare_struct_var(
        &mut self,
        name: WordId,
        text: &str,
        k: StructId,
        loc: Location,
    ) -> CompileResult<()> {
        let folded = self.fold(2)?;
        let what = format!("variable `{}`", text);
        let values = self.member_values(k, &folded, true, &what, &loc)?;
        self.tokens.advance(2 + folded.consumed);

        let names = self.member_names(text, k);
        let members: Vec<usize> = names
            .into_iter()
            .zip(&values)
            .zip(self.symbols.structs[k].members.clone())
            .map(|((member_name, value), member)| {
                self.define_var(TypedWord {
                    name: member_name,
                    value: value.value,
                    ty: member.ty,
                    loc: loc.clone(),
                })
                .index
            })
            .collect();

        let var = StructVar {
            name,
            def: k,
            members,
            loc,
        };
        match self.current {
            Some(proc) => self.symbols.proc_mut(proc).local_structs.push(var),
            None => {
                self.symbols.add_global_struct(var);
            }
        }
        Ok(())
    }

    fn declare_struct_const(
        &mut self,
        name: WordId,
        text: &str,
        k: StructId,
        loc: Location,
    ) -> CompileResult<()> {
        let folded = self.fold(4)?;
        let what = format!("constant `{}`", text);
        let values = self.member_values(k, &folded, false, &what, &loc)?;
        self.tokens.advance(4 + folded.consumed);

        let names = self.member_names(text, k);
        let members = names
            .into_iter()
            .zip(values)
            .map(|(member_name, value)| {
                self.symbols.add_const(TypedWord {
                    name: member_name,
                    value: value.value,
                    ty: value.ty,
                    loc: loc.clone(),
                })
            })
            .collect();
        self.symbols.add_struct_const(StructConst {
            name,
            def: k,
            members,
            loc,
        });
        Ok(())
    }

    fn declare_memory(&mut self, name: WordId, text: &str, loc: Location) -> CompileResult<()> {
        let folded = self.fold(1)?;
        let what = format!("memory region `{}`", text);
        let size = folded.require(1, &what, &loc)?[0];
        let size = self.check_value(size, TypeTag::Int, &what, &loc)?;
        let size = match u32::try_from(size.value) {
            Ok(size) if size > 0 => size,
            _ => {
                return Err(CompileError::evaluation(
                    format!("{} must have a positive size, found {}", what, size.value),
                    loc,
                ));
            }
        };
        self.tokens.advance(1 + folded.consumed);
        let region = loc.clone();
        let added = match self.current {
            Some(proc) => self.symbols.proc_mut(proc).add_memory(name, size, region),
            None => self.symbols.add_memory(name, size, region),
        };
        if added.is_none() {
            let scope = if self.current.is_some() {
                "procedure frame"
            } else {
                "global memory"
            };
            return Err(CompileError::evaluation(
                format!("{} of {} bytes does not fit in the {}", what, size, scope),
                loc,
            ));
        }
        Ok(())
    }

    fn declare_struct(&mut self, name: WordId, text: &str, loc: Location) -> CompileResult<()> {
        if let Some(proc) = self.current {
            let outer = self.symbols.proc(proc);
            return Err(CompileError::nesting(
                format!("struct `{}` must be declared at top level", text),
                loc,
            )
            .with_note(
                format!("inside procedure `{}`", self.words.text(outer.name)),
                outer.loc.clone(),
            ));
        }
        self.tokens.advance(1);

        let mut members: Vec<Member> = Vec::new();
        loop {
            let Some(token) = self.tokens.next_token() else {
                return Err(CompileError::parse(
                    format!("unterminated struct `{}`: expected `end`", text),
                    self.tokens.eof_loc().clone(),
                )
                .with_note(format!("`{}` declared here", text), loc));
            };
            let member = match token.kind {
                TokenKind::Keyword(Keyword::End) => break,
                TokenKind::Word(member) => member,
                _ => {
                    return Err(CompileError::parse(
                        format!(
                            "expected a member name or `end` in struct `{}`, found {}",
                            text,
                            token.describe(&self.words)
                        ),
                        token.loc,
                    ));
                }
            };
            if members.iter().any(|m| m.name == member) {
                return Err(CompileError::parse(
                    format!(
                        "duplicate member `{}` in struct `{}`",
                        self.words.text(member),
                        text
                    ),
                    token.loc,
                ));
            }
            let ty = self.member_type(text)?;
            let default = self.member_default(ty, member)?;
            members.push(Member {
                name: member,
                ty,
                default,
            });
        }

        if members.is_empty() {
            return Err(CompileError::parse(format!("struct `{}` has no members", text), loc));
        }
        let id = self.symbols.add_struct(StructDef { name, members, loc });
        debug!(name = text, id, "declared struct");
        Ok(())
    }

    /// Member types are scalars or previously declared structs
    fn member_type(&mut self, owner: &str) -> CompileResult<TypeTag> {
        let Some(token) = self.tokens.next_token() else {
            return Err(CompileError::parse(
                format!("unexpected end of input in struct `{owner}`: expected a member type"),
                self.tokens.eof_loc().clone(),
            ));
        };
        let ty = match token.kind {
            TokenKind::Keyword(kw) => kw.scalar_type(),
            TokenKind::Word(w) => self.symbols.find_struct(w).map(TypeTag::Struct),
            _ => None,
        };
        ty.ok_or_else(|| {
            CompileError::parse(
                format!(
                    "expected a member type in struct `{}`, found {}; \
                     members may only use scalar types or previously declared structs",
                    owner,
                    token.describe(&self.words)
                ),
                token.loc.clone(),
            )
        })
    }

    /// An optional literal default after the member type
    fn member_default(&mut self, ty: TypeTag, member: WordId) -> CompileResult<Value> {
        let Some(token) = self.tokens.peek() else {
            return Ok(ty.zero_value());
        };
        let value = match token.kind {
            TokenKind::Int(n) => Value::int(n),
            TokenKind::Bool(b) => Value::bool(b),
            TokenKind::Ptr(p) => Value::new(p, TypeTag::Ptr),
            _ => return Ok(ty.zero_value()),
        };
        let fits = value.ty == ty || (value.ty == TypeTag::Ptr && ty.is_struct());
        if !fits {
            return Err(CompileError::type_mismatch(
                format!(
                    "default for member `{}` has type {}, expected {}",
                    self.words.text(member),
                    value.ty,
                    self.symbols.type_name(ty, &self.words)
                ),
                token.loc.clone(),
            ));
        }
        self.tokens.advance(1);
        Ok(Value::new(value.value, ty))
    }

    fn declare_proc(&mut self, name: WordId, text: &str, loc: Location) -> CompileResult<()> {
        if let Some(outer) = self.current {
            let outer = self.symbols.proc(outer);
            return Err(CompileError::nesting(
                format!(
                    "procedure `{}` cannot be declared inside procedure `{}`",
                    text,
                    self.words.text(outer.name)
                ),
                loc,
            )
            .with_note(
                format!("`{}` declared here", self.words.text(outer.name)),
                outer.loc.clone(),
            ));
        }
        self.tokens.advance(2);

        let ins = self.signature_types();
        let arrow = self
            .tokens
            .peek()
            .is_some_and(|t| t.is_keyword(Keyword::Arrow));
        let outs = if arrow {
            self.tokens.advance(1);
            self.signature_types()
        } else {
            Vec::new()
        };

        debug!(
            name = text,
            ins = %self.symbols.shape(&ins, &self.words),
            outs = %self.symbols.shape(&outs, &self.words),
            "declared procedure"
        );
        let id = self.symbols.add_proc(Proc::new(name, ins, outs, loc.clone()));
        self.builder.open(BlockKind::Proc(id), OpKind::ProcBegin(id), loc);
        self.current = Some(id);
        Ok(())
    }

    fn signature_types(&mut self) -> Vec<TypeTag> {
        let mut types = Vec::new();
        while let Some(token) = self.tokens.peek() {
            let ty = match token.kind {
                TokenKind::Keyword(kw) => kw.scalar_type(),
                TokenKind::Word(w) => self.symbols.find_struct(w).map(TypeTag::Struct),
                _ => None,
            };
            let Some(ty) = ty else { break };
            types.push(ty);
            self.tokens.advance(1);
        }
        types
    }
}

fn scalar_var_ops(var: VarRef, word: &TypedWord, access: VarAccess) -> Found {
    let kind = match access {
        VarAccess::Load => OpKind::LoadVar { var, ty: word.ty },
        VarAccess::Store => OpKind::StoreVar { var, ty: word.ty },
        VarAccess::Addr => OpKind::VarAddr {
            var,
            ty: TypeTag::Ptr,
        },
    };
    Found::symbol(vec![kind], &word.loc)
}

/// Lex and resolve a source text
pub fn resolve_source(source: &str, file: &str) -> CompileResult<Program> {
    let lexed = crate::lexer::Lexer::new(source, file).tokenize()?;
    Resolver::new(lexed).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<OpKind> {
        resolve_source(source, "test.kln")
            .unwrap()
            .ops
            .into_iter()
            .map(|op| op.kind)
            .collect()
    }

    fn error(source: &str) -> CompileError {
        resolve_source(source, "test.kln").unwrap_err()
    }

    #[test]
    fn test_procedure_with_literals_and_intrinsics() {
        assert_eq!(
            kinds("main :: 1 2 + print end"),
            vec![
                OpKind::ProcBegin(0),
                OpKind::PushInt(1),
                OpKind::PushInt(2),
                OpKind::Intrinsic(Intrinsic::Add),
                OpKind::Intrinsic(Intrinsic::Print),
                OpKind::ProcEnd { proc: 0, frame: 0 },
            ]
        );
    }

    #[test]
    fn test_signature_parsing() {
        let program = resolve_source("add :: int int -> int + end", "test.kln").unwrap();
        let proc = program.symbols.proc(0);
        assert_eq!(proc.ins, vec![TypeTag::Int, TypeTag::Int]);
        assert_eq!(proc.outs, vec![TypeTag::Int]);
    }

    #[test]
    fn test_constants_become_literals() {
        let ops = kinds("N :: 3 4 * end  FLAG bool :: 1 1 = end  main :: N FLAG end");
        assert_eq!(
            ops[1..3].to_vec(),
            vec![OpKind::PushInt(12), OpKind::PushBool(true)]
        );
    }

    #[test]
    fn test_recursion_resolves_to_call() {
        let ops = kinds("loop :: loop end");
        assert_eq!(ops[1], OpKind::Call(0));
    }

    #[test]
    fn test_variable_prefixes() {
        let ops = kinds("count int end  main :: count !count *count end");
        let var = VarRef {
            scope: Scope::Global,
            index: 0,
        };
        let (int, ptr) = (TypeTag::Int, TypeTag::Ptr);
        assert_eq!(
            ops[1..4].to_vec(),
            vec![
                OpKind::LoadVar { var, ty: int },
                OpKind::StoreVar { var, ty: int },
                OpKind::VarAddr { var, ty: ptr },
            ]
        );
    }

    #[test]
    fn test_local_memory_frame() {
        let source = "main :: buf : 6 end  other : 4 end  buf end";
        let program = resolve_source(source, "test.kln").unwrap();
        assert_eq!(program.symbols.proc(0).frame_size, 12);
        assert_eq!(
            program.ops.last().map(|op| op.kind.clone()),
            Some(OpKind::ProcEnd { proc: 0, frame: 12 })
        );
        let buf = MemRef {
            scope: Scope::Local(0),
            index: 0,
        };
        assert_eq!(program.ops[1].kind, OpKind::PushMem(buf));
    }

    #[test]
    fn test_let_bindings_shadow_and_unbind() {
        let ops = kinds("main :: 1 2 let a b : a b end end");
        assert_eq!(
            ops[3..7].to_vec(),
            vec![
                OpKind::Bind(2),
                OpKind::PushBinding(1),
                OpKind::PushBinding(0),
                OpKind::Unbind(2),
            ]
        );
    }

    #[test]
    fn test_member_access_words() {
        let program = resolve_source("main :: .x .*y end", "test.kln").unwrap();
        let x = program.words.get("x").unwrap();
        assert_eq!(
            program.ops[1].kind,
            OpKind::Member {
                access: MemberAccess::Load,
                name: x,
                offset: None,
            }
        );
        assert!(matches!(
            program.ops[2].kind,
            OpKind::Member {
                access: MemberAccess::Addr,
                ..
            }
        ));
    }

    #[test]
    fn test_struct_declarations() {
        let source = "Point struct x int 3 y int end\n\
                      origin : Point end\n\
                      UNIT : Point :: 1 1 end";
        let program = resolve_source(source, "test.kln").unwrap();
        let symbols = &program.symbols;
        assert_eq!(symbols.structs[0].members[0].default, Value::int(3));
        assert_eq!(symbols.globals.len(), 2);
        assert_eq!(symbols.globals[0].value, 3);
        assert_eq!(program.words.text(symbols.globals[1].name), "origin.y");
        assert_eq!(symbols.struct_consts[0].members.len(), 2);
    }

    #[test]
    fn test_undeclared_word() {
        let err = error("main :: frobnicate end");
        assert!(matches!(err, CompileError::UnresolvedWord { .. }));
        assert!(err.message().contains("frobnicate"));
    }

    #[test]
    fn test_nesting_errors() {
        assert!(matches!(error("1 2 +"), CompileError::Nesting { .. }));
        assert!(matches!(
            error("outer :: inner :: end end"),
            CompileError::Nesting { .. }
        ));
        assert!(matches!(
            error("main :: S struct a int end end"),
            CompileError::Nesting { .. }
        ));
        assert!(matches!(error("let a : end"), CompileError::Nesting { .. }));
    }

    #[test]
    fn test_redeclaration_points_at_original() {
        let err = error("N :: 1 end\nN :: 2 end");
        assert!(matches!(err, CompileError::Nesting { .. }));
        assert_eq!(err.notes()[0].loc.line, 1);
    }

    #[test]
    fn test_struct_cannot_reference_itself() {
        let err = error("Node struct next Node end");
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn test_struct_redeclaration_is_parse_error() {
        let err = error("P struct x int end\nP struct y int end");
        assert!(matches!(err, CompileError::Parse { .. }));
        assert_eq!(err.notes().len(), 1);
        assert_eq!(err.notes()[0].loc.line, 1);
    }

    #[test]
    fn test_memory_larger_than_address_space() {
        let err = error("buf : 4294967295 end");
        assert!(matches!(err, CompileError::Evaluation { .. }));
        assert!(err.message().contains("global memory"));

        let err = error("a : 3000000000 end\nb : 3000000000 end");
        assert!(matches!(err, CompileError::Evaluation { .. }));
        assert_eq!(err.location().map(|loc| loc.line), Some(2));

        let err = error("main :: a : 3000000000 end b : 3000000000 end end");
        assert!(matches!(err, CompileError::Evaluation { .. }));
        assert!(err.message().contains("procedure frame"));
    }
}
