//! Stack-effect type checker
//!
//! One left-to-right pass over the resolved operations. Every operation is
//! checked against the abstract stack, struct member offsets are filled in
//! once the receiver type is known, and the `(ins, outs)` contract of every
//! `if`/`else` block is inferred from how far each branch dips below and
//! rises above its entry height.

use super::signature::{Push, Signature, Slot};
use super::stack::{AbstractStack, Frame};
use crate::common::{CompileError, CompileResult, Location, WordId, Words};
use crate::ir::{Intrinsic, MemberAccess, Op, OpKind, ProcId};
use crate::sema::{Program, SymbolTables};
use crate::types::TypeTag;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Inferred stack effect of a block: values consumed from below the entry
/// height, and values left in their place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContract {
    pub ins: usize,
    pub outs: usize,
}

/// Contracts keyed by the index of the opening operation (`if` or
/// procedure begin)
pub type ContractTable = BTreeMap<usize, BlockContract>;

/// State of the `if` branch, captured at `else`
#[derive(Debug, Clone)]
struct BranchEnd {
    types: Vec<TypeTag>,
    stack_count: i64,
    min_count: i64,
    loc: Location,
}

#[derive(Debug, Clone)]
struct OpenBranch {
    opener: usize,
    loc: Location,
    /// Stack and counters just after the condition was popped
    entry: AbstractStack,
    bindings: Vec<Frame>,
    then_end: Option<BranchEnd>,
}

pub struct TypeChecker<'a> {
    symbols: &'a SymbolTables,
    words: &'a Words,
    stack: AbstractStack,
    bindings: Vec<Frame>,
    current: Option<ProcId>,
    branches: Vec<OpenBranch>,
    contracts: ContractTable,
}

impl<'a> TypeChecker<'a> {
    pub fn new(symbols: &'a SymbolTables, words: &'a Words) -> Self {
        Self {
            symbols,
            words,
            stack: AbstractStack::new(),
            bindings: Vec::new(),
            current: None,
            branches: Vec::new(),
            contracts: ContractTable::new(),
        }
    }

    /// Check every operation, annotating member offsets in place
    pub fn check(mut self, ops: &mut [Op]) -> CompileResult<ContractTable> {
        for (index, op) in ops.iter_mut().enumerate() {
            self.check_op(index, op)?;
        }
        if let Some(id) = self.current {
            let proc = self.symbols.proc(id);
            return Err(CompileError::structural(
                format!("procedure `{}` is never closed", self.words.text(proc.name)),
                proc.loc.clone(),
            ));
        }
        Ok(self.contracts)
    }

    fn type_name(&self, ty: TypeTag) -> String {
        self.symbols.type_name(ty, self.words)
    }

    fn shape(&self, types: &[TypeTag]) -> String {
        self.symbols.shape(types, self.words)
    }

    fn check_op(&mut self, index: usize, op: &mut Op) -> CompileResult<()> {
        let loc = op.loc.clone();
        trace!(index, op = %op.kind, depth = self.stack.len(), "checking");
        if self.current.is_none() && !matches!(op.kind, OpKind::ProcBegin(_)) {
            return Err(CompileError::nesting(
                format!("operation `{}` outside of a procedure body", op.kind),
                loc,
            ));
        }

        match &mut op.kind {
            OpKind::PushInt(_) => self.stack.push(TypeTag::Int, loc),
            OpKind::PushBool(_) => self.stack.push(TypeTag::Bool, loc),
            OpKind::PushPtr(_) | OpKind::PushMem(_) => self.stack.push(TypeTag::Ptr, loc),
            OpKind::PushStr(_) => {
                self.stack.push(TypeTag::Int, loc.clone());
                self.stack.push(TypeTag::Ptr, loc);
            }
            OpKind::Intrinsic(intrinsic) => self.intrinsic(*intrinsic, &loc)?,
            OpKind::Cast(target) => {
                let target = *target;
                self.pop_n(1, &format!("cast to {}", self.type_name(target)), &loc)?;
                self.stack.push(target, loc);
            }
            OpKind::Call(proc) => self.call(*proc, &loc)?,
            OpKind::PushBinding(depth) => {
                let slot = self.bindings.len().checked_sub(*depth + 1);
                let Some(frame) = slot.map(|i| &self.bindings[i]) else {
                    return Err(CompileError::nesting(
                        format!("binding #{} is not in scope", depth),
                        loc,
                    ));
                };
                self.stack.push(frame.ty, loc);
            }
            OpKind::LoadVar { ty, .. } | OpKind::VarAddr { ty, .. } => self.stack.push(*ty, loc),
            OpKind::StoreVar { var, ty } => {
                let what = format!(
                    "store to `{}`",
                    self.words.text(self.symbols.var(*var).name)
                );
                let frames = self.pop_n(1, &what, &loc)?;
                self.expect_type(&frames[0], *ty, &what, &loc)?;
            }
            OpKind::Member {
                access,
                name,
                offset,
            } => {
                let (ty, at) = self.member(*access, *name, &loc)?;
                *offset = Some(at);
                self.stack.push(ty, loc);
            }
            OpKind::If => self.open_if(index, loc)?,
            OpKind::Else { opener } => self.enter_else(*opener, loc)?,
            OpKind::EndIf { opener } => self.close_if(*opener, loc)?,
            OpKind::EndElse { opener } => self.close_else(*opener, loc)?,
            OpKind::Bind(count) => {
                let frames = self.pop_n(*count, "`let`", &loc)?;
                self.bindings.extend(frames);
            }
            OpKind::Unbind(count) => {
                if self.bindings.len() < *count {
                    return Err(CompileError::nesting(
                        format!(
                            "binding scope closes {} names but only {} are bound",
                            count,
                            self.bindings.len()
                        ),
                        loc,
                    ));
                }
                self.bindings.truncate(self.bindings.len() - *count);
            }
            OpKind::ProcBegin(proc) => self.begin_proc(index, *proc, &loc)?,
            OpKind::ProcEnd { proc, .. } => self.end_proc(*proc, &loc)?,
        }
        Ok(())
    }

    /// Pop `count` frames, returned bottom first
    fn pop_n(&mut self, count: usize, what: &str, loc: &Location) -> CompileResult<Vec<Frame>> {
        if self.stack.len() < count {
            return Err(CompileError::arity(
                format!(
                    "{} needs {} value{} on the stack, found {}",
                    what,
                    count,
                    if count == 1 { "" } else { "s" },
                    self.stack.len()
                ),
                loc.clone(),
            ));
        }
        let mut frames: Vec<Frame> = (0..count).filter_map(|_| self.stack.pop()).collect();
        frames.reverse();
        Ok(frames)
    }

    fn expect_type(
        &self,
        frame: &Frame,
        expected: TypeTag,
        what: &str,
        loc: &Location,
    ) -> CompileResult<()> {
        if frame.ty == expected {
            return Ok(());
        }
        Err(CompileError::type_mismatch(
            format!(
                "{} expects {}, found {}",
                what,
                self.type_name(expected),
                self.type_name(frame.ty)
            ),
            loc.clone(),
        )
        .with_note("value pushed here", frame.loc.clone()))
    }

    fn intrinsic(&mut self, intrinsic: Intrinsic, loc: &Location) -> CompileResult<()> {
        let signature = Signature::of(intrinsic);
        let what = format!("`{}`", intrinsic.name());
        let inputs = self.pop_n(signature.ins.len(), &what, loc)?;

        let mut same: Option<&Frame> = None;
        for (slot, frame) in signature.ins.iter().zip(&inputs) {
            match slot {
                Slot::Any => {}
                Slot::Exact(ty) => self.expect_type(frame, *ty, &what, loc)?,
                Slot::Same => match same {
                    None => same = Some(frame),
                    Some(first) if first.ty != frame.ty => {
                        return Err(CompileError::type_mismatch(
                            format!(
                                "{} operands must share a type, found {} and {}",
                                what,
                                self.type_name(first.ty),
                                self.type_name(frame.ty)
                            ),
                            loc.clone(),
                        )
                        .with_note(
                            format!("{} pushed here", self.type_name(first.ty)),
                            first.loc.clone(),
                        )
                        .with_note(
                            format!("{} pushed here", self.type_name(frame.ty)),
                            frame.loc.clone(),
                        ));
                    }
                    Some(_) => {}
                },
            }
        }

        for push in signature.outs {
            match push {
                Push::Exact(ty) => self.stack.push(*ty, loc.clone()),
                Push::Same => {
                    let ty = same.map_or(TypeTag::Any, |f| f.ty);
                    self.stack.push(ty, loc.clone());
                }
                Push::Input(i) => {
                    let frame = &inputs[*i];
                    self.stack.push(frame.ty, frame.loc.clone());
                }
            }
        }
        Ok(())
    }

    fn call(&mut self, id: ProcId, loc: &Location) -> CompileResult<()> {
        let (symbols, words) = (self.symbols, self.words);
        let proc = symbols.proc(id);
        let name = words.text(proc.name);

        if self.stack.len() < proc.ins.len() {
            return Err(CompileError::arity(
                format!(
                    "call to `{}` needs {} argument{}, found {} on the stack",
                    name,
                    proc.ins.len(),
                    if proc.ins.len() == 1 { "" } else { "s" },
                    self.stack.len()
                ),
                loc.clone(),
            )
            .with_note(format!("`{}` declared here", name), proc.loc.clone()));
        }
        // Inputs are declared bottom first; the last one is on top
        for (depth, &want) in proc.ins.iter().rev().enumerate() {
            let Some(frame) = self.stack.peek(depth) else { break };
            if frame.ty != want {
                return Err(CompileError::type_mismatch(
                    format!(
                        "argument {} of `{}` expects {}, found {}",
                        proc.ins.len() - depth,
                        name,
                        self.type_name(want),
                        self.type_name(frame.ty)
                    ),
                    loc.clone(),
                )
                .with_note("value pushed here", frame.loc.clone())
                .with_note(format!("`{}` declared here", name), proc.loc.clone()));
            }
        }

        self.pop_n(proc.ins.len(), &format!("call to `{}`", name), loc)?;
        for &ty in &proc.outs {
            self.stack.push(ty, loc.clone());
        }
        Ok(())
    }

    fn member(
        &mut self,
        access: MemberAccess,
        name: WordId,
        loc: &Location,
    ) -> CompileResult<(TypeTag, u32)> {
        let (symbols, words) = (self.symbols, self.words);
        let member = words.text(name);
        let what = match access {
            MemberAccess::Load => format!("`.{}`", member),
            MemberAccess::Addr => format!("`.*{}`", member),
        };
        let frames = self.pop_n(1, &what, loc)?;
        let receiver = &frames[0];
        let TypeTag::Struct(k) = receiver.ty else {
            return Err(CompileError::type_mismatch(
                format!(
                    "{} expects a struct reference, found {}",
                    what,
                    self.type_name(receiver.ty)
                ),
                loc.clone(),
            )
            .with_note("value pushed here", receiver.loc.clone()));
        };

        let def = &symbols.structs[k];
        let struct_name = words.text(def.name);
        let Some(index) = def.member_index(name) else {
            return Err(CompileError::unknown_member(
                format!("struct `{}` has no member `{}`", struct_name, member),
                loc.clone(),
            )
            .with_note(format!("`{}` declared here", struct_name), def.loc.clone()));
        };
        let ty = match access {
            MemberAccess::Load => def.members[index].ty,
            MemberAccess::Addr => TypeTag::Ptr,
        };
        Ok((ty, def.offset_of(index)))
    }

    fn record(&mut self, opener: usize, ins: usize, outs: usize) {
        debug!(opener, ins, outs, "inferred block contract");
        self.contracts.insert(opener, BlockContract { ins, outs });
    }

    fn open_if(&mut self, index: usize, loc: Location) -> CompileResult<()> {
        let frames = self.pop_n(1, "`if`", &loc)?;
        self.expect_type(&frames[0], TypeTag::Bool, "`if` condition", &loc)?;
        self.branches.push(OpenBranch {
            opener: index,
            loc,
            entry: self.stack.clone(),
            bindings: self.bindings.clone(),
            then_end: None,
        });
        self.stack.reset_counters();
        Ok(())
    }

    fn enter_else(&mut self, opener: usize, loc: Location) -> CompileResult<()> {
        let Some(branch) = self.branches.last_mut() else {
            return Err(CompileError::structural("`else` without a matching `if`", loc));
        };
        if branch.opener != opener || branch.then_end.is_some() {
            return Err(CompileError::structural("`else` does not match the innermost `if`", loc)
                .with_note("innermost `if` opened here", branch.loc.clone()));
        }
        branch.then_end = Some(BranchEnd {
            types: self.stack.types(),
            stack_count: self.stack.stack_count(),
            min_count: self.stack.min_count(),
            loc,
        });
        self.stack = branch.entry.clone();
        self.stack.reset_counters();
        self.bindings = branch.bindings.clone();
        Ok(())
    }

    fn pop_branch(&mut self, opener: usize, loc: &Location) -> CompileResult<OpenBranch> {
        match self.branches.pop() {
            Some(branch) if branch.opener == opener => Ok(branch),
            Some(branch) => Err(CompileError::structural(
                "`end` does not match the innermost `if`",
                loc.clone(),
            )
            .with_note("innermost `if` opened here", branch.loc)),
            None => Err(CompileError::structural(
                "`end` without a matching `if`",
                loc.clone(),
            )),
        }
    }

    fn close_if(&mut self, opener: usize, loc: Location) -> CompileResult<()> {
        let branch = self.pop_branch(opener, &loc)?;
        if branch.then_end.is_some() {
            return Err(CompileError::structural("`if` with an `else` closed as a bare `if`", loc)
                .with_note("`if` opened here", branch.loc));
        }

        let entry = branch.entry.types();
        let exit = self.stack.types();
        if entry != exit {
            return Err(CompileError::contract(
                format!(
                    "`if` without `else` must not change the stack: entered with {}, ends with {}",
                    self.shape(&entry),
                    self.shape(&exit)
                ),
                loc,
            )
            .with_note("`if` opened here", branch.loc));
        }

        let ins = (-self.stack.min_count()) as usize;
        let outs = (ins as i64 + self.stack.stack_count()) as usize;
        self.record(branch.opener, ins, outs);
        self.stack.restore_counters(&branch.entry);
        self.stack.absorb_block(ins, outs);
        Ok(())
    }

    fn close_else(&mut self, opener: usize, loc: Location) -> CompileResult<()> {
        let branch = self.pop_branch(opener, &loc)?;
        let Some(then_end) = branch.then_end else {
            return Err(CompileError::structural("bare `if` closed as an `if`/`else`", loc)
                .with_note("`if` opened here", branch.loc));
        };

        let else_types = self.stack.types();
        if then_end.types != else_types {
            return Err(CompileError::contract(
                format!(
                    "`if` and `else` branches leave different stacks: {} and {}",
                    self.shape(&then_end.types),
                    self.shape(&else_types)
                ),
                loc,
            )
            .with_note("`if` branch ends here", then_end.loc)
            .with_note("`if` opened here", branch.loc));
        }

        let dip = then_end.min_count.min(self.stack.min_count());
        let ins = (-dip) as usize;
        let outs = (then_end.stack_count.max(self.stack.stack_count()) - dip) as usize;
        self.record(branch.opener, ins, outs);
        self.stack.restore_counters(&branch.entry);
        self.stack.absorb_block(ins, outs);
        Ok(())
    }

    fn begin_proc(&mut self, index: usize, id: ProcId, loc: &Location) -> CompileResult<()> {
        let symbols = self.symbols;
        let proc = symbols.proc(id);
        if let Some(outer) = self.current {
            let outer = symbols.proc(outer);
            return Err(CompileError::nesting(
                format!(
                    "procedure `{}` begins inside procedure `{}`",
                    self.words.text(proc.name),
                    self.words.text(outer.name)
                ),
                loc.clone(),
            )
            .with_note("enclosing procedure declared here", outer.loc.clone()));
        }
        self.stack.seed(&proc.ins, &proc.loc);
        self.bindings.clear();
        self.current = Some(id);
        self.contracts.insert(
            index,
            BlockContract {
                ins: proc.ins.len(),
                outs: proc.outs.len(),
            },
        );
        Ok(())
    }

    fn end_proc(&mut self, id: ProcId, loc: &Location) -> CompileResult<()> {
        let (symbols, words) = (self.symbols, self.words);
        let proc = symbols.proc(id);
        let name = words.text(proc.name);
        if let Some(branch) = self.branches.last() {
            return Err(CompileError::structural(
                format!("procedure `{}` ends inside an open `if`", name),
                loc.clone(),
            )
            .with_note("`if` opened here", branch.loc.clone()));
        }

        let exit = self.stack.types();
        if exit != proc.outs {
            return Err(CompileError::contract(
                format!(
                    "procedure `{}` ends with {} but declares outputs {}",
                    name,
                    self.shape(&exit),
                    self.shape(&proc.outs)
                ),
                loc.clone(),
            )
            .with_note(format!("`{}` declared here", name), proc.loc.clone()));
        }
        debug!(proc = name, "procedure checked");
        self.stack.clear();
        self.bindings.clear();
        self.current = None;
        Ok(())
    }
}

/// Check a resolved program in place
pub fn check_program(program: &mut Program) -> CompileResult<ContractTable> {
    TypeChecker::new(&program.symbols, &program.words).check(&mut program.ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::resolve_source;
    use pretty_assertions::assert_eq;

    fn check(source: &str) -> CompileResult<(Program, ContractTable)> {
        let mut program = resolve_source(source, "test.kln")?;
        let contracts = check_program(&mut program)?;
        Ok((program, contracts))
    }

    #[test]
    fn test_well_typed_procedure() {
        let source = "add :: int int -> int + end  main :: 1 2 add print end";
        let (_, contracts) = check(source).unwrap();
        assert_eq!(contracts[&0], BlockContract { ins: 2, outs: 1 });
    }

    #[test]
    fn test_bare_if_must_keep_shape() {
        let err = check("f :: int bool -> int if dup end end").unwrap_err();
        assert!(matches!(err, CompileError::Contract { .. }));
        assert_eq!(err.notes().len(), 1);
    }

    #[test]
    fn test_bare_if_contract() {
        let (_, contracts) = check("f :: int bool -> int if 1 + end end").unwrap();
        assert_eq!(contracts[&1], BlockContract { ins: 1, outs: 1 });
    }

    #[test]
    fn test_if_else_contract() {
        let (_, contracts) = check("f :: int int bool -> int if + else drop end end").unwrap();
        assert_eq!(contracts[&1], BlockContract { ins: 2, outs: 1 });
    }

    #[test]
    fn test_nested_if_contract_folds_into_outer() {
        let source = "f :: int int bool -> int int if dup 0 > if + 0 else drop 1 end end end";
        let (_, contracts) = check(source).unwrap();
        assert_eq!(contracts[&1], BlockContract { ins: 2, outs: 2 });
        assert_eq!(contracts[&5], BlockContract { ins: 2, outs: 2 });
    }

    #[test]
    fn test_branches_must_agree() {
        let err = check("f :: int bool -> int if drop 1 else dup end end").unwrap_err();
        assert!(matches!(err, CompileError::Contract { .. }));
    }

    #[test]
    fn test_arity_and_types() {
        assert!(matches!(check("main :: + end"), Err(CompileError::Arity { .. })));
        assert!(matches!(
            check("main :: 1 true + drop end"),
            Err(CompileError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check("main :: 1 if end end"),
            Err(CompileError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_call_arguments_checked_against_declaration() {
        let err = check("add :: int int -> int + end  main :: 1 true add print end").unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
        assert!(err.message().contains("argument 2 of `add`"));
    }

    #[test]
    fn test_member_offsets_are_resolved() {
        let source = "Point struct x int y int end  p : Point end  main :: *p .y print end";
        let (program, _) = check(source).unwrap();
        assert!(matches!(program.ops[2].kind, OpKind::Member { offset: Some(4), .. }));
    }

    #[test]
    fn test_unknown_member() {
        let source = "Point struct x int end  p : Point end  main :: *p .z print end";
        let err = check(source).unwrap_err();
        assert!(matches!(err, CompileError::UnknownMember { .. }));
    }

    #[test]
    fn test_procedure_outputs_must_match() {
        let err = check("main :: -> int end").unwrap_err();
        assert!(matches!(err, CompileError::Contract { .. }));
        assert!(err.message().contains("declares outputs [int]"));
    }

    #[test]
    fn test_let_bindings_keep_types() {
        assert!(check("main :: 1 true let n flag : flag if n print end end end").is_ok());
        assert!(matches!(
            check("main :: 1 true let n flag : n if end end end"),
            Err(CompileError::TypeMismatch { .. })
        ));
    }
}
