//! Symbol tables
//!
//! All tables are append-only and indexed by declaration order, so an index
//! handed out once (a `ProcId` in a call, a `VarRef` in a load) stays valid
//! for the rest of the compilation.

use crate::common::{Location, WordId, Words};
use crate::ir::{ProcId, Scope, VarRef};
use crate::types::{StructDef, StructId, TypeTag, round_to_cell};
use std::collections::HashMap;

/// A named value with its folded value and type. Backs constants and
/// scalar variables, global or procedure-local.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedWord {
    pub name: WordId,
    pub value: i64,
    pub ty: TypeTag,
    pub loc: Location,
}

/// A struct-typed variable: one backing scalar variable per member,
/// named `var.member`, in member order
#[derive(Debug, Clone, PartialEq)]
pub struct StructVar {
    pub name: WordId,
    pub def: StructId,
    pub members: Vec<usize>,
    pub loc: Location,
}

/// A struct-typed constant: one constant per member, named `const.member`
#[derive(Debug, Clone, PartialEq)]
pub struct StructConst {
    pub name: WordId,
    pub def: StructId,
    pub members: Vec<usize>,
    pub loc: Location,
}

/// A named block of memory. Sizes are always a multiple of the cell size.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRegion {
    pub name: WordId,
    pub offset: u32,
    pub size: u32,
    pub loc: Location,
}

/// Procedure with its contract and everything scoped to its body
#[derive(Debug, Clone, PartialEq)]
pub struct Proc {
    pub name: WordId,
    pub ins: Vec<TypeTag>,
    pub outs: Vec<TypeTag>,
    pub locals: Vec<TypedWord>,
    pub local_structs: Vec<StructVar>,
    pub memory: Vec<MemoryRegion>,
    /// Bytes of local memory allocated so far
    pub frame_size: u32,
    /// Names currently bound by `let`, oldest first
    pub bindings: Vec<WordId>,
    pub loc: Location,
}

impl Proc {
    pub fn new(name: WordId, ins: Vec<TypeTag>, outs: Vec<TypeTag>, loc: Location) -> Self {
        Self {
            name,
            ins,
            outs,
            locals: Vec::new(),
            local_structs: Vec::new(),
            memory: Vec::new(),
            frame_size: 0,
            bindings: Vec::new(),
            loc,
        }
    }

    pub fn find_local(&self, name: WordId) -> Option<usize> {
        self.locals.iter().position(|w| w.name == name)
    }

    pub fn find_local_struct(&self, name: WordId) -> Option<usize> {
        self.local_structs.iter().position(|s| s.name == name)
    }

    pub fn find_memory(&self, name: WordId) -> Option<usize> {
        self.memory.iter().position(|m| m.name == name)
    }

    /// Reverse index of a bound name (0 = most recently bound)
    pub fn binding_index(&self, name: WordId) -> Option<usize> {
        self.bindings.iter().rev().position(|&b| b == name)
    }

    pub fn add_local(&mut self, word: TypedWord) -> usize {
        self.locals.push(word);
        self.locals.len() - 1
    }

    /// Reserve local memory; the offset is the frame size before the call.
    /// Returns `None` when the frame would no longer fit in `u32`.
    pub fn add_memory(&mut self, name: WordId, size: u32, loc: Location) -> Option<usize> {
        let size = round_to_cell(size)?;
        let frame_size = self.frame_size.checked_add(size)?;
        self.memory.push(MemoryRegion {
            name,
            offset: self.frame_size,
            size,
            loc,
        });
        self.frame_size = frame_size;
        Some(self.memory.len() - 1)
    }
}

/// Every table the resolver consults
#[derive(Debug, Default)]
pub struct SymbolTables {
    pub structs: Vec<StructDef>,
    pub consts: Vec<TypedWord>,
    pub struct_consts: Vec<StructConst>,
    pub globals: Vec<TypedWord>,
    pub global_structs: Vec<StructVar>,
    pub memory: Vec<MemoryRegion>,
    /// Bytes of global memory allocated so far
    pub memory_size: u32,
    pub procs: Vec<Proc>,

    struct_names: HashMap<WordId, StructId>,
    const_names: HashMap<WordId, usize>,
    struct_const_names: HashMap<WordId, usize>,
    global_names: HashMap<WordId, usize>,
    global_struct_names: HashMap<WordId, usize>,
    memory_names: HashMap<WordId, usize>,
    proc_names: HashMap<WordId, ProcId>,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_struct(&mut self, def: StructDef) -> StructId {
        let id = self.structs.len();
        self.struct_names.insert(def.name, id);
        self.structs.push(def);
        id
    }

    pub fn find_struct(&self, name: WordId) -> Option<StructId> {
        self.struct_names.get(&name).copied()
    }

    pub fn add_const(&mut self, word: TypedWord) -> usize {
        let index = self.consts.len();
        self.const_names.insert(word.name, index);
        self.consts.push(word);
        index
    }

    pub fn find_const(&self, name: WordId) -> Option<usize> {
        self.const_names.get(&name).copied()
    }

    pub fn add_struct_const(&mut self, family: StructConst) -> usize {
        let index = self.struct_consts.len();
        self.struct_const_names.insert(family.name, index);
        self.struct_consts.push(family);
        index
    }

    pub fn find_struct_const(&self, name: WordId) -> Option<usize> {
        self.struct_const_names.get(&name).copied()
    }

    pub fn add_global(&mut self, word: TypedWord) -> usize {
        let index = self.globals.len();
        self.global_names.insert(word.name, index);
        self.globals.push(word);
        index
    }

    pub fn find_global(&self, name: WordId) -> Option<usize> {
        self.global_names.get(&name).copied()
    }

    pub fn add_global_struct(&mut self, var: StructVar) -> usize {
        let index = self.global_structs.len();
        self.global_struct_names.insert(var.name, index);
        self.global_structs.push(var);
        index
    }

    pub fn find_global_struct(&self, name: WordId) -> Option<usize> {
        self.global_struct_names.get(&name).copied()
    }

    /// Reserve global memory, or `None` when the total would overflow `u32`
    pub fn add_memory(&mut self, name: WordId, size: u32, loc: Location) -> Option<usize> {
        let size = round_to_cell(size)?;
        let memory_size = self.memory_size.checked_add(size)?;
        let index = self.memory.len();
        self.memory_names.insert(name, index);
        self.memory.push(MemoryRegion {
            name,
            offset: self.memory_size,
            size,
            loc,
        });
        self.memory_size = memory_size;
        Some(index)
    }

    pub fn find_memory(&self, name: WordId) -> Option<usize> {
        self.memory_names.get(&name).copied()
    }

    pub fn add_proc(&mut self, proc: Proc) -> ProcId {
        let id = self.procs.len();
        self.proc_names.insert(proc.name, id);
        self.procs.push(proc);
        id
    }

    pub fn find_proc(&self, name: WordId) -> Option<ProcId> {
        self.proc_names.get(&name).copied()
    }

    pub fn proc(&self, id: ProcId) -> &Proc {
        &self.procs[id]
    }

    pub fn proc_mut(&mut self, id: ProcId) -> &mut Proc {
        &mut self.procs[id]
    }

    /// The scalar variable a `VarRef` points at
    pub fn var(&self, var: VarRef) -> &TypedWord {
        match var.scope {
            Scope::Global => &self.globals[var.index],
            Scope::Local(p) => &self.procs[p].locals[var.index],
        }
    }

    /// Resolve the text after `#` in a cast: `int`, `bool`, `ptr`, a struct
    /// name, or any of those prefixed with `*`. A pointer to a scalar is a
    /// plain `ptr`; structs are always handled by reference.
    pub fn cast_target(&self, target: &str, words: &Words) -> Option<TypeTag> {
        let (pointer, name) = match target.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, target),
        };
        let ty = match name {
            "int" => TypeTag::Int,
            "bool" => TypeTag::Bool,
            "ptr" => TypeTag::Ptr,
            _ => TypeTag::Struct(self.find_struct(words.get(name)?)?),
        };
        Some(match ty {
            TypeTag::Struct(_) => ty,
            _ if pointer => TypeTag::Ptr,
            _ => ty,
        })
    }

    /// Source-level spelling of a type
    pub fn type_name(&self, ty: TypeTag, words: &Words) -> String {
        match ty {
            TypeTag::Struct(k) => match self.structs.get(k) {
                Some(def) => words.text(def.name).to_string(),
                None => ty.to_string(),
            },
            _ => ty.to_string(),
        }
    }

    /// Render a stack shape, bottom first: `[int, Point]`
    pub fn shape(&self, types: &[TypeTag], words: &Words) -> String {
        let names: Vec<String> = types.iter().map(|&t| self.type_name(t, words)).collect();
        format!("[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Member, Value};

    fn loc() -> Location {
        Location::synthetic("test.kln")
    }

    fn int_member(words: &mut Words, name: &str) -> Member {
        Member {
            name: words.intern(name),
            ty: TypeTag::Int,
            default: Value::int(0),
        }
    }

    fn point(words: &mut Words) -> StructDef {
        StructDef {
            name: words.intern("Point"),
            members: vec![int_member(words, "x"), int_member(words, "y")],
            loc: loc(),
        }
    }

    #[test]
    fn test_cast_targets() {
        let mut words = Words::new();
        let mut symbols = SymbolTables::new();
        let id = symbols.add_struct(point(&mut words));

        assert_eq!(symbols.cast_target("int", &words), Some(TypeTag::Int));
        assert_eq!(symbols.cast_target("*int", &words), Some(TypeTag::Ptr));
        let point = Some(TypeTag::Struct(id));
        assert_eq!(symbols.cast_target("Point", &words), point);
        assert_eq!(symbols.cast_target("*Point", &words), point);
        assert_eq!(symbols.cast_target("Line", &words), None);
        let shape = symbols.shape(&[TypeTag::Int, TypeTag::Struct(id)], &words);
        assert_eq!(shape, "[int, Point]");
    }

    #[test]
    fn test_memory_offsets_are_cell_aligned() {
        let mut words = Words::new();
        let mut symbols = SymbolTables::new();
        let a = symbols.add_memory(words.intern("a"), 5, loc()).unwrap();
        let b = symbols.add_memory(words.intern("b"), 4, loc()).unwrap();
        assert_eq!((symbols.memory[a].offset, symbols.memory[a].size), (0, 8));
        assert_eq!((symbols.memory[b].offset, symbols.memory[b].size), (8, 4));
        assert_eq!(symbols.memory_size, 12);

        let mut proc = Proc::new(words.intern("main"), vec![], vec![], loc());
        proc.add_memory(words.intern("buf"), 1, loc()).unwrap();
        proc.add_memory(words.intern("more"), 9, loc()).unwrap();
        assert_eq!(proc.memory[1].offset, 4);
        assert_eq!(proc.frame_size, 16);
    }

    #[test]
    fn test_memory_overflow_leaves_tables_untouched() {
        let mut words = Words::new();
        let mut symbols = SymbolTables::new();
        let (huge, a, b) = (words.intern("huge"), words.intern("a"), words.intern("b"));
        let big = 3_000_000_000;
        assert_eq!(symbols.add_memory(huge, u32::MAX, loc()), None);
        assert_eq!(symbols.add_memory(a, big, loc()), Some(0));
        assert_eq!(symbols.add_memory(b, big, loc()), None);
        assert_eq!(symbols.memory.len(), 1);
        assert_eq!(symbols.find_memory(b), None);
        assert_eq!(symbols.memory_size, big);

        let mut proc = Proc::new(words.intern("main"), vec![], vec![], loc());
        assert_eq!(proc.add_memory(a, big, loc()), Some(0));
        assert_eq!(proc.add_memory(b, big, loc()), None);
        assert_eq!(proc.frame_size, big);
    }

    #[test]
    fn test_binding_index_counts_from_most_recent() {
        let mut words = Words::new();
        let (a, b) = (words.intern("a"), words.intern("b"));
        let mut proc = Proc::new(words.intern("main"), vec![], vec![], loc());
        proc.bindings = vec![a, b, a];
        assert_eq!(proc.binding_index(a), Some(0));
        assert_eq!(proc.binding_index(b), Some(1));
        assert_eq!(proc.binding_index(words.intern("c")), None);
    }
}
