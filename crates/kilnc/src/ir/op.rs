//! Operation definitions

use crate::common::{Location, StrId, WordId};
use crate::types::TypeTag;
use std::fmt;

/// Index of a procedure in declaration order
pub type ProcId = usize;

/// Where a variable or memory region lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Local(ProcId),
}

/// Reference to a scalar variable slot (globals or a procedure's locals)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub scope: Scope,
    pub index: usize,
}

/// Reference to a named memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemRef {
    pub scope: Scope,
    pub index: usize,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Local(p) => write!(f, "local(proc {})", p),
        }
    }
}

/// Built-in primitive operations with fixed signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Not,
    Dup,
    Drop,
    Swap,
    Over,
    Rot,
    Load,
    Store,
    Load8,
    Store8,
    Print,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "+" => Intrinsic::Add,
            "-" => Intrinsic::Sub,
            "*" => Intrinsic::Mul,
            "/" => Intrinsic::Div,
            "%" => Intrinsic::Mod,
            "<<" => Intrinsic::Shl,
            ">>" => Intrinsic::Shr,
            "=" => Intrinsic::Eq,
            "!=" => Intrinsic::Ne,
            "<" => Intrinsic::Lt,
            ">" => Intrinsic::Gt,
            "<=" => Intrinsic::Le,
            ">=" => Intrinsic::Ge,
            "and" => Intrinsic::And,
            "or" => Intrinsic::Or,
            "not" => Intrinsic::Not,
            "dup" => Intrinsic::Dup,
            "drop" => Intrinsic::Drop,
            "swap" => Intrinsic::Swap,
            "over" => Intrinsic::Over,
            "rot" => Intrinsic::Rot,
            "@" => Intrinsic::Load,
            "!" => Intrinsic::Store,
            "@8" => Intrinsic::Load8,
            "!8" => Intrinsic::Store8,
            "print" => Intrinsic::Print,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Add => "+",
            Intrinsic::Sub => "-",
            Intrinsic::Mul => "*",
            Intrinsic::Div => "/",
            Intrinsic::Mod => "%",
            Intrinsic::Shl => "<<",
            Intrinsic::Shr => ">>",
            Intrinsic::Eq => "=",
            Intrinsic::Ne => "!=",
            Intrinsic::Lt => "<",
            Intrinsic::Gt => ">",
            Intrinsic::Le => "<=",
            Intrinsic::Ge => ">=",
            Intrinsic::And => "and",
            Intrinsic::Or => "or",
            Intrinsic::Not => "not",
            Intrinsic::Dup => "dup",
            Intrinsic::Drop => "drop",
            Intrinsic::Swap => "swap",
            Intrinsic::Over => "over",
            Intrinsic::Rot => "rot",
            Intrinsic::Load => "@",
            Intrinsic::Store => "!",
            Intrinsic::Load8 => "@8",
            Intrinsic::Store8 => "!8",
            Intrinsic::Print => "print",
        }
    }
}

/// Struct member access flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccess {
    /// `.m`: load the member's value
    Load,
    /// `.*m`: compute the member's address
    Addr,
}

/// Operation kinds.
///
/// Closed on purpose: the resolver, checker and any code generator match
/// exhaustively, so a new kind does not compile until all of them handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    PushInt(i64),
    PushBool(bool),
    PushPtr(i64),
    /// Pushes the byte length then the address
    PushStr(StrId),
    Intrinsic(Intrinsic),
    /// Reinterpret the top of stack; a no-op at runtime
    Cast(TypeTag),
    PushMem(MemRef),
    Call(ProcId),
    /// Push the value bound at reverse index `n` (0 = most recent binding)
    PushBinding(usize),
    LoadVar { var: VarRef, ty: TypeTag },
    StoreVar { var: VarRef, ty: TypeTag },
    VarAddr { var: VarRef, ty: TypeTag },
    /// `offset` is filled in by the checker once the receiver type is known
    Member {
        access: MemberAccess,
        name: WordId,
        offset: Option<u32>,
    },
    If,
    Else { opener: usize },
    EndIf { opener: usize },
    EndElse { opener: usize },
    Bind(usize),
    Unbind(usize),
    ProcBegin(ProcId),
    /// `frame` is the local memory to release, in bytes
    ProcEnd { proc: ProcId, frame: u32 },
}

/// A resolved operation
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub kind: OpKind,
    pub loc: Location,
}

impl Op {
    pub fn new(kind: OpKind, loc: Location) -> Self {
        Self { kind, loc }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.index)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::PushInt(n) => write!(f, "push.int {}", n),
            OpKind::PushBool(b) => write!(f, "push.bool {}", u8::from(*b)),
            OpKind::PushPtr(p) => write!(f, "push.ptr {}", p),
            OpKind::PushStr(s) => write!(f, "push.str {}", s.0),
            OpKind::Intrinsic(i) => write!(f, "{}", i.name()),
            OpKind::Cast(ty) => write!(f, "cast {}", ty),
            OpKind::PushMem(m) => write!(f, "push.mem {}#{}", m.scope, m.index),
            OpKind::Call(p) => write!(f, "call {}", p),
            OpKind::PushBinding(i) => write!(f, "push.bind {}", i),
            OpKind::LoadVar { var, ty } => write!(f, "load {} : {}", var, ty),
            OpKind::StoreVar { var, ty } => write!(f, "store {} : {}", var, ty),
            OpKind::VarAddr { var, ty } => write!(f, "addr {} : {}", var, ty),
            OpKind::Member { access, offset, .. } => {
                let op = match access {
                    MemberAccess::Load => "member.load",
                    MemberAccess::Addr => "member.addr",
                };
                match offset {
                    Some(off) => write!(f, "{} +{}", op, off),
                    None => write!(f, "{} ?", op),
                }
            }
            OpKind::If => write!(f, "if"),
            OpKind::Else { opener } => write!(f, "else (if @{})", opener),
            OpKind::EndIf { opener } => write!(f, "end.if (if @{})", opener),
            OpKind::EndElse { opener } => write!(f, "end.else (if @{})", opener),
            OpKind::Bind(n) => write!(f, "bind {}", n),
            OpKind::Unbind(n) => write!(f, "unbind {}", n),
            OpKind::ProcBegin(p) => write!(f, "proc.begin {}", p),
            OpKind::ProcEnd { proc, frame } => write!(f, "proc.end {} (free {})", proc, frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intrinsic_lookup_by_name() {
        for name in ["+", "!=", "dup", "rot", "@8", "!", "print"] {
            let intrinsic = Intrinsic::from_name(name).unwrap();
            assert_eq!(intrinsic.name(), name);
        }
        assert_eq!(Intrinsic::from_name("!x"), None);
        assert_eq!(Intrinsic::from_name("*p"), None);
    }

    #[test]
    fn test_display() {
        let var = VarRef {
            scope: Scope::Local(2),
            index: 1,
        };
        let ty = TypeTag::Int;
        let load = OpKind::LoadVar { var, ty };
        assert_eq!(load.to_string(), "load local(proc 2)#1 : int");
        assert_eq!(OpKind::PushBool(true).to_string(), "push.bool 1");
        let end = OpKind::ProcEnd { proc: 0, frame: 8 };
        assert_eq!(end.to_string(), "proc.end 0 (free 8)");
    }
}
