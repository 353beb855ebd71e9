//! Compilation driver and pipeline orchestration

use crate::check::{BlockContract, ContractTable, check_program};
use crate::common::CompileResult;
use crate::ir::{Op, OpKind};
use crate::lexer::Lexer;
use crate::sema::{Program, Resolver};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Options controlling diagnostics output of a pipeline run
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub verbose: bool,
    pub dump_tokens: bool,
    pub dump_ops: bool,
    pub dump_contracts: bool,
}

/// A resolved and type-checked program, ready for code generation
#[derive(Debug)]
pub struct CheckedProgram {
    pub program: Program,
    pub contracts: ContractTable,
}

impl CheckedProgram {
    fn describe(&self, op: &Op) -> String {
        let program = &self.program;
        let words = &program.words;
        let symbols = &program.symbols;
        let detail = match &op.kind {
            OpKind::Call(p) | OpKind::ProcBegin(p) | OpKind::ProcEnd { proc: p, .. } => {
                Some(words.text(symbols.proc(*p).name).to_string())
            }
            OpKind::LoadVar { var, .. }
            | OpKind::StoreVar { var, .. }
            | OpKind::VarAddr { var, .. } => Some(words.text(symbols.var(*var).name).to_string()),
            OpKind::Member { name, .. } => Some(words.text(*name).to_string()),
            OpKind::PushStr(s) => Some(format!("{:?}", program.strings.get(*s).text)),
            _ => None,
        };
        match detail {
            Some(detail) => format!("{} ; {}", op.kind, detail),
            None => op.kind.to_string(),
        }
    }

    /// One line per operation: index, source location, operation. String
    /// literals follow with their byte lengths.
    pub fn dump_ops(&self) -> String {
        let mut out = String::new();
        for (index, op) in self.program.ops.iter().enumerate() {
            let loc = op.loc.to_string();
            let _ = writeln!(out, "{index:>4}  {loc:<20} {}", self.describe(op));
        }
        for (id, lit) in self.program.strings.iter() {
            let _ = writeln!(out, "str {}  {:?} ({} bytes)", id.0, lit.text, lit.len);
        }
        out
    }

    /// One line per block contract, keyed by the opening operation
    pub fn dump_contracts(&self) -> String {
        let mut out = String::new();
        for (opener, contract) in &self.contracts {
            let what = self
                .program
                .ops
                .get(*opener)
                .map_or_else(|| "?".to_string(), |op| self.describe(op));
            let BlockContract { ins, outs } = contract;
            let _ = writeln!(out, "{opener:>4}  ins={ins} outs={outs}  {what}");
        }
        out
    }
}

/// Compilation pipeline: lex, resolve, check
pub struct Pipeline {
    options: CompileOptions,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Run the front end over one source file
    pub fn run(&self, source: &str, filename: &str) -> CompileResult<CheckedProgram> {
        let options = &self.options;

        // Phase 1: Lexing
        if options.verbose {
            eprintln!("Lexing {}...", filename);
        }
        let lexed = Lexer::new(source, filename).tokenize()?;

        if options.dump_tokens {
            eprintln!("=== Tokens ===");
            for token in &lexed.tokens {
                eprintln!("{}: {}", token.loc, token.describe(&lexed.words));
            }
            eprintln!("=== End Tokens ===\n");
        }

        // Phase 2: Word resolution
        if options.verbose {
            eprintln!("Resolving words...");
        }
        let mut program = Resolver::new(lexed).resolve()?;

        // Phase 3: Stack-effect checking
        if options.verbose {
            eprintln!("Checking stack effects...");
        }
        let contracts = check_program(&mut program)?;
        let checked = CheckedProgram { program, contracts };

        if options.dump_ops {
            eprintln!("=== Operations ===");
            eprint!("{}", checked.dump_ops());
            eprintln!("=== End Operations ===\n");
        }
        if options.dump_contracts {
            eprintln!("=== Block Contracts ===");
            eprint!("{}", checked.dump_contracts());
            eprintln!("=== End Block Contracts ===\n");
        }

        Ok(checked)
    }

    /// Read and check a file. The path as given is used as the file name in
    /// diagnostics.
    pub fn run_file(&self, path: &Path) -> CompileResult<CheckedProgram> {
        let source = fs::read_to_string(path)?;
        self.run(&source, &path.display().to_string())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a source text with default options
pub fn compile(source: &str, filename: &str) -> CompileResult<CheckedProgram> {
    Pipeline::new().run(source, filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CompileError;

    #[test]
    fn test_dumps_name_symbols() {
        let source = "twice :: int -> int dup + end\nmain :: 2 twice print end";
        let checked = compile(source, "t.kln").unwrap();
        let ops = checked.dump_ops();
        assert!(ops.contains("call 0 ; twice"));
        assert!(ops.contains("t.kln:2:"));

        let checked_str = compile("main :: \"hi\" drop drop end", "t.kln").unwrap();
        assert!(checked_str.dump_ops().contains("str 0  \"hi\" (2 bytes)"));

        let contracts = checked.dump_contracts();
        assert_eq!(contracts.lines().count(), 2);
        assert!(contracts.lines().next().unwrap_or("").contains("ins=1 outs=1"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Pipeline::new().run_file(Path::new("does/not/exist.kln")).unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
        assert!(err.location().is_none());
    }
}
