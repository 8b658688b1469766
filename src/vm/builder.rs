//! Program builder
//!
//! A small label-based assembler producing [`Program`]s for the reference
//! interpreter.
//!
//! ```rust
//! use coopvm::vm::builder::{Instr, ProgramBuilder};
//!
//! let mut b = ProgramBuilder::new();
//! b.main();
//! b.line("demo.p", 1);
//! b.emit(Instr::ConstPri(42));
//! b.emit(Instr::Halt(0));
//! let program = b.build().unwrap();
//! assert!(program.main.is_some());
//! ```

use crate::vm::debug::DebugInfo;
use crate::vm::opcode::Opcode;
use crate::vm::program::{Cell, Program, PublicEntry, CELL_SIZE, FLAG_DEBUG, FLAG_NOCHECKS};

/// Jump target placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Assembler instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Nop,
    Halt(Cell),
    ConstPri(Cell),
    ConstAlt(Cell),
    LoadPri(Cell),
    LoadAlt(Cell),
    StorPri(Cell),
    LoadSPri(Cell),
    StorSPri(Cell),
    PushPri,
    PushAlt,
    PushC(Cell),
    PopPri,
    PopAlt,
    Stack(Cell),
    Heap(Cell),
    Add,
    Sub,
    Smul,
    Sdiv,
    Eq,
    Less,
    IncPri,
    Bounds(Cell),
    Jump(Label),
    Jzer(Label),
    Jnz(Label),
    Call(Label),
    Proc,
    Ret,
    /// Native by import index (see [`ProgramBuilder::native`])
    Sysreq(Cell),
    Sleep,
    Break,
}

impl Instr {
    fn encode(&self) -> (Opcode, Option<Operand>) {
        use Operand::{Target, Value};
        match *self {
            Instr::Nop => (Opcode::Nop, None),
            Instr::Halt(v) => (Opcode::Halt, Some(Value(v))),
            Instr::ConstPri(v) => (Opcode::ConstPri, Some(Value(v))),
            Instr::ConstAlt(v) => (Opcode::ConstAlt, Some(Value(v))),
            Instr::LoadPri(v) => (Opcode::LoadPri, Some(Value(v))),
            Instr::LoadAlt(v) => (Opcode::LoadAlt, Some(Value(v))),
            Instr::StorPri(v) => (Opcode::StorPri, Some(Value(v))),
            Instr::LoadSPri(v) => (Opcode::LoadSPri, Some(Value(v))),
            Instr::StorSPri(v) => (Opcode::StorSPri, Some(Value(v))),
            Instr::PushPri => (Opcode::PushPri, None),
            Instr::PushAlt => (Opcode::PushAlt, None),
            Instr::PushC(v) => (Opcode::PushC, Some(Value(v))),
            Instr::PopPri => (Opcode::PopPri, None),
            Instr::PopAlt => (Opcode::PopAlt, None),
            Instr::Stack(v) => (Opcode::Stack, Some(Value(v))),
            Instr::Heap(v) => (Opcode::Heap, Some(Value(v))),
            Instr::Add => (Opcode::Add, None),
            Instr::Sub => (Opcode::Sub, None),
            Instr::Smul => (Opcode::Smul, None),
            Instr::Sdiv => (Opcode::Sdiv, None),
            Instr::Eq => (Opcode::Eq, None),
            Instr::Less => (Opcode::Less, None),
            Instr::IncPri => (Opcode::IncPri, None),
            Instr::Bounds(v) => (Opcode::Bounds, Some(Value(v))),
            Instr::Jump(l) => (Opcode::Jump, Some(Target(l))),
            Instr::Jzer(l) => (Opcode::Jzer, Some(Target(l))),
            Instr::Jnz(l) => (Opcode::Jnz, Some(Target(l))),
            Instr::Call(l) => (Opcode::Call, Some(Target(l))),
            Instr::Proc => (Opcode::Proc, None),
            Instr::Ret => (Opcode::Ret, None),
            Instr::Sysreq(v) => (Opcode::Sysreq, Some(Value(v))),
            Instr::Sleep => (Opcode::Sleep, None),
            Instr::Break => (Opcode::Break, None),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Value(Cell),
    Target(Label),
}

/// Builder errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("label {0} is used but never bound")]
    UnboundLabel(usize),

    #[error("label {0} is bound twice")]
    Rebound(usize),

    #[error("duplicate public function '{0}'")]
    DuplicatePublic(String),
}

/// 程序构建器
#[derive(Debug)]
pub struct ProgramBuilder {
    code: Vec<Cell>,
    /// code index → label awaiting its address
    fixups: Vec<(usize, Label)>,
    labels: Vec<Option<usize>>,
    data: Vec<Cell>,
    publics: Vec<PublicEntry>,
    natives: Vec<String>,
    main: Option<usize>,
    debug: DebugInfo,
    checks: bool,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// Start a program. Address 0 always holds `halt 0`.
    pub fn new() -> Self {
        let mut builder = Self {
            code: Vec::new(),
            fixups: Vec::new(),
            labels: Vec::new(),
            data: Vec::new(),
            publics: Vec::new(),
            natives: Vec::new(),
            main: None,
            debug: DebugInfo::new(),
            checks: false,
        };
        builder.emit(Instr::Halt(0));
        builder
    }

    /// Current code address (bytes)
    pub fn here(&self) -> usize {
        self.code.len() * CELL_SIZE
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current address
    pub fn bind(
        &mut self,
        label: Label,
    ) -> Result<(), BuildError> {
        let here = self.here();
        let slot = &mut self.labels[label.0];
        if slot.is_some() {
            return Err(BuildError::Rebound(label.0));
        }
        *slot = Some(here);
        Ok(())
    }

    pub fn emit(
        &mut self,
        instr: Instr,
    ) -> &mut Self {
        let (op, operand) = instr.encode();
        if op == Opcode::Break {
            self.checks = true;
        }
        self.code.push(op as Cell);
        match operand {
            Some(Operand::Value(v)) => self.code.push(v),
            Some(Operand::Target(label)) => {
                self.fixups.push((self.code.len(), label));
                self.code.push(0);
            }
            None => {}
        }
        self
    }

    /// Emit a sequence of instructions
    pub fn emit_all(
        &mut self,
        instrs: &[Instr],
    ) -> &mut Self {
        for instr in instrs {
            self.emit(*instr);
        }
        self
    }

    /// Mark the current address as `main`
    pub fn main(&mut self) -> &mut Self {
        self.main = Some(self.here());
        self
    }

    /// Export the current address as a public function
    pub fn public(
        &mut self,
        name: &str,
    ) -> Result<usize, BuildError> {
        if self.publics.iter().any(|p| p.name == name) {
            return Err(BuildError::DuplicatePublic(name.to_string()));
        }
        self.publics.push(PublicEntry {
            name: name.to_string(),
            address: self.here(),
        });
        Ok(self.publics.len() - 1)
    }

    /// Import a native by name, returning its SYSREQ index
    pub fn native(
        &mut self,
        name: &str,
    ) -> Cell {
        let idx = match self.natives.iter().position(|n| n == name) {
            Some(idx) => idx,
            None => {
                self.natives.push(name.to_string());
                self.natives.len() - 1
            }
        };
        idx as Cell
    }

    /// Append a global variable, returning its data address
    pub fn global(
        &mut self,
        value: Cell,
    ) -> Cell {
        self.data.push(value);
        ((self.data.len() - 1) * CELL_SIZE) as Cell
    }

    /// Start a source line: records debug info and emits a checkpoint.
    pub fn line(
        &mut self,
        file: &str,
        line: u32,
    ) -> &mut Self {
        let file = self.debug.add_file(file);
        let here = self.here();
        self.debug.add_line(here, file, line);
        self.emit(Instr::Break)
    }

    /// Resolve labels and produce the program
    pub fn build(mut self) -> Result<Program, BuildError> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let addr = self.labels[label.0].ok_or(BuildError::UnboundLabel(label.0))?;
            self.code[at] = addr as Cell;
        }

        let mut flags = if self.checks { 0 } else { FLAG_NOCHECKS };
        let debug = if self.debug.is_empty() {
            None
        } else {
            flags |= FLAG_DEBUG;
            Some(self.debug)
        };

        Ok(Program {
            flags,
            main: self.main,
            code: self.code,
            data: self.data,
            publics: self.publics,
            natives: self.natives,
            debug,
        })
    }
}
