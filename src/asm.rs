//! Instructions, labels and program layout for the target stack machine.
//!
//! Addressing contract, fixed for every instruction the compiler emits:
//!
//! * `pushi X` pushes an immediate, or the address of the label/global `X`.
//! * `push` pops an address and pushes the value stored there.
//! * `pop` pops an address, then a value, and stores the value at the address.
//! * `add`/`sub`/`slt` pop `b` then `a` and push `a + b`, `a - b`, `a < b`.
//! * `beq L`/`bne L` pop `b` then `a` and jump to `L` on `a == b`/`a != b`.
//! * `jpush` pops a target, records the return site on the link stack and jumps.
//! * `jpop` pops a target and jumps; `jr` returns through the link stack.
//!
//! The machine halts when execution runs past the last instruction.

use std::{collections::hash_map::Entry, fmt, rc::Rc};

use rustc_hash::FxHashMap;

use crate::symtab::Designator;

/// Name of the function the program starts in.
pub const ENTRY_POINT: &str = "main";

pub const END_IF: &str = "end_if";
pub const END_ELSE: &str = "end_else";
pub const START_WHILE: &str = "start_while";
pub const END_WHILE: &str = "end_while";
pub const START_FOR: &str = "start_for";
pub const END_FOR: &str = "end_for";

const BLOCK_PREFIXES: [&str; 6] = [END_IF, END_ELSE, START_WHILE, END_WHILE, START_FOR, END_FOR];

/// Whether `name` is spelled like a label or global the compiler generates
/// itself, so that a function or cell of that name would be ambiguous.
pub fn is_reserved(name: &str) -> bool {
    if name == Designator::return_slot().as_str() {
        return true;
    }
    if name.strip_prefix("end_") == Some(ENTRY_POINT) {
        return true;
    }
    BLOCK_PREFIXES.iter().any(|prefix| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    Function(Rc<str>),
    Block { prefix: &'static str, id: u32 },
    /// Placed after a function's last instruction.
    Exit(Rc<str>),
}

impl Label {
    pub fn block(prefix: &'static str, id: u32) -> Self {
        Self::Block { prefix, id }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(name) => write!(f, "{name}"),
            Self::Block { prefix, id } => write!(f, "{prefix}_{id}"),
            Self::Exit(name) => write!(f, "end_{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Imm(i64),
    Global(Designator),
    Label(Label),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imm(int) => write!(f, "{int}"),
            Self::Global(designator) => write!(f, "{designator}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, macros::Mnemonic)]
pub enum Instr {
    Pushi(Operand),
    Push,
    Pop,
    Add,
    Sub,
    Slt,
    Beq(Label),
    Bne(Label),
    Jpush,
    Jpop,
    Jr,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pushi(operand) => write!(f, "{} {operand}", self.mnemonic()),
            Self::Beq(label) | Self::Bne(label) => write!(f, "{} {label}", self.mnemonic()),
            _ => f.write_str(self.mnemonic()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmLine {
    Instr(Instr),
    Label(Label),
    Comment(String),
}

impl fmt::Display for AsmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instr(instr) => write!(f, "\t{instr}"),
            Self::Label(label) => write!(f, "{label}:"),
            Self::Comment(text) => write!(f, "# {text}"),
        }
    }
}

/// The variable a global cell was reserved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub function: Rc<str>,
    pub name: Rc<str>,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` in `{}`", self.name, self.function)
    }
}

/// Collects the instruction stream function by function, together with every
/// global cell it touches.
pub struct Assembler {
    globals: Vec<Designator>,
    owners: FxHashMap<Designator, Owner>,
    sections: Vec<Vec<AsmLine>>,
    entry: Option<Vec<AsmLine>>,
    current: Vec<AsmLine>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self {
            globals: vec![Designator::return_slot()],
            owners: FxHashMap::default(),
            sections: vec![],
            entry: None,
            current: vec![],
        }
    }
}

impl Assembler {
    /// Reserves the global cell of a variable. Sibling scopes of one function
    /// may reserve the same cell again; any other variable that maps onto an
    /// existing cell gets back the owner it would clash with.
    pub fn declare_global(&mut self, designator: &Designator, owner: Owner) -> Result<(), Owner> {
        match self.owners.entry(designator.clone()) {
            Entry::Occupied(entry) if *entry.get() == owner => Ok(()),
            Entry::Occupied(entry) => Err(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(owner);
                self.globals.push(designator.clone());
                Ok(())
            }
        }
    }

    pub fn insert(&mut self, instr: Instr) {
        self.current.push(AsmLine::Instr(instr));
    }

    pub fn insert_label(&mut self, label: Label) {
        self.current.push(AsmLine::Label(label));
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.current.push(AsmLine::Comment(text.into()));
    }

    /// Closes the code of the function being compiled.
    pub fn end_function(&mut self, is_entry: bool) {
        let code = std::mem::take(&mut self.current);
        if is_entry {
            self.entry = Some(code);
        } else {
            self.sections.push(code);
        }
    }

    /// Lays out the program: the entry jump, every function in the order it was
    /// compiled, and the entry point last so that running off its end halts.
    pub fn finish(mut self) -> Program {
        let mut lines = vec![
            AsmLine::Instr(Instr::Pushi(Operand::Label(Label::Function(ENTRY_POINT.into())))),
            AsmLine::Instr(Instr::Jpop),
        ];
        if !self.current.is_empty() {
            self.end_function(false);
        }
        lines.extend(self.sections.into_iter().flatten());
        lines.extend(self.entry.into_iter().flatten());
        Program { globals: self.globals, lines }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub globals: Vec<Designator>,
    pub lines: Vec<AsmLine>,
}

impl Program {
    pub fn instructions(&self) -> impl Iterator<Item = &Instr> {
        self.lines.iter().filter_map(|line| match line {
            AsmLine::Instr(instr) => Some(instr),
            _ => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.lines.iter().filter_map(|line| match line {
            AsmLine::Label(label) => Some(label),
            _ => None,
        })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for global in &self.globals {
            writeln!(f, ".globl {global}")?;
        }
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
