use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{
    asm::Assembler,
    compile::Options,
    symtab::{ParamStack, SymbolTable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    While,
    For,
}

/// Label ids, one sequence per construct, shared by every function of the unit.
#[derive(Debug, Default)]
pub struct LabelCounters {
    if_ids: u32,
    while_ids: u32,
    for_ids: u32,
}

impl LabelCounters {
    pub fn next(&mut self, kind: BlockKind) -> u32 {
        let counter = match kind {
            BlockKind::If => &mut self.if_ids,
            BlockKind::While => &mut self.while_ids,
            BlockKind::For => &mut self.for_ids,
        };
        let id = *counter;
        *counter += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    Int,
    /// The function named `main`. It never returns; control runs off its end.
    EntryPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub returns_value: bool,
    pub arity: usize,
}

pub struct CompilerState {
    pub labels: LabelCounters,
    pub asm: Assembler,
    pub signatures: FxHashMap<String, Signature>,
    pub options: Options,
    /// Highest source line already echoed as a comment.
    pub annotated_line: usize,
}

impl CompilerState {
    pub fn new(options: Options, signatures: FxHashMap<String, Signature>) -> Self {
        Self {
            labels: LabelCounters::default(),
            asm: Assembler::default(),
            signatures,
            options,
            annotated_line: 0,
        }
    }
}

pub struct FunctionContext {
    pub name: Rc<str>,
    pub kind: ReturnKind,
    pub scope: SymbolTable,
    pub params: ParamStack,
    /// Set once an early `return` jumps to the exit label.
    pub early_exit: bool,
}

impl FunctionContext {
    pub fn new(name: &str, kind: ReturnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            scope: SymbolTable::new(name),
            params: ParamStack::default(),
            early_exit: false,
        }
    }
}
