//! `if`/`else`, `while` and `for` lowering.
//!
//! A condition is always lowered into a branch that *skips* the guarded code,
//! so each construct needs exactly one test per iteration or entry.

use tracing::debug;

use crate::{
    asm::{END_ELSE, END_FOR, END_IF, END_WHILE, Instr, Label, START_FOR, START_WHILE},
    errors::{CompileError, CompileResult},
    function::{BlockEnd, FunctionCompiler},
    lexer::{Token, TokenKind},
    scanner::Cursor,
    state::BlockKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn from_token(token: Token<'_>) -> Option<Self> {
        Some(match token {
            Token::EqEq => Self::Eq,
            Token::BangEq => Self::Ne,
            Token::LAngle => Self::Lt,
            Token::LAngleEq => Self::Le,
            Token::RAngle => Self::Gt,
            Token::RAngleEq => Self::Ge,
            _ => return None,
        })
    }

    /// Operands are pushed right-hand side first.
    fn swaps_operands(self) -> bool {
        matches!(self, Self::Le | Self::Gt)
    }

    fn uses_slt(self) -> bool {
        !matches!(self, Self::Eq | Self::Ne)
    }

    /// The branch taken when the comparison does *not* hold.
    fn skip(self, target: Label) -> Instr {
        match self {
            Self::Eq | Self::Lt | Self::Gt => Instr::Bne(target),
            Self::Ne | Self::Le | Self::Ge => Instr::Beq(target),
        }
    }
}

/// Anything that may stand where a comparison operator is expected.
fn is_comparison_like(token: Token<'_>) -> bool {
    Comparison::from_token(token).is_some() || matches!(token, Token::Eq | Token::Bang)
}

impl<'t> FunctionCompiler<'_, 't> {
    /// Lowers `A <cmp> B` into code that jumps to `skip` when it is false.
    pub fn condition(&mut self, cond: &Cursor<'t>, skip: Label) -> CompileResult<()> {
        let Some((lhs, op, rhs)) = cond.split_once(is_comparison_like) else {
            let (span, line) = cond.here();
            return Err(CompileError::UnknownComparison { found: "no operator".to_owned(), line, span });
        };
        let Some(cmp) = Comparison::from_token(op.token) else {
            return Err(CompileError::unknown_comparison(op));
        };
        let (first, second) = if cmp.swaps_operands() { (rhs, lhs) } else { (lhs, rhs) };
        self.operand(first)?;
        self.operand(second)?;
        if cmp.uses_slt() {
            self.emit(Instr::Slt);
            self.push_imm(1);
        }
        self.emit(cmp.skip(skip));
        Ok(())
    }

    /// A `{ ... }` block or a single statement, compiled in a copy of the
    /// current scope.
    pub fn body(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        let saved = self.ctx.scope.clone();
        let result = self.scoped_body(cursor);
        self.ctx.scope = saved;
        result
    }

    fn scoped_body(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        if let Some(open) = cursor.eat(TokenKind::LBrace) {
            if let BlockEnd::Return(ret) = self.read_block(cursor, open)? {
                self.return_statement(cursor, ret, true)?;
                self.skip_block(cursor, open)?;
            }
            Ok(())
        } else if let Some(ret) = cursor.eat(TokenKind::Return) {
            self.return_statement(cursor, ret, true)
        } else {
            self.statement(cursor)
        }
    }

    pub fn compile_if(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        cursor.expect(TokenKind::If)?;
        let id = self.state.labels.next(BlockKind::If);
        let end_if = Label::block(END_IF, id);
        debug!(label = %end_if, "if");

        let cond = cursor.group()?;
        self.condition(&cond, end_if.clone())?;
        self.body(cursor)?;

        if cursor.eat(TokenKind::Else).is_some() {
            let end_else = Label::block(END_ELSE, id);
            self.jump(end_else.clone());
            self.label(end_if);
            self.body(cursor)?;
            self.label(end_else);
        } else {
            self.label(end_if);
        }
        Ok(())
    }

    pub fn compile_while(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        cursor.expect(TokenKind::While)?;
        let id = self.state.labels.next(BlockKind::While);
        let start = Label::block(START_WHILE, id);
        let end = Label::block(END_WHILE, id);
        debug!(label = %start, "while");

        self.label(start.clone());
        let cond = cursor.group()?;
        self.condition(&cond, end.clone())?;
        self.body(cursor)?;
        self.jump(start);
        self.label(end);
        Ok(())
    }

    /// `for (init; cond; step) body`. Each of the three clauses may be empty;
    /// variables declared by `init` live until the loop ends.
    pub fn compile_for(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        let keyword = cursor.expect(TokenKind::For)?;
        let id = self.state.labels.next(BlockKind::For);
        let start = Label::block(START_FOR, id);
        let end = Label::block(END_FOR, id);
        debug!(label = %start, "for");

        let header = cursor.group()?;
        let clauses = header.split_top_level(TokenKind::Semicolon);
        let Ok([mut init, cond, mut step]) = <[Cursor<'t>; 3]>::try_from(clauses) else {
            return Err(CompileError::unexpected(keyword, "`for (init; condition; step)`"));
        };

        let saved = self.ctx.scope.clone();
        if init.peek().is_some_and(|lexeme| lexeme.is(TokenKind::Int)) {
            self.declaration(&mut init)?;
        } else if !init.is_at_end() {
            self.simple_statement(&mut init)?;
        }
        init.expect_end("`;`")?;

        self.label(start.clone());
        if !cond.is_at_end() {
            self.condition(&cond, end.clone())?;
        }
        self.body(cursor)?;
        if !step.is_at_end() {
            self.simple_statement(&mut step)?;
            step.expect_end("`)`")?;
        }
        self.jump(start);
        self.label(end);
        self.ctx.scope = saved;
        Ok(())
    }
}
