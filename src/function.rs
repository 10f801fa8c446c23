//! Function headers, parameter binding, statement dispatch and epilogues.

use tracing::{debug, trace, warn};

use crate::{
    asm::{ENTRY_POINT, Instr, Label, Operand, Owner, is_reserved},
    errors::{CompileError, CompileResult},
    lexer::{Token, TokenKind},
    scanner::{Call, Cursor, Lexeme, SourceLine, Word, next_word},
    state::{CompilerState, FunctionContext, ReturnKind},
    symtab::Designator,
};

/// `int|void name(params)`
pub struct Header<'t> {
    pub keyword: &'t Lexeme<'t>,
    pub call: Call<'t>,
}

impl<'t> Header<'t> {
    pub fn parse(cursor: &mut Cursor<'t>) -> CompileResult<Self> {
        let keyword = match cursor.peek() {
            Some(lexeme) if matches!(lexeme.token, Token::Int | Token::Void) => lexeme,
            Some(lexeme) => return Err(CompileError::unexpected(lexeme, "`int` or `void`")),
            None => return Err(cursor.eof("`int` or `void`")),
        };
        cursor.bump();
        match cursor.peek() {
            Some(Lexeme { token: Token::Ident(_), .. }) => {}
            Some(lexeme) => return Err(CompileError::unexpected(lexeme, "a function name")),
            None => return Err(cursor.eof("a function name")),
        }
        match next_word(cursor.rest(), 0)? {
            Some((Word::Call(call), next)) => {
                cursor.advance(next);
                Ok(Self { keyword, call })
            }
            _ => match cursor.peek_nth(1) {
                Some(lexeme) => Err(CompileError::unexpected(lexeme, "`(`")),
                None => Err(cursor.eof("`(`")),
            },
        }
    }

    pub fn returns_value(&self) -> bool {
        self.keyword.is(TokenKind::Int)
    }

    /// Every `int name` pair inside the parentheses, left to right.
    pub fn params(&self) -> CompileResult<Vec<&'t Lexeme<'t>>> {
        let lexemes = self.call.args.rest();
        let mut params = vec![];
        let mut after_int = false;
        let mut pos = 0;
        while let Some((word, next)) = next_word(lexemes, pos)? {
            match word {
                Word::Name(_) if lexemes[next - 1].is(TokenKind::Int) => after_int = true,
                Word::Name(_) if after_int && lexemes[next - 1].is(TokenKind::Ident) => {
                    params.push(&lexemes[next - 1]);
                    after_int = false;
                }
                _ => after_int = false,
            }
            pos = next;
        }
        Ok(params)
    }
}

/// How a statement block stopped.
pub enum BlockEnd<'t> {
    Brace,
    Return(&'t Lexeme<'t>),
}

pub struct FunctionCompiler<'c, 't> {
    pub state: &'c mut CompilerState,
    pub lines: &'t [SourceLine<'t>],
    pub ctx: FunctionContext,
}

/// Compiles one function definition, header to closing brace.
pub fn compile_function<'t>(
    state: &mut CompilerState,
    lines: &'t [SourceLine<'t>],
    cursor: &mut Cursor<'t>,
) -> CompileResult<()> {
    let header = Header::parse(cursor)?;
    let name = header.call.name;
    let kind = match (name, header.returns_value()) {
        (ENTRY_POINT, _) => ReturnKind::EntryPoint,
        (_, true) => ReturnKind::Int,
        (_, false) => ReturnKind::Void,
    };
    debug!(function = name, ?kind, "compiling function");

    let mut compiler = FunctionCompiler { state, lines, ctx: FunctionContext::new(name, kind) };
    compiler.annotate(header.keyword.line);
    compiler.bind_params(&header)?;
    let open = cursor.expect(TokenKind::LBrace)?;
    compiler.function_body(cursor, open)?;
    compiler.state.asm.end_function(kind == ReturnKind::EntryPoint);
    Ok(())
}

impl<'t> FunctionCompiler<'_, 't> {
    pub fn emit(&mut self, instr: Instr) {
        self.state.asm.insert(instr);
    }

    pub fn label(&mut self, label: Label) {
        self.state.asm.insert_label(label);
    }

    pub fn push_imm(&mut self, int: i64) {
        self.emit(Instr::Pushi(Operand::Imm(int)));
    }

    /// `pushi d; push`
    pub fn load(&mut self, designator: &Designator) {
        self.emit(Instr::Pushi(Operand::Global(designator.clone())));
        self.emit(Instr::Push);
    }

    /// `pushi d; pop`
    pub fn store(&mut self, designator: &Designator) {
        self.emit(Instr::Pushi(Operand::Global(designator.clone())));
        self.emit(Instr::Pop);
    }

    pub fn jump(&mut self, label: Label) {
        self.emit(Instr::Pushi(Operand::Label(label)));
        self.emit(Instr::Jpop);
    }

    pub fn resolve(&self, name: &str, lexeme: &Lexeme<'_>) -> CompileResult<Designator> {
        self.ctx.scope.lookup(name).cloned().ok_or_else(|| CompileError::unbound(lexeme, name))
    }

    /// Echoes a source line as a comment the first time code for it is emitted.
    pub fn annotate(&mut self, line: usize) {
        if !self.state.options.annotate || line <= self.state.annotated_line {
            return;
        }
        self.state.annotated_line = line;
        if let Some(src) = self.lines.get(line - 1) {
            self.state.asm.comment(format!("{}: {}", src.number, src.text));
        }
    }

    fn bind_params(&mut self, header: &Header<'t>) -> CompileResult<()> {
        for param in header.params()? {
            let Token::Ident(name) = param.token else { continue };
            let designator = self.declare(name, param)?;
            self.ctx.params.push(designator);
        }
        self.label(Label::Function(self.ctx.name.clone()));
        while let Some(designator) = self.ctx.params.pop() {
            self.store(&designator);
        }
        Ok(())
    }

    /// Binds `name` in the current scope and reserves its global cell.
    fn declare(&mut self, name: &str, lexeme: &Lexeme<'_>) -> CompileResult<Designator> {
        let designator = self.ctx.scope.insert(name).ok_or_else(|| {
            CompileError::DuplicateDeclaration {
                name: name.to_owned(),
                line: lexeme.line,
                span: lexeme.span,
            }
        })?;
        let collision = |other: String| CompileError::NameCollision {
            name: name.to_owned(),
            designator: designator.to_string(),
            other,
            line: lexeme.line,
            span: lexeme.span,
        };
        if self.state.signatures.contains_key(designator.as_str()) {
            return Err(collision(format!("the function `{designator}`")));
        }
        if is_reserved(designator.as_str()) {
            return Err(collision("a generated label".to_owned()));
        }
        let owner = Owner { function: self.ctx.name.clone(), name: name.into() };
        self.state
            .asm
            .declare_global(&designator, owner)
            .map_err(|other| collision(other.to_string()))?;
        Ok(designator)
    }

    fn function_body(&mut self, cursor: &mut Cursor<'t>, open: &'t Lexeme<'t>) -> CompileResult<()> {
        match self.read_block(cursor, open)? {
            BlockEnd::Return(ret) => {
                self.return_statement(cursor, ret, false)?;
                self.skip_block(cursor, open)?;
            }
            BlockEnd::Brace => match self.ctx.kind {
                ReturnKind::Int => {
                    warn!(function = &*self.ctx.name, "function ends without `return`, returning 0");
                    self.push_imm(0);
                    self.emit(Instr::Jr);
                }
                ReturnKind::Void => self.emit(Instr::Jr),
                ReturnKind::EntryPoint => {}
            },
        }
        if self.ctx.early_exit {
            self.label(Label::Exit(self.ctx.name.clone()));
        }
        if !self.ctx.params.is_empty() {
            return Err(CompileError::StackImbalance {
                function: self.ctx.name.to_string(),
                remaining: self.ctx.params.len(),
                line: open.line,
                span: open.span,
            });
        }
        Ok(())
    }

    /// Compiles statements up to the block's `}` or a `return`, consuming either.
    pub fn read_block(
        &mut self,
        cursor: &mut Cursor<'t>,
        open: &'t Lexeme<'t>,
    ) -> CompileResult<BlockEnd<'t>> {
        loop {
            let Some(lexeme) = cursor.peek() else {
                return Err(CompileError::UnbalancedBlock { line: open.line, span: open.span });
            };
            match lexeme.token {
                Token::RBrace => {
                    cursor.bump();
                    return Ok(BlockEnd::Brace);
                }
                Token::Return => {
                    cursor.bump();
                    return Ok(BlockEnd::Return(lexeme));
                }
                _ => self.statement(cursor)?,
            }
        }
    }

    /// Discards everything up to the `}` matching `open`.
    pub fn skip_block(&mut self, cursor: &mut Cursor<'t>, open: &'t Lexeme<'t>) -> CompileResult<()> {
        let mut depth = 0usize;
        let mut skipped = 0usize;
        while let Some(lexeme) = cursor.bump() {
            match lexeme.token {
                Token::LBrace => depth += 1,
                Token::RBrace if depth == 0 => {
                    if skipped > 0 {
                        warn!(
                            function = &*self.ctx.name,
                            line = lexeme.line,
                            "unreachable code after `return` ignored"
                        );
                    }
                    return Ok(());
                }
                Token::RBrace => depth -= 1,
                _ => {}
            }
            skipped += 1;
        }
        Err(CompileError::UnbalancedBlock { line: open.line, span: open.span })
    }

    pub fn statement(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        let Some(lexeme) = cursor.peek() else { return Err(cursor.eof("a statement")) };
        self.annotate(lexeme.line);
        trace!(line = lexeme.line, token = %lexeme.token, "statement");
        match lexeme.token {
            Token::If => self.compile_if(cursor),
            Token::While => self.compile_while(cursor),
            Token::For => self.compile_for(cursor),
            Token::LBrace => self.body(cursor),
            Token::Semicolon => {
                cursor.bump();
                Ok(())
            }
            Token::Int => {
                self.declaration(cursor)?;
                cursor.expect(TokenKind::Semicolon).map(drop)
            }
            Token::Else | Token::Void | Token::RBrace | Token::Return => {
                Err(CompileError::unexpected(lexeme, "a statement"))
            }
            _ => {
                self.simple_statement(cursor)?;
                cursor.expect(TokenKind::Semicolon).map(drop)
            }
        }
    }

    /// `int a = e, b` without the trailing `;`.
    pub fn declaration(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        cursor.expect(TokenKind::Int)?;
        loop {
            let (name, lexeme) = cursor.expect_ident()?;
            let designator = self.declare(name, lexeme)?;
            if cursor.eat(TokenKind::Eq).is_some() {
                self.expr(cursor)?;
                self.store(&designator);
            }
            if cursor.eat(TokenKind::Comma).is_none() {
                return Ok(());
            }
        }
    }

    /// An assignment or a bare expression, without the trailing `;`.
    pub fn simple_statement(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        let op = cursor.peek_nth(1).and_then(|lexeme| match lexeme.token {
            Token::Eq => Some(None),
            Token::PlusEq => Some(Some(Instr::Add)),
            Token::MinusEq => Some(Some(Instr::Sub)),
            _ => None,
        });
        match (cursor.peek_token(), op) {
            (Some(Token::Ident(_)), Some(op)) => self.assignment(cursor, op),
            _ => self.bare_expression(cursor),
        }
    }

    fn assignment(&mut self, cursor: &mut Cursor<'t>, op: Option<Instr>) -> CompileResult<()> {
        let (name, lexeme) = cursor.expect_ident()?;
        let designator = self.resolve(name, lexeme)?;
        cursor.bump();
        match op {
            Some(op) => {
                self.load(&designator);
                self.expr(cursor)?;
                self.emit(op);
            }
            None => self.expr(cursor)?,
        }
        self.store(&designator);
        Ok(())
    }

    fn bare_expression(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        if matches!(cursor.peek_token(), Some(Token::Ident(_))) {
            if let Some((Word::Call(call), next)) = next_word(cursor.rest(), 0)? {
                let lone = cursor.rest().get(next).is_none_or(|lexeme| lexeme.is(TokenKind::Semicolon));
                if lone {
                    cursor.advance(next);
                    return self.call(call, false);
                }
            }
        }
        self.expr(cursor)?;
        self.store(&Designator::return_slot());
        Ok(())
    }

    /// Compiles what follows a `return` keyword, up to and including its `;`.
    pub fn return_statement(
        &mut self,
        cursor: &mut Cursor<'t>,
        ret: &'t Lexeme<'t>,
        nested: bool,
    ) -> CompileResult<()> {
        self.annotate(ret.line);
        let has_value = !cursor.peek().is_some_and(|lexeme| lexeme.is(TokenKind::Semicolon));
        let mismatch = match (self.ctx.kind, has_value) {
            (ReturnKind::Int, false) => Some("missing return value"),
            (ReturnKind::Void, true) => Some("unexpected return value"),
            _ => None,
        };
        if let Some(reason) = mismatch {
            return Err(CompileError::ReturnValue {
                reason,
                function: self.ctx.name.to_string(),
                line: ret.line,
                span: ret.span,
            });
        }
        match (self.ctx.kind, has_value) {
            (ReturnKind::Int, true) => self.expr(cursor)?,
            (ReturnKind::EntryPoint, true) => {
                self.expr(cursor)?;
                self.store(&Designator::return_slot());
            }
            _ => {}
        }
        cursor.expect(TokenKind::Semicolon)?;
        match self.ctx.kind {
            ReturnKind::EntryPoint if nested => {
                self.ctx.early_exit = true;
                self.jump(Label::Exit(self.ctx.name.clone()));
            }
            ReturnKind::EntryPoint => {}
            ReturnKind::Int | ReturnKind::Void => self.emit(Instr::Jr),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::*;
    use crate::{compile::Options, scanner::TokenStream};

    #[test]
    fn leftover_params_are_a_stack_imbalance() {
        let stream = TokenStream::lex("{ }").unwrap();
        let mut cursor = stream.cursor();
        let open = cursor.expect(TokenKind::LBrace).unwrap();

        let mut state = CompilerState::new(Options::default(), FxHashMap::default());
        let mut compiler = FunctionCompiler {
            state: &mut state,
            lines: stream.lines(),
            ctx: FunctionContext::new("f", ReturnKind::Void),
        };
        compiler.ctx.params.push(Designator::qualified("f", "a"));
        let err = compiler.function_body(&mut cursor, open).unwrap_err();
        assert!(matches!(err, CompileError::StackImbalance { remaining: 1, .. }));
    }

    #[test]
    fn header_params_skip_types_and_commas() {
        let stream = TokenStream::lex("int f(int a, int b, int c) {").unwrap();
        let header = Header::parse(&mut stream.cursor()).unwrap();
        let names: Vec<_> = header.params().unwrap().iter().map(|param| param.token.to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(header.returns_value());

        let stream = TokenStream::lex("void g(void)").unwrap();
        let header = Header::parse(&mut stream.cursor()).unwrap();
        assert!(header.params().unwrap().is_empty());
        assert!(!header.returns_value());
    }
}
