use tracing::trace;

use crate::{
    asm::{ENTRY_POINT, Instr, Label, Operand},
    errors::{CompileError, CompileResult},
    function::FunctionCompiler,
    lexer::{Token, TokenKind},
    scanner::{Call, Cursor, Word, next_word},
    symtab::Designator,
};

impl<'t> FunctionCompiler<'_, 't> {
    /// `expr := term (('+'|'-') term)*`, emitted in postfix order. Stops before
    /// the first terminator, leaving it for the caller.
    pub fn expr(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        self.term(cursor)?;
        while let Some(lexeme) = cursor.peek() {
            let op = match lexeme.token {
                Token::Plus => Instr::Add,
                Token::Minus => Instr::Sub,
                Token::Star | Token::Slash => return Err(CompileError::unsupported(lexeme)),
                tok if tok.is_terminator() => break,
                _ => return Err(CompileError::unexpected(lexeme, "an operator or `;`")),
            };
            cursor.bump();
            self.term(cursor)?;
            self.emit(op);
        }
        Ok(())
    }

    /// An expression that must span the whole of `cursor`.
    pub fn operand(&mut self, mut cursor: Cursor<'t>) -> CompileResult<()> {
        self.expr(&mut cursor)?;
        cursor.expect_end("the end of the operand")
    }

    fn term(&mut self, cursor: &mut Cursor<'t>) -> CompileResult<()> {
        let Some(lexeme) = cursor.peek() else { return Err(cursor.eof("an operand")) };
        match lexeme.token {
            Token::LParen => {
                let inner = cursor.group()?;
                self.operand(inner)
            }
            Token::Minus => {
                cursor.bump();
                self.push_imm(0);
                self.term(cursor)?;
                self.emit(Instr::Sub);
                Ok(())
            }
            Token::Star | Token::Slash => Err(CompileError::unsupported(lexeme)),
            Token::Number(_) | Token::Ident(_) => {
                let Some((word, next)) = next_word(cursor.rest(), 0)? else {
                    return Err(cursor.eof("an operand"));
                };
                cursor.advance(next);
                match word {
                    Word::Number(int) => self.push_imm(int),
                    Word::Name(name) => {
                        let designator = self.resolve(name, lexeme)?;
                        self.load(&designator);
                    }
                    Word::Call(call) => self.call(call, true)?,
                    Word::Op(_) => return Err(CompileError::unexpected(lexeme, "an operand")),
                }
                Ok(())
            }
            _ => Err(CompileError::unexpected(lexeme, "an operand")),
        }
    }

    /// Emits a call site. Every variable of the current scope is saved on the
    /// machine stack across the call and restored afterwards in reverse order.
    pub fn call(&mut self, call: Call<'t>, as_value: bool) -> CompileResult<()> {
        let Call { name, args, site } = call;
        if name == ENTRY_POINT {
            return Err(CompileError::EntryPointCall { line: site.line, span: site.span });
        }
        let Some(signature) = self.state.signatures.get(name).copied() else {
            return Err(CompileError::UnknownFunction {
                name: name.to_owned(),
                line: site.line,
                span: site.span,
            });
        };
        if as_value && !signature.returns_value {
            return Err(CompileError::VoidValue {
                name: name.to_owned(),
                line: site.line,
                span: site.span,
            });
        }
        let args = args.split_top_level(TokenKind::Comma);
        if args.len() != signature.arity {
            return Err(CompileError::ArityMismatch {
                name: name.to_owned(),
                expected: signature.arity,
                found: args.len(),
                line: site.line,
                span: site.span,
            });
        }

        let depth = self.ctx.params.len();
        trace!(callee = name, spilled = self.ctx.scope.len(), "call");
        let live: Vec<Designator> =
            self.ctx.scope.iter().map(|(_, designator)| designator.clone()).collect();
        for designator in live {
            self.load(&designator);
            self.ctx.params.push(designator);
        }

        for arg in args {
            self.operand(arg)?;
        }
        self.emit(Instr::Pushi(Operand::Label(Label::Function(name.into()))));
        self.emit(Instr::Jpush);
        if signature.returns_value {
            self.store(&Designator::return_slot());
        }

        while self.ctx.params.len() > depth {
            let Some(designator) = self.ctx.params.pop() else { break };
            self.store(&designator);
        }
        if self.ctx.params.len() != depth {
            return Err(CompileError::StackImbalance {
                function: self.ctx.name.to_string(),
                remaining: self.ctx.params.len(),
                line: site.line,
                span: site.span,
            });
        }

        if as_value {
            self.load(&Designator::return_slot());
        }
        Ok(())
    }
}
