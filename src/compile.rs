use miette::NamedSource;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    asm::{ENTRY_POINT, Program, is_reserved},
    errors::{CompileError, CompileResult},
    function::{Header, compile_function},
    lexer::{Token, TokenKind},
    scanner::{Cursor, TokenStream},
    state::{CompilerState, Signature},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct Options {
    /// Echo each source line as a `#` comment above its code.
    pub annotate: bool,
}

pub fn compile(name: &str, src: &str, options: Options) -> miette::Result<String> {
    compile_program(src, options).map(|program| program.to_string()).map_err(|err| {
        debug!(file = name, line = err.line(), "compilation failed");
        miette::Report::new(err).with_source_code(NamedSource::new(name, src.to_owned()))
    })
}

pub fn compile_program(src: &str, options: Options) -> CompileResult<Program> {
    let stream = TokenStream::lex(src)?;
    let signatures = signatures(stream.cursor())?;
    let mut state = CompilerState::new(options, signatures);
    let mut cursor = stream.cursor();
    while let Some(lexeme) = cursor.peek() {
        match lexeme.token {
            Token::Int | Token::Void => compile_function(&mut state, stream.lines(), &mut cursor)?,
            _ => return Err(CompileError::unexpected(lexeme, "a function definition")),
        }
    }
    if !state.signatures.contains_key(ENTRY_POINT) {
        let (span, line) = cursor.here();
        return Err(CompileError::MissingEntryPoint { line, span });
    }
    Ok(state.asm.finish())
}

/// Collects the header of every top-level function so that calls can be checked
/// before, or without, seeing the callee's body.
fn signatures(mut cursor: Cursor<'_>) -> CompileResult<FxHashMap<String, Signature>> {
    let mut signatures = FxHashMap::default();
    let mut depth = 0usize;
    while let Some(lexeme) = cursor.peek() {
        let is_header = depth == 0
            && matches!(lexeme.token, Token::Int | Token::Void)
            && cursor.peek_nth(1).is_some_and(|name| name.is(TokenKind::Ident))
            && cursor.peek_nth(2).is_some_and(|paren| paren.is(TokenKind::LParen));
        if !is_header {
            match lexeme.token {
                Token::LBrace => depth += 1,
                Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            cursor.bump();
            continue;
        }

        let header = Header::parse(&mut cursor)?;
        let signature = Signature { returns_value: header.returns_value(), arity: header.params()?.len() };
        let site = header.call.site;
        if is_reserved(header.call.name) {
            return Err(CompileError::ReservedName {
                name: header.call.name.to_owned(),
                line: site.line,
                span: site.span,
            });
        }
        debug!(function = header.call.name, arity = signature.arity, "found function");
        if signatures.insert(header.call.name.to_owned(), signature).is_some() {
            return Err(CompileError::DuplicateFunction {
                name: header.call.name.to_owned(),
                line: site.line,
                span: site.span,
            });
        }
    }
    Ok(signatures)
}
