//! Line cleaning, tokenization and word extraction.
//!
//! Source text is split into [`SourceLine`]s (comment suffix stripped, whitespace
//! trimmed), each line is lexed into [`Lexeme`]s, and the compiler walks the
//! resulting stream through a [`Cursor`]. [`next_word`] gives the word-level view
//! used for operands, call sites and function headers.

use logos::Logos;
use miette::SourceSpan;

use crate::{
    errors::{CompileError, CompileResult},
    lexer::{LexError, Token, TokenKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'src> {
    /// 1-based.
    pub number: usize,
    /// Byte offset of `text` in the whole source.
    pub offset: usize,
    pub text: &'src str,
}

/// Strips a `//` comment and surrounding whitespace, returning the offset of the
/// kept text inside `raw` together with the text itself.
pub fn clean_line(raw: &str) -> (usize, &str) {
    let code = raw.find("//").map_or(raw, |comment| &raw[..comment]);
    let trimmed = code.trim_start();
    (code.len() - trimmed.len(), trimmed.trim_end())
}

pub fn source_lines(src: &str) -> impl Iterator<Item = SourceLine<'_>> {
    let mut offset = 0;
    src.split_inclusive('\n').enumerate().map(move |(i, raw)| {
        let (start, text) = clean_line(raw);
        let line = SourceLine { number: i + 1, offset: offset + start, text };
        offset += raw.len();
        line
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lexeme<'src> {
    pub token: Token<'src>,
    pub span: SourceSpan,
    pub line: usize,
}

impl Lexeme<'_> {
    pub fn kind(&self) -> TokenKind {
        self.token.kind()
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }
}

#[derive(Debug, Default)]
pub struct TokenStream<'src> {
    lines: Vec<SourceLine<'src>>,
    lexemes: Vec<Lexeme<'src>>,
    end: usize,
}

impl<'src> TokenStream<'src> {
    pub fn lex(src: &'src str) -> CompileResult<Self> {
        let mut stream = Self { end: src.len(), ..Self::default() };
        for line in source_lines(src) {
            let mut lexer = Token::lexer(line.text);
            while let Some(token) = lexer.next() {
                let span = lexer.span();
                let span: SourceSpan = (line.offset + span.start, span.len()).into();
                let token = token.map_err(|err| CompileError::Lex {
                    reason: match err {
                        LexError::Unknown => format!("unexpected `{}`", lexer.slice()),
                        err => err.to_string(),
                    },
                    line: line.number,
                    span,
                })?;
                stream.lexemes.push(Lexeme { token, span, line: line.number });
            }
            stream.lines.push(line);
        }
        Ok(stream)
    }

    pub fn lines(&self) -> &[SourceLine<'src>] {
        &self.lines
    }

    pub fn lexemes(&self) -> &[Lexeme<'src>] {
        &self.lexemes
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.lexemes, (self.end, 0).into(), self.lines.len().max(1))
    }
}

/// A position inside a run of lexemes. Sub-cursors over argument lists and
/// conditions remember where their run ends so that errors at the end still
/// point somewhere sensible.
#[derive(Debug, Clone)]
pub struct Cursor<'t> {
    lexemes: &'t [Lexeme<'t>],
    pos: usize,
    end: SourceSpan,
    end_line: usize,
}

impl<'t> Cursor<'t> {
    pub fn new(lexemes: &'t [Lexeme<'t>], end: SourceSpan, end_line: usize) -> Self {
        Self { lexemes, pos: 0, end, end_line }
    }

    pub fn peek(&self) -> Option<&'t Lexeme<'t>> {
        self.lexemes.get(self.pos)
    }

    pub fn peek_token(&self) -> Option<Token<'t>> {
        self.peek().map(|lexeme| lexeme.token)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&'t Lexeme<'t>> {
        self.lexemes.get(self.pos + n)
    }

    pub fn bump(&mut self) -> Option<&'t Lexeme<'t>> {
        let lexeme = self.peek()?;
        self.pos += 1;
        Some(lexeme)
    }

    pub fn rest(&self) -> &'t [Lexeme<'t>] {
        &self.lexemes[self.pos..]
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.lexemes.len());
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.lexemes.len()
    }

    pub fn eat(&mut self, kind: TokenKind) -> Option<&'t Lexeme<'t>> {
        if self.peek()?.is(kind) { self.bump() } else { None }
    }

    pub fn expect(&mut self, kind: TokenKind) -> CompileResult<&'t Lexeme<'t>> {
        match self.peek() {
            Some(lexeme) if lexeme.is(kind) => {
                self.pos += 1;
                Ok(lexeme)
            }
            Some(lexeme) => Err(CompileError::unexpected(lexeme, format!("`{kind}`"))),
            None => Err(self.eof(format!("`{kind}`"))),
        }
    }

    pub fn expect_ident(&mut self) -> CompileResult<(&'t str, &'t Lexeme<'t>)> {
        let Some(lexeme) = self.peek() else { return Err(self.eof("an identifier")) };
        match lexeme.token {
            Token::Ident(ident) => {
                self.pos += 1;
                Ok((ident, lexeme))
            }
            _ => Err(CompileError::unexpected(lexeme, "an identifier")),
        }
    }

    /// Fails unless every lexeme has been consumed.
    pub fn expect_end(&self, expected: &str) -> CompileResult<()> {
        match self.peek() {
            Some(lexeme) => Err(CompileError::unexpected(lexeme, expected)),
            None => Ok(()),
        }
    }

    #[cold]
    #[inline(never)]
    pub fn eof(&self, expected: impl Into<String>) -> CompileError {
        CompileError::UnexpectedEof { expected: expected.into(), line: self.end_line, span: self.end }
    }

    /// Span of the next lexeme, or of the end of this run.
    pub fn here(&self) -> (SourceSpan, usize) {
        self.peek().map_or((self.end, self.end_line), |lexeme| (lexeme.span, lexeme.line))
    }

    /// Consumes a `( ... )` group and returns a cursor over its contents.
    pub fn group(&mut self) -> CompileResult<Cursor<'t>> {
        let open = self.expect(TokenKind::LParen)?;
        let close = matching_paren(self.lexemes, self.pos - 1).ok_or_else(|| unclosed(open))?;
        let inner = Cursor::new(&self.lexemes[self.pos..close], self.lexemes[close].span, open.line);
        self.pos = close + 1;
        Ok(inner)
    }

    /// Splits the remaining lexemes on `sep` at parenthesis depth zero. An empty
    /// run yields no pieces at all.
    pub fn split_top_level(&self, sep: TokenKind) -> Vec<Cursor<'t>> {
        let rest = self.rest();
        if rest.is_empty() {
            return vec![];
        }
        let mut pieces = vec![];
        let mut depth = 0usize;
        let mut start = 0;
        for (i, lexeme) in rest.iter().enumerate() {
            match lexeme.token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ if depth == 0 && lexeme.is(sep) => {
                    pieces.push(Cursor::new(&rest[start..i], lexeme.span, lexeme.line));
                    start = i + 1;
                }
                _ => {}
            }
        }
        pieces.push(Cursor::new(&rest[start..], self.end, self.end_line));
        pieces
    }

    /// Splits the remaining lexemes around the first one at parenthesis depth
    /// zero that satisfies `pred`.
    pub fn split_once(
        &self,
        pred: impl Fn(Token<'t>) -> bool,
    ) -> Option<(Cursor<'t>, &'t Lexeme<'t>, Cursor<'t>)> {
        let rest = self.rest();
        let mut depth = 0usize;
        for (i, lexeme) in rest.iter().enumerate() {
            match lexeme.token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                tok if depth == 0 && pred(tok) => {
                    let lhs = Cursor::new(&rest[..i], lexeme.span, lexeme.line);
                    let rhs = Cursor::new(&rest[i + 1..], self.end, self.end_line);
                    return Some((lhs, lexeme, rhs));
                }
                _ => {}
            }
        }
        None
    }
}

fn matching_paren(lexemes: &[Lexeme<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, lexeme) in lexemes.iter().enumerate().skip(open) {
        match lexeme.token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cold]
#[inline(never)]
fn unclosed(open: &Lexeme<'_>) -> CompileError {
    CompileError::Lex { reason: "unclosed `(`".to_owned(), line: open.line, span: open.span }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
pub struct Call<'t> {
    pub name: &'t str,
    pub args: Cursor<'t>,
    /// The callee identifier.
    pub site: &'t Lexeme<'t>,
}

#[derive(Debug, Clone)]
pub enum Word<'t> {
    Number(i64),
    /// An identifier or keyword.
    Name(&'t str),
    Op(ArithOp),
    Call(Call<'t>),
}

/// Returns the next word at or after `pos` and the position just past it.
///
/// Lexemes that are neither words nor arithmetic operators are skipped. An
/// identifier directly followed by `(` swallows the balanced group as its
/// argument list.
pub fn next_word<'t>(
    lexemes: &'t [Lexeme<'t>],
    mut pos: usize,
) -> CompileResult<Option<(Word<'t>, usize)>> {
    while let Some(lexeme) = lexemes.get(pos) {
        let word = match lexeme.token {
            Token::Plus => Word::Op(ArithOp::Add),
            Token::Minus => Word::Op(ArithOp::Sub),
            Token::Star => Word::Op(ArithOp::Mul),
            Token::Slash => Word::Op(ArithOp::Div),
            Token::Number(int) => Word::Number(int),
            Token::Ident(name) if lexemes.get(pos + 1).is_some_and(|l| l.is(TokenKind::LParen)) => {
                let close = matching_paren(lexemes, pos + 1).ok_or_else(|| unclosed(&lexemes[pos + 1]))?;
                let args = Cursor::new(&lexemes[pos + 2..close], lexemes[close].span, lexeme.line);
                return Ok(Some((Word::Call(Call { name, args, site: lexeme }), close + 1)));
            }
            tok => match tok.name() {
                Some(name) => Word::Name(name),
                None => {
                    pos += 1;
                    continue;
                }
            },
        };
        return Ok(Some((word, pos + 1)));
    }
    Ok(None)
}
