use std::{fmt, num::ParseIntError};

use logos::Logos;

#[derive(Default, Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("integer literal out of range: {0}")]
    Int(#[from] ParseIntError),
    #[default]
    #[error("unrecognized character")]
    Unknown,
}

#[derive(Debug, Logos, Clone, Copy, PartialEq, Eq, macros::EnumKind)]
#[enum_kind(TokenKind)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
#[rustfmt::skip]
pub enum Token<'src> {
    // Symbols
    #[token("(")] LParen,
    #[token(")")] RParen,
    #[token("{")] LBrace,
    #[token("}")] RBrace,
    #[token(",")] Comma,
    #[token(";")] Semicolon,
    #[token("+")] Plus,
    #[token("-")] Minus,
    #[token("*")] Star,
    #[token("/")] Slash,
    #[token("=")] Eq,
    #[token("+=")] PlusEq,
    #[token("-=")] MinusEq,
    #[token("==")] EqEq,
    #[token("!=")] BangEq,
    #[token("!")] Bang,
    #[token("<")] LAngle,
    #[token("<=")] LAngleEq,
    #[token(">")] RAngle,
    #[token(">=")] RAngleEq,
    // Keywords
    #[token("int")] Int,
    #[token("void")] Void,
    #[token("if")] If,
    #[token("else")] Else,
    #[token("while")] While,
    #[token("for")] For,
    #[token("return")] Return,
    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse())]
    Number(i64),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),
}

impl<'src> Token<'src> {
    pub fn kind(self) -> TokenKind {
        TokenKind::from(self)
    }

    /// The text of an identifier or keyword; `None` for everything else.
    pub fn name(self) -> Option<&'src str> {
        match self {
            Self::Ident(ident) => Some(ident),
            tok if tok.kind().is_keyword() => Some(tok.kind().repr()),
            _ => None,
        }
    }

    /// Tokens that end an expression without belonging to it.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Semicolon
                | Self::Comma
                | Self::RParen
                | Self::Eq
                | Self::Bang
                | Self::EqEq
                | Self::BangEq
                | Self::LAngle
                | Self::LAngleEq
                | Self::RAngle
                | Self::RAngleEq
        )
    }
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            Self::Int | Self::Void | Self::If | Self::Else | Self::While | Self::For | Self::Return
        )
    }

    pub fn repr(self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Eq => "=",
            Self::PlusEq => "+=",
            Self::MinusEq => "-=",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::Bang => "!",
            Self::LAngle => "<",
            Self::LAngleEq => "<=",
            Self::RAngle => ">",
            Self::RAngleEq => ">=",
            Self::Int => "int",
            Self::Void => "void",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::For => "for",
            Self::Return => "return",
            Self::Number => "number",
            Self::Ident => "identifier",
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(int) => write!(f, "{int}"),
            Self::Ident(ident) => write!(f, "{ident}"),
            tok => write!(f, "{}", tok.kind()),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}
