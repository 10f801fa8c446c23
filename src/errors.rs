use miette::{Diagnostic, SourceSpan};

use crate::{lexer::Token, scanner::Lexeme};

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum CompileError {
    #[error("malformed input on line {line}: {reason}")]
    #[diagnostic(code(jalac::lex))]
    Lex {
        reason: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("cannot find variable `{name}` in this scope")]
    #[diagnostic(code(jalac::unbound_variable))]
    UnboundVariable {
        name: String,
        line: usize,
        #[label("not found in this scope")]
        span: SourceSpan,
    },

    #[error("unknown comparison `{found}` on line {line}")]
    #[diagnostic(
        code(jalac::unknown_comparison),
        help("conditions must compare two expressions with one of == != < <= > >=")
    )]
    UnknownComparison {
        found: String,
        line: usize,
        #[label("expected a comparison operator")]
        span: SourceSpan,
    },

    #[error("block opened on line {line} is never closed")]
    #[diagnostic(code(jalac::unbalanced_block))]
    UnbalancedBlock {
        line: usize,
        #[label("this `{{` has no matching `}}`")]
        span: SourceSpan,
    },

    #[error("{remaining} value(s) left on the parameter stack in `{function}`")]
    #[diagnostic(code(jalac::stack_imbalance))]
    StackImbalance {
        function: String,
        remaining: usize,
        line: usize,
        #[label("stack is unbalanced here")]
        span: SourceSpan,
    },

    #[error("`{name}` is already declared in this scope")]
    #[diagnostic(code(jalac::duplicate_declaration))]
    DuplicateDeclaration {
        name: String,
        line: usize,
        #[label("declared again here")]
        span: SourceSpan,
    },

    #[error("function `{name}` is defined more than once")]
    #[diagnostic(code(jalac::duplicate_function))]
    DuplicateFunction {
        name: String,
        line: usize,
        #[label("defined again here")]
        span: SourceSpan,
    },

    #[error("function name `{name}` clashes with a generated label or global")]
    #[diagnostic(
        code(jalac::reserved_name),
        help("`res`, `end_main` and block labels such as `end_if_0` or `start_while_0` are reserved")
    )]
    ReservedName {
        name: String,
        line: usize,
        #[label("defined here")]
        span: SourceSpan,
    },

    #[error("`{name}` would share the global `{designator}` with {other}")]
    #[diagnostic(code(jalac::name_collision), help("rename one of them"))]
    NameCollision {
        name: String,
        designator: String,
        other: String,
        line: usize,
        #[label("declared here")]
        span: SourceSpan,
    },

    #[error("no `main` function defined")]
    #[diagnostic(code(jalac::missing_entry_point), help("the program starts in `void main()`"))]
    MissingEntryPoint {
        line: usize,
        #[label("end of input")]
        span: SourceSpan,
    },

    #[error("`main` cannot be called")]
    #[diagnostic(code(jalac::entry_point_call), help("`main` never returns to its caller"))]
    EntryPointCall {
        line: usize,
        #[label("called here")]
        span: SourceSpan,
    },

    #[error("cannot find function `{name}`")]
    #[diagnostic(code(jalac::unknown_function))]
    UnknownFunction {
        name: String,
        line: usize,
        #[label("not defined anywhere in this file")]
        span: SourceSpan,
    },

    #[error("`{name}` takes {expected} argument(s) but {found} were supplied")]
    #[diagnostic(code(jalac::arity_mismatch))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        line: usize,
        #[label("called here")]
        span: SourceSpan,
    },

    #[error("`{name}` does not return a value")]
    #[diagnostic(code(jalac::void_value), help("call it as a statement instead"))]
    VoidValue {
        name: String,
        line: usize,
        #[label("used as a value here")]
        span: SourceSpan,
    },

    #[error("operator `{op}` is not supported")]
    #[diagnostic(code(jalac::unsupported_operator), help("only `+` and `-` are available"))]
    UnsupportedOperator {
        op: String,
        line: usize,
        #[label("unsupported")]
        span: SourceSpan,
    },

    #[error("{reason} in `{function}`")]
    #[diagnostic(code(jalac::return_value))]
    ReturnValue {
        reason: &'static str,
        function: String,
        line: usize,
        #[label("this return")]
        span: SourceSpan,
    },

    #[error("expected {expected}, got `{found}`")]
    #[diagnostic(code(jalac::unexpected_token))]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        #[label("expected {expected} here")]
        span: SourceSpan,
    },

    #[error("expected {expected}, got end of input")]
    #[diagnostic(code(jalac::unexpected_eof))]
    UnexpectedEof {
        expected: String,
        line: usize,
        #[label("input ends here")]
        span: SourceSpan,
    },
}

impl CompileError {
    pub fn line(&self) -> usize {
        match *self {
            Self::Lex { line, .. }
            | Self::UnboundVariable { line, .. }
            | Self::UnknownComparison { line, .. }
            | Self::UnbalancedBlock { line, .. }
            | Self::StackImbalance { line, .. }
            | Self::DuplicateDeclaration { line, .. }
            | Self::DuplicateFunction { line, .. }
            | Self::ReservedName { line, .. }
            | Self::NameCollision { line, .. }
            | Self::MissingEntryPoint { line, .. }
            | Self::EntryPointCall { line, .. }
            | Self::UnknownFunction { line, .. }
            | Self::ArityMismatch { line, .. }
            | Self::VoidValue { line, .. }
            | Self::UnsupportedOperator { line, .. }
            | Self::ReturnValue { line, .. }
            | Self::UnexpectedToken { line, .. }
            | Self::UnexpectedEof { line, .. } => line,
        }
    }

    #[cold]
    #[inline(never)]
    pub fn unexpected(found: &Lexeme<'_>, expected: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.token.to_string(),
            line: found.line,
            span: found.span,
        }
    }

    #[cold]
    #[inline(never)]
    pub fn unbound(lexeme: &Lexeme<'_>, name: &str) -> Self {
        Self::UnboundVariable { name: name.to_owned(), line: lexeme.line, span: lexeme.span }
    }

    #[cold]
    #[inline(never)]
    pub fn unsupported(lexeme: &Lexeme<'_>) -> Self {
        Self::UnsupportedOperator {
            op: lexeme.token.to_string(),
            line: lexeme.line,
            span: lexeme.span,
        }
    }

    #[cold]
    #[inline(never)]
    pub fn unknown_comparison(lexeme: &Lexeme<'_>) -> Self {
        let found = match lexeme.token {
            Token::Eq | Token::Bang => lexeme.token.to_string(),
            _ => "no operator".to_owned(),
        };
        Self::UnknownComparison { found, line: lexeme.line, span: lexeme.span }
    }
}
