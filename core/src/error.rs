//! A single error type shared across every subsystem (lexer through
//! interpreter), so callers have one thing to match on.

use std::fmt;

/// Source position attached to lex/parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug)]
pub enum XvmError {
    /// Bad character, unterminated string/char literal.
    Lex { loc: SourceLoc, message: String },
    /// Unknown mnemonic, missing operand, malformed directive.
    Parse { loc: SourceLoc, message: String },
    /// Unresolved label/variable, duplicate definition.
    Resolve(String),
    /// Missing required section, symbol collision at link time.
    Link(String),
    /// Bad magic, missing code section.
    Load(String),
    /// Stack under/overflow, division by zero, unknown opcode/syscall, ip
    /// out of range.
    Runtime(String),
    /// File access failure.
    Io(std::io::Error),
}

impl fmt::Display for XvmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex { loc, message } => write!(f, "{loc}: lex error: {message}"),
            Self::Parse { loc, message } => write!(f, "{loc}: parse error: {message}"),
            Self::Resolve(message) => write!(f, "resolve error: {message}"),
            Self::Link(message) => write!(f, "link error: {message}"),
            Self::Load(message) => write!(f, "load error: {message}"),
            Self::Runtime(message) => write!(f, "runtime error: {message}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for XvmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for XvmError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, XvmError>;
