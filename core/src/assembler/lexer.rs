//! Tokenizer: byte-slice index + line counter, per spec.md §9 design notes
//! (the original carries a pointer into the source string). Grounded on the
//! tokenizer half of `original_source/src/assembler.cc`.

use super::token::{Token, TokenKind};
use crate::error::{SourceLoc, XvmError};

const PUNCT: &[char] = &['%', ':', '.', '@', '$', '+', '-', '*'];

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    filename: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, filename: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            filename,
        }
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc {
            file: self.filename.to_string(),
            line: self.line,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_line_comment(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn read_escape(&mut self) -> Result<u8, XvmError> {
        match self.advance() {
            Some(b'\\') => Ok(b'\\'),
            Some(b'n') => Ok(b'\n'),
            Some(b't') => Ok(b'\t'),
            Some(b'r') => Ok(b'\r'),
            Some(b'"') => Ok(b'"'),
            Some(b'\'') => Ok(b'\''),
            Some(other) => Ok(other),
            None => Err(XvmError::Lex {
                loc: self.loc(),
                message: "unterminated escape sequence".into(),
            }),
        }
    }

    fn read_string(&mut self) -> Result<Token, XvmError> {
        let loc = self.loc();
        let mut out = String::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => out.push(self.read_escape()? as char),
                Some(b) => out.push(b as char),
                None => {
                    return Err(XvmError::Lex {
                        loc,
                        message: "unterminated string literal".into(),
                    });
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Str(out),
            line: loc.line,
        })
    }

    fn read_char(&mut self) -> Result<Token, XvmError> {
        let loc = self.loc();
        let value = match self.advance() {
            Some(b'\\') => self.read_escape()?,
            Some(b) => b,
            None => {
                return Err(XvmError::Lex {
                    loc,
                    message: "unterminated character literal".into(),
                });
            }
        };
        match self.advance() {
            Some(b'\'') => {}
            _ => {
                return Err(XvmError::Lex {
                    loc,
                    message: "character literal must be a single character".into(),
                });
            }
        }
        Ok(Token {
            kind: TokenKind::Char(value as i64),
            line: loc.line,
        })
    }

    fn read_number(&mut self) -> Token {
        let loc = self.loc();
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek()
                .is_some_and(|b| (b as char).is_ascii_hexdigit())
            {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.bytes[digits_start..self.pos]).unwrap();
            let value = i64::from_str_radix(text, 16).unwrap_or(0);
            return Token {
                kind: TokenKind::Number(value),
                line: loc.line,
            };
        }

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'b') | Some(b'B')) {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(b'0') | Some(b'1')) {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.bytes[digits_start..self.pos]).unwrap();
            let value = i64::from_str_radix(text, 2).unwrap_or(0);
            return Token {
                kind: TokenKind::Number(value),
                line: loc.line,
            };
        }

        while self.peek().is_some_and(|b| (b as char).is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        Token {
            kind: TokenKind::Number(text.parse().unwrap_or(0)),
            line: loc.line,
        }
    }

    fn read_ident(&mut self) -> Token {
        let loc = self.loc();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| (b as char).is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .to_string();
        Token {
            kind: TokenKind::Ident(text),
            line: loc.line,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, XvmError> {
        loop {
            let Some(b) = self.peek() else {
                return Ok(None);
            };
            match b {
                b' ' | b'\t' | b'\r' => {
                    self.pos += 1;
                }
                b'\n' => {
                    let line = self.line;
                    self.advance();
                    return Ok(Some(Token {
                        kind: TokenKind::Newline,
                        line,
                    }));
                }
                b';' => self.skip_line_comment(),
                b'"' => {
                    self.advance();
                    return Ok(Some(self.read_string()?));
                }
                b'\'' => {
                    self.advance();
                    return Ok(Some(self.read_char()?));
                }
                b if (b as char).is_ascii_digit() => return Ok(Some(self.read_number())),
                b if (b as char).is_ascii_alphabetic() || b == b'_' => {
                    return Ok(Some(self.read_ident()));
                }
                b if PUNCT.contains(&(b as char)) => {
                    let line = self.line;
                    self.pos += 1;
                    return Ok(Some(Token {
                        kind: TokenKind::Punct(b as char),
                        line,
                    }));
                }
                other => {
                    return Err(XvmError::Lex {
                        loc: self.loc(),
                        message: format!("unexpected character '{}'", other as char),
                    });
                }
            }
        }
    }
}

pub fn tokenize(source: &str, filename: &str) -> Result<Vec<Token>, XvmError> {
    let mut lexer = Lexer::new(source, filename);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next_token()? {
        tokens.push(tok);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_mnemonics_and_numbers() {
        let tokens = tokenize("push 2\npush 3\nadd\nhalt\n", "t").unwrap();
        let idents: Vec<&str> = tokens.iter().filter_map(Token::ident).collect();
        assert_eq!(idents, vec!["push", "push", "add", "halt"]);
    }

    #[test]
    fn hex_and_binary_literals() {
        let tokens = tokenize("0xFF 0b101", "t").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number(255));
        assert_eq!(tokens[2].kind, TokenKind::Number(5));
    }

    #[test]
    fn string_escapes() {
        let tokens = tokenize("\"a\\nb\"", "t").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("a\nb".to_string()));
    }

    #[test]
    fn semicolon_starts_line_comment() {
        let tokens = tokenize("push 1 ; a comment\nhalt", "t").unwrap();
        let idents: Vec<&str> = tokens.iter().filter_map(Token::ident).collect();
        assert_eq!(idents, vec!["push", "halt"]);
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        assert!(tokenize("\"abc", "t").is_err());
    }
}
