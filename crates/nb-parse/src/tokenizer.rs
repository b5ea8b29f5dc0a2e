//! A character-class tokenizer for the rule surface syntax.
//!
//! Operator punctuation is longest-match: `!?`, `!!`, `!&`, `!|`, `|!&`,
//! `&&`, `||`, `<>`, `<=`, `>=`, `-?`, `+?`, `~=` are each attempted before
//! falling back to their single-character prefixes.

use std::error::Error;
use std::fmt;

const PUNCT_CHARS: &str = "|&?^=<>~+-*/!(),;:[]${}`\\";

const fn build_punct_table() -> [bool; 128] {
    let mut table = [false; 128];
    let bytes = PUNCT_CHARS.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        table[bytes[i] as usize] = true;
        i += 1;
    }
    table
}
static PUNCT_TABLE: [bool; 128] = build_punct_table();

#[inline(always)]
fn is_punct(c: u8) -> bool {
    (c as usize) < 128 && PUNCT_TABLE[c as usize]
}

#[inline(always)]
fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[inline(always)]
fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Number,
    String,
    /// Any of the operator/punctuation spellings; distinguished by the
    /// token's text (`"&&"`, `"~="`, `"("`, …) rather than further subtyping,
    /// matching the original's single character-class dispatch table.
    Punct,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.text)
    }
}

#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tokenizer error at {}: {}", self.pos, self.message)
    }
}
impl Error for TokenizerError {}

/// Longest-first multi-character operator spellings. Order matters: a
/// three-character spelling must be tried before its two- and one-character
/// prefixes.
const MULTI_PUNCT: &[&str] = &[
    "|!&", "!?", "!!", "!&", "!|", "&&", "||", "<>", "<=", ">=", "-?", "+?", "~^!", "~^?", "~^",
    "~=", "~(", "$(", "==",
];

pub struct Tokenizer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizerError> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.src.len() {
                out.push(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    start: self.pos,
                    end: self.pos,
                });
                break;
            }
            out.push(self.next_token()?);
        }
        Ok(out)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos < self.src.len() && self.src[self.pos] == b'#' {
                while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<Token, TokenizerError> {
        let start = self.pos;
        let c = self.src[self.pos];

        if is_ident_start(c) {
            while self.pos < self.src.len() && is_ident_continue(self.src[self.pos]) {
                self.pos += 1;
            }
            return Ok(self.make(TokenKind::Ident, start));
        }

        if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.lex_number(start);
        }

        if c == b'"' {
            return self.lex_string(start);
        }

        if is_punct(c) {
            return self.lex_punct(start);
        }

        Err(TokenizerError {
            message: format!("unexpected character '{}'", c as char),
            pos: start,
        })
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, TokenizerError> {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos < self.src.len() && self.src[self.pos] == b'.' {
            self.pos += 1;
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.pos < self.src.len() && matches!(self.src[self.pos], b'e' | b'E') {
            let save = self.pos;
            self.pos += 1;
            if self.pos < self.src.len() && matches!(self.src[self.pos], b'+' | b'-') {
                self.pos += 1;
            }
            if self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        Ok(self.make(TokenKind::Number, start))
    }

    fn lex_string(&mut self, start: usize) -> Result<Token, TokenizerError> {
        self.pos += 1; // opening quote
        let mut text = String::new();
        loop {
            if self.pos >= self.src.len() {
                return Err(TokenizerError {
                    message: "unterminated string".into(),
                    pos: start,
                });
            }
            let c = self.src[self.pos];
            if c == b'"' {
                self.pos += 1;
                break;
            }
            if c == b'\\' && self.peek(1).is_some() {
                self.pos += 1;
                text.push(self.src[self.pos] as char);
                self.pos += 1;
                continue;
            }
            text.push(c as char);
            self.pos += 1;
        }
        Ok(Token {
            kind: TokenKind::String,
            text,
            start,
            end: self.pos,
        })
    }

    fn lex_punct(&mut self, start: usize) -> Result<Token, TokenizerError> {
        let remaining = std::str::from_utf8(&self.src[start..]).unwrap_or("");
        for spelling in MULTI_PUNCT {
            if remaining.starts_with(spelling) {
                self.pos = start + spelling.len();
                return Ok(self.make(TokenKind::Punct, start));
            }
        }
        self.pos = start + 1;
        Ok(self.make(TokenKind::Punct, start))
    }

    fn make(&self, kind: TokenKind, start: usize) -> Token {
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or("")
            .to_string();
        Token {
            kind,
            text,
            start,
            end: self.pos,
        }
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, TokenizerError> {
    Tokenizer::new(src).tokenize()
}
