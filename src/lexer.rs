use std::{fmt, iter, str::Chars};

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "'def'"),
            Token::Extern => write!(f, "'extern'"),
            Token::Ident(name) => write!(f, "identifier `{}`", name),
            Token::Number(value) => write!(f, "number {}", value),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

/// 1-based line and column of a character in the source.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

lazy_static! {
    // longest prefix strtod would accept for a run of digits and dots
    static ref NUMBER_PREFIX_RE: Regex = Regex::new(r"^(\d+\.?\d*|\.\d+)").unwrap();
}

/// Convert a run of digits and decimal points into a number. Malformed runs
/// such as `1.2.3` keep their longest valid prefix and a run with no digits
/// before or after the first point is zero.
fn parse_number(text: &str) -> f64 {
    NUMBER_PREFIX_RE
        .find(text)
        .and_then(|prefix| prefix.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// Pull-based lexer: characters are requested one at a time from `chars`
/// and only the character after the last token is held back.
pub struct Lexer<I: Iterator<Item = char>> {
    chars: I,
    current: Option<char>,
    current_pos: Position,
    next_pos: Position,
    token_start: Position,
}

impl<'a> Lexer<Chars<'a>> {
    pub fn from_source(source: &'a str) -> Self {
        Self::new(source.chars())
    }
}

impl<F: FnMut() -> Option<char>> Lexer<iter::FromFn<F>> {
    /// Build a lexer over a supplier closure; `None` marks end of input.
    pub fn from_fn(supplier: F) -> Self {
        Self::new(iter::from_fn(supplier))
    }
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(chars: I) -> Self {
        let mut lexer = Self {
            chars,
            current: None,
            current_pos: Position::default(),
            next_pos: Position::default(),
            token_start: Position::default(),
        };
        lexer.bump();
        lexer
    }

    /// Start of the most recently returned token.
    pub fn position(&self) -> Position {
        self.token_start
    }

    fn bump(&mut self) {
        self.current_pos = self.next_pos;
        self.current = self.chars.next();
        if let Some(c) = self.current {
            if c == '\n' {
                self.next_pos = Position::new(self.next_pos.line + 1, 1);
            } else {
                self.next_pos.column += 1;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.current {
            if !pred(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            while matches!(self.current, Some(c) if c.is_whitespace()) {
                self.bump();
            }
            self.token_start = self.current_pos;

            let c = match self.current {
                Some(c) => c,
                None => return Token::Eof,
            };

            if c.is_ascii_alphabetic() {
                let ident = self.take_while(|c| c.is_ascii_alphanumeric());
                return match ident.as_str() {
                    "def" => Token::Def,
                    "extern" => Token::Extern,
                    _ => Token::Ident(ident),
                };
            }

            if c.is_ascii_digit() || c == '.' {
                let text = self.take_while(|c| c.is_ascii_digit() || c == '.');
                return Token::Number(parse_number(&text));
            }

            if c == '#' {
                while let Some(c) = self.current {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            self.bump();
            return Token::Char(c);
        }
    }
}

/// Lex a whole string, returning every token before end of input together
/// with where it starts.
pub fn tokenize(input: &str) -> Vec<(Token, Position)> {
    let mut lexer = Lexer::from_source(input);
    let mut tokens = Vec::new();
    loop {
        match lexer.next_token() {
            Token::Eof => break,
            token => tokens.push((token, lexer.position())),
        }
    }
    tokens
}
