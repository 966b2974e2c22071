//! SQL tokenizer.
//!
//! Single pass over a `Peekable<Chars>` with line/column tracking. Keywords
//! are not distinguished from identifiers here; the parser matches
//! identifier tokens contextually and case-insensitively.
//!
//! Quote handling: single quotes always delimit strings, with `''` and
//! backslash escapes. Backquotes always delimit identifiers. Double quotes
//! delimit identifiers when the ANSI_QUOTES flag is set, strings otherwise.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::FlatqError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted identifier or keyword.
    Ident(String),
    /// Quoted identifier: no keyword meaning, exact name.
    QuotedIdent(String),
    Str(String),
    Number(String),
    /// `@name`.
    Var(String),
    /// `@@NAME`.
    Flag(String),
    /// `@%NAME`.
    Env(String),
    /// Operator or punctuation.
    Op(String),
}

impl Token {
    /// Case-insensitive keyword match against an unquoted identifier.
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    pub fn is_op(&self, op: &str) -> bool {
        matches!(self, Token::Op(s) if s == op)
    }
}

/// Token with its source position, for error reporting.
#[derive(Debug, Clone)]
pub struct PosToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    ansi_quotes: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, ansi_quotes: bool) -> Lexer<'a> {
        Lexer {
            iter: input.chars().peekable(),
            line: 1,
            column: 1,
            ansi_quotes,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<PosToken>, FlatqError> {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token()? {
            tokens.push(tok);
        }
        Ok(tokens)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.iter.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => {}
        }
        c
    }

    fn eat_if(&mut self, expected: char) -> bool {
        if self.iter.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> FlatqError {
        FlatqError::SyntaxError(format!("{msg} at line {}, column {}", self.line, self.column))
    }

    fn next_token(&mut self) -> Result<Option<PosToken>, FlatqError> {
        loop {
            match self.iter.peek() {
                None => return Ok(None),
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(&'-') => {
                    // "--" comment or minus operator: need two-char lookahead,
                    // so clone the iterator for the peek.
                    let mut ahead = self.iter.clone();
                    ahead.next();
                    if ahead.peek() == Some(&'-') {
                        self.bump();
                        self.bump();
                        while let Some(&c) = self.iter.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else {
                        break;
                    }
                }
                Some(&'/') => {
                    let mut ahead = self.iter.clone();
                    ahead.next();
                    if ahead.peek() == Some(&'*') {
                        self.bump();
                        self.bump();
                        loop {
                            match self.bump() {
                                Some('*') if self.eat_if('/') => break,
                                Some(_) => {}
                                None => return Err(self.error("unterminated comment")),
                            }
                        }
                    } else {
                        break;
                    }
                }
                Some(_) => break,
            }
        }

        let line = self.line;
        let column = self.column;
        let c = match self.iter.peek().copied() {
            Some(c) => c,
            None => return Ok(None),
        };

        let token = match c {
            '\'' => {
                self.bump();
                Token::Str(self.quoted_text('\'')?)
            }
            '`' => {
                self.bump();
                Token::QuotedIdent(self.quoted_text('`')?)
            }
            '"' => {
                self.bump();
                let text = self.quoted_text('"')?;
                if self.ansi_quotes {
                    Token::QuotedIdent(text)
                } else {
                    Token::Str(text)
                }
            }
            '@' => {
                self.bump();
                if self.eat_if('@') {
                    Token::Flag(self.ident_text()?)
                } else if self.eat_if('%') {
                    Token::Env(self.ident_text()?)
                } else {
                    Token::Var(self.ident_text()?)
                }
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&c) = self.iter.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                // Fractional part only when a digit follows the dot, so that
                // `t.1` stays a column-number reference.
                if self.iter.peek() == Some(&'.') {
                    let mut ahead = self.iter.clone();
                    ahead.next();
                    if ahead.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        text.push('.');
                        self.bump();
                        while let Some(&c) = self.iter.peek() {
                            if c.is_ascii_digit() {
                                text.push(c);
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                }
                if matches!(self.iter.peek(), Some(&'e') | Some(&'E')) {
                    let mut ahead = self.iter.clone();
                    ahead.next();
                    let sign = matches!(ahead.peek(), Some(&'+') | Some(&'-'));
                    if sign {
                        ahead.next();
                    }
                    if ahead.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        text.push(self.bump().unwrap_or('e'));
                        if sign {
                            text.push(self.bump().unwrap_or('+'));
                        }
                        while let Some(&c) = self.iter.peek() {
                            if c.is_ascii_digit() {
                                text.push(c);
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                }
                Token::Number(text)
            }
            c if c.is_alphabetic() || c == '_' => Token::Ident(self.ident_text()?),
            _ => {
                self.bump();
                let op = match c {
                    '=' => {
                        if self.eat_if('=') {
                            "==".to_string()
                        } else {
                            "=".to_string()
                        }
                    }
                    '<' => {
                        if self.eat_if('=') {
                            "<=".to_string()
                        } else if self.eat_if('>') {
                            "<>".to_string()
                        } else {
                            "<".to_string()
                        }
                    }
                    '>' => {
                        if self.eat_if('=') {
                            ">=".to_string()
                        } else {
                            ">".to_string()
                        }
                    }
                    '!' => {
                        if self.eat_if('=') {
                            "<>".to_string()
                        } else {
                            return Err(self.error("unexpected character '!'"));
                        }
                    }
                    '|' => {
                        if self.eat_if('|') {
                            "||".to_string()
                        } else {
                            return Err(self.error("unexpected character '|'"));
                        }
                    }
                    ':' => {
                        if self.eat_if('=') {
                            ":=".to_string()
                        } else {
                            return Err(self.error("unexpected character ':'"));
                        }
                    }
                    '(' | ')' | ',' | ';' | '.' | '+' | '-' | '*' | '/' | '%' => c.to_string(),
                    other => return Err(self.error(format_args!("unexpected character {other:?}"))),
                };
                Token::Op(op)
            }
        };

        Ok(Some(PosToken {
            token,
            line,
            column,
        }))
    }

    fn ident_text(&mut self) -> Result<String, FlatqError> {
        let mut text = String::new();
        while let Some(&c) = self.iter.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if text.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(text)
    }

    /// Body of a quoted token; the opening quote is already consumed.
    /// Doubling the quote or backslash-escaping embeds it.
    fn quoted_text(&mut self, quote: char) -> Result<String, FlatqError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("literal is not terminated")),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    Some(c) => text.push(c),
                    None => return Err(self.error("literal is not terminated")),
                },
                Some(c) if c == quote => {
                    if self.eat_if(quote) {
                        text.push(quote);
                    } else {
                        return Ok(text);
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }
}
