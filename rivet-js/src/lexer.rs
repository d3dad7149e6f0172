//! JavaScript source tokenization.

use crate::error::{JsError, JsResult};
use crate::token::{Span, Token, TokenKind};

/// Hand-written scanner over the source characters.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    /// Create a lexer for a source string.
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> JsResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Scan the next token.
    fn next_token(&mut self) -> JsResult<Token> {
        self.skip_whitespace_and_comments()?;
        let span = self.span();
        if self.is_eof() {
            return Ok(Token::new(TokenKind::Eof, span));
        }
        let ch = self.current();
        if ch.is_ascii_digit() {
            return self.scan_number();
        }
        if ch == '"' || ch == '\'' {
            return self.scan_string(ch);
        }
        if is_id_start(ch) {
            return Ok(self.scan_identifier());
        }
        self.scan_punctuator()
    }

    fn skip_whitespace_and_comments(&mut self) -> JsResult<()> {
        loop {
            while !self.is_eof() && is_whitespace(self.current()) {
                self.advance();
            }
            if self.is_eof() || self.current() != '/' {
                return Ok(());
            }
            match self.peek() {
                '/' => {
                    while !self.is_eof() && self.current() != '\n' {
                        self.advance();
                    }
                }
                '*' => {
                    let start = self.span();
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_eof() {
                            return Err(JsError::syntax(format!(
                                "unterminated comment at {}",
                                start
                            )));
                        }
                        if self.current() == '*' && self.peek() == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_number(&mut self) -> JsResult<Token> {
        let span = self.span();
        let mut text = String::new();
        while !self.is_eof() && self.current().is_ascii_digit() {
            text.push(self.current());
            self.advance();
        }
        if !self.is_eof() && self.current() == '.' && self.peek().is_ascii_digit() {
            text.push('.');
            self.advance();
            while !self.is_eof() && self.current().is_ascii_digit() {
                text.push(self.current());
                self.advance();
            }
        }
        if !self.is_eof() && (self.current() == 'e' || self.current() == 'E') {
            let mut exp = String::from("e");
            let mut lookahead = self.pos + 1;
            if lookahead < self.chars.len()
                && (self.chars[lookahead] == '+' || self.chars[lookahead] == '-')
            {
                exp.push(self.chars[lookahead]);
                lookahead += 1;
            }
            if lookahead < self.chars.len() && self.chars[lookahead].is_ascii_digit() {
                while self.pos < lookahead {
                    self.advance();
                }
                while !self.is_eof() && self.current().is_ascii_digit() {
                    exp.push(self.current());
                    self.advance();
                }
                text.push_str(&exp);
            }
        }
        let value = text
            .parse::<f64>()
            .map_err(|_| JsError::syntax(format!("invalid number literal at {}", span)))?;
        Ok(Token::new(TokenKind::Number(value), span))
    }

    fn scan_string(&mut self, quote: char) -> JsResult<Token> {
        let span = self.span();
        self.advance();
        let mut text = String::new();
        loop {
            if self.is_eof() {
                return Err(JsError::syntax(format!("unterminated string at {}", span)));
            }
            let ch = self.current();
            if ch == quote {
                self.advance();
                return Ok(Token::new(TokenKind::String(text), span));
            }
            if ch == '\n' {
                return Err(JsError::syntax(format!("unterminated string at {}", span)));
            }
            if ch == '\\' {
                self.advance();
                if self.is_eof() {
                    return Err(JsError::syntax(format!("unterminated string at {}", span)));
                }
                let escaped = self.current();
                self.advance();
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    'u' => {
                        let code = self.scan_hex_digits(4)?;
                        let ch = char::from_u32(code).ok_or_else(|| {
                            JsError::syntax(format!("invalid unicode escape at {}", span))
                        })?;
                        text.push(ch);
                    }
                    other => text.push(other),
                }
                continue;
            }
            text.push(ch);
            self.advance();
        }
    }

    fn scan_identifier(&mut self) -> Token {
        let span = self.span();
        let mut text = String::new();
        while !self.is_eof() && is_id_continue(self.current()) {
            text.push(self.current());
            self.advance();
        }
        match TokenKind::keyword(&text) {
            Some(kind) => Token::new(kind, span),
            None => Token::new(TokenKind::Identifier(text), span),
        }
    }

    fn scan_punctuator(&mut self) -> JsResult<Token> {
        let span = self.span();
        let ch = self.current();
        self.advance();
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::NotEqEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AndAnd
                } else {
                    return Err(JsError::syntax(format!("unexpected character '&' at {}", span)));
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::OrOr
                } else {
                    return Err(JsError::syntax(format!("unexpected character '|' at {}", span)));
                }
            }
            other => {
                return Err(JsError::syntax(format!(
                    "unexpected character '{}' at {}",
                    other, span
                )));
            }
        };
        Ok(Token::new(kind, span))
    }

    fn scan_hex_digits(&mut self, count: usize) -> JsResult<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            if self.is_eof() {
                return Err(JsError::syntax("unterminated escape sequence"));
            }
            let digit = self
                .current()
                .to_digit(16)
                .ok_or_else(|| JsError::syntax("invalid hex digit in escape sequence"))?;
            value = value * 16 + digit;
            self.advance();
        }
        Ok(value)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn current(&self) -> char {
        self.chars[self.pos]
    }

    fn peek(&self) -> char {
        if self.pos + 1 < self.chars.len() {
            self.chars[self.pos + 1]
        } else {
            '\0'
        }
    }

    fn advance(&mut self) {
        if self.is_eof() {
            return;
        }
        if self.current() == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += 1;
    }

    fn eat(&mut self, expected: char) -> bool {
        if !self.is_eof() && self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

fn is_id_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_id_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}
