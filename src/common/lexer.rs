use super::token::{lookup_identifier, Token};

#[derive(Debug)]
pub struct Lexer {
    input: Vec<u8>,
    position: usize,
    read_position: usize,
    ch: u8,
}

trait IsLetter {
    fn is_letter(&self) -> bool;
}

impl IsLetter for u8 {
    fn is_letter(&self) -> bool {
        self.is_ascii_alphabetic() || *self == b'_'
    }
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Self {
            input: input.as_bytes().to_vec(),
            position: 0,
            read_position: 0,
            ch: 0,
        };
        lexer.read_char();
        lexer
    }

    fn read_char(&mut self) {
        self.ch = self.peek_char();
        self.position = self.read_position;
        if self.read_position <= self.input.len() {
            self.read_position += 1;
        }
    }

    fn peek_char(&self) -> u8 {
        self.input.get(self.read_position).copied().unwrap_or(0)
    }

    fn slice(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while self.ch.is_letter() {
            self.read_char();
        }

        self.slice(start)
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        while self.ch.is_ascii_digit() {
            self.read_char();
        }

        if self.ch == b'.' && self.peek_char().is_ascii_digit() {
            self.read_char();
            while self.ch.is_ascii_digit() {
                self.read_char();
            }
            return Token::Float(self.slice(start));
        }

        Token::Int(self.slice(start))
    }

    fn read_string(&mut self) -> String {
        let mut buf = Vec::new();
        loop {
            self.read_char();
            if self.at_end() || self.ch == b'"' {
                break;
            }

            match self.ch {
                b'\\' => {
                    self.read_char();
                    match self.ch {
                        b'n' => buf.push(b'\n'),
                        b't' => buf.push(b'\t'),
                        b'r' => buf.push(b'\r'),
                        b'\\' => buf.push(b'\\'),
                        b'"' => buf.push(b'"'),
                        b'a' => buf.push(0x07),
                        b'b' => buf.push(0x08),
                        b'f' => buf.push(0x0c),
                        b'v' => buf.push(0x0b),
                        b'0' => buf.push(0),
                        _ if self.position >= self.input.len() => {
                            buf.push(b'\\');
                            break;
                        }
                        other => {
                            buf.push(b'\\');
                            buf.push(other);
                        }
                    }
                }
                other => buf.push(other),
            }
        }

        String::from_utf8_lossy(&buf).into_owned()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.ch, b' ' | b'\t' | b'\n' | b'\r') {
            self.read_char();
        }
    }

    fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        if self.at_end() {
            return Token::Eof;
        }

        let token = match self.ch {
            b'=' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b';' => Token::Semicolon,
            b',' => Token::Comma,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'!' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            b'*' => Token::Asterisk,
            b'/' => Token::Slash,
            b'<' => Token::Lt,
            b'>' => Token::Gt,
            b':' => Token::Colon,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'"' => Token::Str(self.read_string()),
            c if c.is_letter() => {
                let literal = self.read_identifier();
                return lookup_identifier(&literal);
            }
            c if c.is_ascii_digit() => return self.read_number(),
            c => Token::Illegal(c.into()),
        };

        self.read_char();

        token
    }
}

/// Yields tokens up to, but not including, [`Token::Eof`].
impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Token::Eof => None,
            token => Some(token),
        }
    }
}
