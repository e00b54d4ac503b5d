use std::fmt::Display;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    Illegal(char),
    Eof,

    // Identifiers + literals
    Ident(String),
    Int(String),
    Float(String),
    Str(String),

    // Operators
    Assign,
    Plus,
    Minus,
    Bang,
    Asterisk,
    Slash,

    Lt,
    Gt,

    Eq,
    NotEq,

    // Delimiters
    Comma,
    Semicolon,
    Colon,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    // Keywords
    Function,
    Let,
    True,
    False,
    If,
    Else,
    Return,
    For,
    Break,
    Continue,
}

pub fn lookup_identifier(literal: &str) -> Token {
    match literal {
        "let" => Token::Let,
        "fn" => Token::Function,
        "true" => Token::True,
        "false" => Token::False,
        "if" => Token::If,
        "else" => Token::Else,
        "return" => Token::Return,
        "for" => Token::For,
        "break" => Token::Break,
        "continue" => Token::Continue,
        _ => Token::Ident(literal.to_string()),
    }
}

impl Token {
    /// The source text this token was read from.
    pub fn literal(&self) -> String {
        match self {
            Token::Str(s) => s.clone(),
            Token::Eof => String::new(),
            other => other.to_string(),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            Token::Illegal(c) => f.write_str(&c.to_string()),
            Token::Eof => f.write_str("EOF"),
            Token::Ident(s) => f.write_str(s),
            Token::Int(s) => f.write_str(s),
            Token::Float(s) => f.write_str(s),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Assign => f.write_str("="),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Bang => f.write_str("!"),
            Token::Asterisk => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Lt => f.write_str("<"),
            Token::Gt => f.write_str(">"),
            Token::Eq => f.write_str("=="),
            Token::NotEq => f.write_str("!="),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::Colon => f.write_str(":"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBrace => f.write_str("{"),
            Token::RBrace => f.write_str("}"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Function => f.write_str("fn"),
            Token::Let => f.write_str("let"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::If => f.write_str("if"),
            Token::Else => f.write_str("else"),
            Token::Return => f.write_str("return"),
            Token::For => f.write_str("for"),
            Token::Break => f.write_str("break"),
            Token::Continue => f.write_str("continue"),
        }
    }
}

#[cfg(test)]
mod test_token {
    use super::*;

    #[test]
    fn test_lookup_identifier() {
        let tests = vec![
            ("let", Token::Let),
            ("fn", Token::Function),
            ("for", Token::For),
            ("break", Token::Break),
            ("continue", Token::Continue),
            ("return", Token::Return),
            ("lets", Token::Ident("lets".into())),
            ("_x", Token::Ident("_x".into())),
        ];

        for (input, expected) in tests {
            assert_eq!(lookup_identifier(input), expected);
        }
    }

    #[test]
    fn test_literal() {
        assert_eq!(Token::Str("a b".into()).literal(), "a b");
        assert_eq!(Token::NotEq.literal(), "!=");
        assert_eq!(Token::Int("42".into()).literal(), "42");
        assert_eq!(Token::Eof.literal(), "");
    }
}
