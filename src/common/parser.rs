use std::mem;

use thiserror::Error;
use tracing::debug;

use super::{
    ast::{BlockStatement, Expression, Program, Statement},
    lexer::Lexer,
    token::Token,
};

type R<T> = std::result::Result<T, ParserError>;

type PrefixParseFn = fn(&mut Parser) -> R<Expression>;
type InfixParseFn = fn(&mut Parser, Expression) -> R<Expression>;

macro_rules! expect_peek {
    ($parser:expr, $token:pat => $result:expr, $want:expr) => {{
        let tok = $parser.peek_token.clone();
        if let $token = tok {
            $parser.next_token();
            Ok($result)
        } else {
            Err(ParserError::unexpected($want, &tok))
        }
    }};
    ($parser:expr, $token:pat, $want:expr) => {
        expect_peek!($parser, $token => (), $want)
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParserError(String);

impl ParserError {
    fn unexpected(want: &str, got: &Token) -> Self {
        ParserError(format!(
            "expected next token to be {}, got {} instead",
            want, got
        ))
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

impl From<&Token> for Precedence {
    fn from(token: &Token) -> Self {
        match token {
            Token::Eq | Token::NotEq => Precedence::Equals,
            Token::Lt | Token::Gt => Precedence::LessGreater,
            Token::Plus | Token::Minus => Precedence::Sum,
            Token::Asterisk | Token::Slash => Precedence::Product,
            Token::LParen => Precedence::Call,
            Token::LBracket => Precedence::Index,
            _ => Precedence::Lowest,
        }
    }
}

fn prefix_rule(token: &Token) -> Option<PrefixParseFn> {
    match token {
        Token::Ident(_) => Some(Parser::parse_identifier),
        Token::Int(_) => Some(Parser::parse_integer),
        Token::Float(_) => Some(Parser::parse_float),
        Token::Str(_) => Some(Parser::parse_string),
        Token::True | Token::False => Some(Parser::parse_boolean),
        Token::Bang | Token::Minus => Some(Parser::parse_prefix_expression),
        Token::LParen => Some(Parser::parse_grouped_expression),
        Token::LBracket => Some(Parser::parse_array_literal),
        Token::LBrace => Some(Parser::parse_hash_literal),
        Token::If => Some(Parser::parse_if_expression),
        Token::Function => Some(Parser::parse_function_literal),
        _ => None,
    }
}

fn infix_rule(token: &Token) -> Option<InfixParseFn> {
    match token {
        Token::Plus
        | Token::Minus
        | Token::Asterisk
        | Token::Slash
        | Token::Lt
        | Token::Gt
        | Token::Eq
        | Token::NotEq => Some(Parser::parse_infix_expression),
        Token::LParen => Some(Parser::parse_call_expression),
        Token::LBracket => Some(Parser::parse_index_expression),
        _ => None,
    }
}

pub struct Parser {
    lexer: Lexer,
    cur_token: Token,
    peek_token: Token,
    errors: Vec<ParserError>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        let mut parser = Self {
            lexer,
            cur_token: Token::Eof,
            peek_token: Token::Eof,
            errors: vec![],
        };

        parser.next_token();
        parser.next_token();

        parser
    }

    pub fn next_token(&mut self) {
        self.cur_token = mem::replace(&mut self.peek_token, self.lexer.next_token());
    }

    pub fn errors(&self) -> &[ParserError] {
        &self.errors
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program { statements: vec![] };

        while self.cur_token != Token::Eof {
            match self.parse_statement() {
                Ok(statement) => program.statements.push(statement),
                Err(err) => self.errors.push(err),
            }

            self.next_token();
        }

        debug!(
            statements = program.statements.len(),
            errors = self.errors.len(),
            "parsed program"
        );

        program
    }

    fn cur_token_is(&self, token: &Token) -> bool {
        &self.cur_token == token
    }

    fn peek_token_is(&self, token: &Token) -> bool {
        &self.peek_token == token
    }

    fn skip_optional_semicolon(&mut self) {
        if self.peek_token_is(&Token::Semicolon) {
            self.next_token();
        }
    }

    fn parse_statement(&mut self) -> R<Statement> {
        match self.cur_token {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            Token::For => self.parse_for_statement(),
            Token::Break => {
                self.skip_optional_semicolon();
                Ok(Statement::Break)
            }
            Token::Continue => {
                self.skip_optional_semicolon();
                Ok(Statement::Continue)
            }
            Token::Ident(_) if self.peek_token_is(&Token::Assign) => {
                self.parse_assign_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> R<Statement> {
        let name = expect_peek!(self, Token::Ident(ident) => ident, "IDENT")?;
        expect_peek!(self, Token::Assign, "=")?;
        self.next_token();

        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_optional_semicolon();

        Ok(Statement::Let { name, value })
    }

    fn parse_assign_statement(&mut self) -> R<Statement> {
        let name = match &self.cur_token {
            Token::Ident(name) => name.clone(),
            other => return Err(ParserError::unexpected("IDENT", other)),
        };
        expect_peek!(self, Token::Assign, "=")?;
        self.next_token();

        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_optional_semicolon();

        Ok(Statement::Assign { name, value })
    }

    fn parse_return_statement(&mut self) -> R<Statement> {
        self.next_token();

        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_optional_semicolon();

        Ok(Statement::Return { value })
    }

    fn parse_for_statement(&mut self) -> R<Statement> {
        expect_peek!(self, Token::LParen, "(")?;
        self.next_token();

        let init = self.parse_statement()?;
        if !self.cur_token_is(&Token::Semicolon) {
            expect_peek!(self, Token::Semicolon, ";")?;
        }
        self.next_token();

        let condition = self.parse_expression(Precedence::Lowest)?;
        expect_peek!(self, Token::Semicolon, ";")?;
        self.next_token();

        let post = self.parse_statement()?;
        expect_peek!(self, Token::RParen, ")")?;
        expect_peek!(self, Token::LBrace, "{")?;

        let body = self.parse_block_statement()?;

        Ok(Statement::For {
            init: Box::new(init),
            condition,
            post: Box::new(post),
            body,
        })
    }

    fn parse_expression_statement(&mut self) -> R<Statement> {
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_optional_semicolon();

        Ok(Statement::Expression { value })
    }

    /// Parses statements up to the closing `}`; `cur_token` must be the opening `{`.
    fn parse_block_statement(&mut self) -> R<BlockStatement> {
        let mut statements = vec![];
        self.next_token();

        while !self.cur_token_is(&Token::RBrace) {
            if self.cur_token_is(&Token::Eof) {
                return Err(ParserError::unexpected("}", &Token::Eof));
            }

            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(err) => self.errors.push(err),
            }
            self.next_token();
        }

        Ok(BlockStatement { statements })
    }

    fn parse_expression(&mut self, precedence: Precedence) -> R<Expression> {
        let prefix = prefix_rule(&self.cur_token).ok_or_else(|| {
            ParserError(format!(
                "no prefix parse function for {} found",
                self.cur_token
            ))
        })?;
        let mut left = prefix(self)?;

        while !self.peek_token_is(&Token::Semicolon)
            && precedence < Precedence::from(&self.peek_token)
        {
            let Some(infix) = infix_rule(&self.peek_token) else {
                return Ok(left);
            };

            self.next_token();
            left = infix(self, left)?;
        }

        Ok(left)
    }

    fn parse_identifier(&mut self) -> R<Expression> {
        match &self.cur_token {
            Token::Ident(name) => Ok(Expression::Identifier(name.clone())),
            other => Err(ParserError::unexpected("IDENT", other)),
        }
    }

    fn parse_integer(&mut self) -> R<Expression> {
        let literal = self.cur_token.literal();
        literal
            .parse()
            .map(Expression::Integer)
            .map_err(|_| ParserError(format!("could not parse {:?} as integer", literal)))
    }

    fn parse_float(&mut self) -> R<Expression> {
        let literal = self.cur_token.literal();
        literal
            .parse()
            .map(Expression::Float)
            .map_err(|_| ParserError(format!("could not parse {:?} as float", literal)))
    }

    fn parse_string(&mut self) -> R<Expression> {
        Ok(Expression::Str(self.cur_token.literal()))
    }

    fn parse_boolean(&mut self) -> R<Expression> {
        Ok(Expression::Boolean(self.cur_token_is(&Token::True)))
    }

    fn parse_prefix_expression(&mut self) -> R<Expression> {
        let operator = self.cur_token.clone();
        self.next_token();

        let right = self.parse_expression(Precedence::Prefix)?;

        Ok(Expression::Prefix(operator, Box::new(right)))
    }

    fn parse_infix_expression(&mut self, left: Expression) -> R<Expression> {
        let operator = self.cur_token.clone();
        let precedence = Precedence::from(&operator);
        self.next_token();

        let right = self.parse_expression(precedence)?;

        Ok(Expression::Infix(Box::new(left), operator, Box::new(right)))
    }

    fn parse_grouped_expression(&mut self) -> R<Expression> {
        self.next_token();

        let expression = self.parse_expression(Precedence::Lowest)?;
        expect_peek!(self, Token::RParen, ")")?;

        Ok(expression)
    }

    fn parse_expression_list(&mut self, end: Token) -> R<Vec<Expression>> {
        let mut list = vec![];

        if self.peek_token_is(&end) {
            self.next_token();
            return Ok(list);
        }

        self.next_token();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_token_is(&Token::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.peek_token_is(&end) {
            return Err(ParserError::unexpected(&end.to_string(), &self.peek_token));
        }
        self.next_token();

        Ok(list)
    }

    fn parse_array_literal(&mut self) -> R<Expression> {
        let elements = self.parse_expression_list(Token::RBracket)?;
        Ok(Expression::Array(elements))
    }

    fn parse_hash_literal(&mut self) -> R<Expression> {
        let mut pairs = vec![];

        while !self.peek_token_is(&Token::RBrace) {
            self.next_token();
            let key = self.parse_expression(Precedence::Lowest)?;

            expect_peek!(self, Token::Colon, ":")?;
            self.next_token();
            let value = self.parse_expression(Precedence::Lowest)?;

            pairs.push((key, value));

            if !self.peek_token_is(&Token::RBrace) {
                expect_peek!(self, Token::Comma, ",")?;
            }
        }
        expect_peek!(self, Token::RBrace, "}")?;

        Ok(Expression::Hash(pairs))
    }

    fn parse_if_expression(&mut self) -> R<Expression> {
        expect_peek!(self, Token::LParen, "(")?;
        self.next_token();

        let condition = self.parse_expression(Precedence::Lowest)?;
        expect_peek!(self, Token::RParen, ")")?;
        expect_peek!(self, Token::LBrace, "{")?;

        let consequence = self.parse_block_statement()?;

        let alternative = if self.peek_token_is(&Token::Else) {
            self.next_token();
            expect_peek!(self, Token::LBrace, "{")?;
            Some(self.parse_block_statement()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_parameters(&mut self) -> R<Vec<String>> {
        let mut parameters = vec![];

        if self.peek_token_is(&Token::RParen) {
            self.next_token();
            return Ok(parameters);
        }

        parameters.push(expect_peek!(self, Token::Ident(ident) => ident, "IDENT")?);

        while self.peek_token_is(&Token::Comma) {
            self.next_token();
            parameters.push(expect_peek!(self, Token::Ident(ident) => ident, "IDENT")?);
        }

        expect_peek!(self, Token::RParen, ")")?;

        Ok(parameters)
    }

    fn parse_function_literal(&mut self) -> R<Expression> {
        expect_peek!(self, Token::LParen, "(")?;

        let parameters = self.parse_function_parameters()?;
        expect_peek!(self, Token::LBrace, "{")?;

        let body = self.parse_block_statement()?;

        Ok(Expression::Function { parameters, body })
    }

    fn parse_call_expression(&mut self, function: Expression) -> R<Expression> {
        let arguments = self.parse_expression_list(Token::RParen)?;

        Ok(Expression::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_index_expression(&mut self, left: Expression) -> R<Expression> {
        self.next_token();

        let index = self.parse_expression(Precedence::Lowest)?;
        expect_peek!(self, Token::RBracket, "]")?;

        Ok(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }
}

#[cfg(test)]
mod test_parser {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(input: &str) -> Program {
        let lexer = Lexer::new(input);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();

        let errors: Vec<String> = parser.errors().iter().map(|e| e.to_string()).collect();
        assert!(errors.is_empty(), "parser errors: {:?}", errors);

        program
    }

    fn parse_errors(input: &str) -> Vec<String> {
        let mut parser = Parser::new(Lexer::new(input));
        parser.parse_program();
        parser.errors().iter().map(|e| e.to_string()).collect()
    }

    fn single_expression(input: &str) -> Expression {
        let program = parse(input);
        assert_eq!(program.statements.len(), 1);

        match program.statements.into_iter().next() {
            Some(Statement::Expression { value }) => value,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn ident(name: &str) -> Expression {
        Expression::Identifier(name.into())
    }

    fn infix(left: Expression, op: Token, right: Expression) -> Expression {
        Expression::Infix(Box::new(left), op, Box::new(right))
    }

    #[test]
    fn test_let_statements() {
        let input = r#"
            let x = 5;
            let y = true;
            let foobar = y;
        "#;

        let program = parse(input);

        let expected = vec![
            Statement::Let {
                name: "x".to_string(),
                value: Expression::Integer(5),
            },
            Statement::Let {
                name: "y".to_string(),
                value: Expression::Boolean(true),
            },
            Statement::Let {
                name: "foobar".to_string(),
                value: ident("y"),
            },
        ];

        assert_eq!(expected, program.statements);
    }

    #[test]
    fn test_return_and_assign_statements() {
        let program = parse("return 5; x = x + 1; return add(1)");

        assert_eq!(
            program.statements,
            vec![
                Statement::Return {
                    value: Expression::Integer(5)
                },
                Statement::Assign {
                    name: "x".into(),
                    value: infix(ident("x"), Token::Plus, Expression::Integer(1)),
                },
                Statement::Return {
                    value: Expression::Call {
                        function: Box::new(ident("add")),
                        arguments: vec![Expression::Integer(1)],
                    }
                },
            ]
        );
    }

    #[test]
    fn test_operator_precedence() {
        let tests = vec![
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b - c", "((a + b) - c)"),
            ("a * b * c", "((a * b) * c)"),
            ("a * b / c", "((a * b) / c)"),
            ("a + b / c", "(a + (b / c))"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("3 + 4; -5 * 5", "(3 + 4); ((-5) * 5)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("5 < 4 != 3 > 4", "((5 < 4) != (3 > 4))"),
            (
                "3 + 4 * 5 == 3 * 1 + 4 * 5",
                "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))",
            ),
            ("true", "true"),
            ("3 > 5 == false", "((3 > 5) == false)"),
            ("1 + (2 + 3) + 4", "((1 + (2 + 3)) + 4)"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("!(true == true)", "(!(true == true))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            (
                "add(a, b, 1, 2 * 3, 4 + 5, add(6, 7 * 8))",
                "add(a, b, 1, (2 * 3), (4 + 5), add(6, (7 * 8)))",
            ),
            (
                "a * [1, 2, 3, 4][b * c] * d",
                "((a * ([1, 2, 3, 4][(b * c)])) * d)",
            ),
            (
                "add(a * b[2], b[1], 2 * [1, 2][1])",
                "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))",
            ),
        ];

        for (input, expected) in tests {
            assert_eq!(parse(input).to_string(), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_literal_expressions() {
        let tests = vec![
            ("foobar;", ident("foobar")),
            ("5;", Expression::Integer(5)),
            ("2.5;", Expression::Float(2.5)),
            (r#""hello world";"#, Expression::Str("hello world".into())),
            ("false;", Expression::Boolean(false)),
            (
                "[1, 2 * 2]",
                Expression::Array(vec![
                    Expression::Integer(1),
                    infix(Expression::Integer(2), Token::Asterisk, Expression::Integer(2)),
                ]),
            ),
            ("[]", Expression::Array(vec![])),
            ("{}", Expression::Hash(vec![])),
            (
                r#"{"two": 2, "one": 1}"#,
                Expression::Hash(vec![
                    (Expression::Str("two".into()), Expression::Integer(2)),
                    (Expression::Str("one".into()), Expression::Integer(1)),
                ]),
            ),
        ];

        for (input, expected) in tests {
            assert_eq!(single_expression(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_prefix_expressions() {
        let tests = vec![
            ("!5;", Token::Bang, Expression::Integer(5)),
            ("-15;", Token::Minus, Expression::Integer(15)),
            ("!true;", Token::Bang, Expression::Boolean(true)),
        ];

        for (input, operator, value) in tests {
            assert_eq!(
                single_expression(input),
                Expression::Prefix(operator, Box::new(value))
            );
        }
    }

    #[test]
    fn test_if_expression() {
        let expression = single_expression("if (x < y) { x } else { y; }");

        assert_eq!(
            expression,
            Expression::If {
                condition: Box::new(infix(ident("x"), Token::Lt, ident("y"))),
                consequence: BlockStatement {
                    statements: vec![Statement::Expression { value: ident("x") }],
                },
                alternative: Some(BlockStatement {
                    statements: vec![Statement::Expression { value: ident("y") }],
                }),
            }
        );
    }

    #[test]
    fn test_function_literal_parameters() {
        let tests = vec![
            ("fn() {};", vec![]),
            ("fn(x) {};", vec!["x"]),
            ("fn(x, y, z) {};", vec!["x", "y", "z"]),
        ];

        for (input, expected) in tests {
            match single_expression(input) {
                Expression::Function { parameters, body } => {
                    assert_eq!(parameters, expected);
                    assert!(body.statements.is_empty());
                }
                other => panic!("expected function literal, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_for_statement() {
        let program = parse("for (let i = 0; i < 3; i = i + 1) { if (i == 1) { continue; } break; }");

        assert_eq!(
            program.statements,
            vec![Statement::For {
                init: Box::new(Statement::Let {
                    name: "i".into(),
                    value: Expression::Integer(0),
                }),
                condition: infix(ident("i"), Token::Lt, Expression::Integer(3)),
                post: Box::new(Statement::Assign {
                    name: "i".into(),
                    value: infix(ident("i"), Token::Plus, Expression::Integer(1)),
                }),
                body: BlockStatement {
                    statements: vec![
                        Statement::Expression {
                            value: Expression::If {
                                condition: Box::new(infix(
                                    ident("i"),
                                    Token::Eq,
                                    Expression::Integer(1)
                                )),
                                consequence: BlockStatement {
                                    statements: vec![Statement::Continue],
                                },
                                alternative: None,
                            }
                        },
                        Statement::Break,
                    ],
                },
            }]
        );
    }

    #[test]
    fn test_round_trip_rendering() {
        let inputs = vec![
            "5",
            "2.5",
            "100000000000000000000.0",
            "0.000000125",
            r#""a \"quoted\" string""#,
            "true",
            "[1, 2, 3]",
            r#"{"a": 1, 2: true}"#,
            "a + b * c - d",
            "-a == !b",
            "fn(x, y) { x + y; }",
            "fn() { let z = 1; return z; }",
            "fn(a) { if (a > 1) { a } else { fn(b) { b } } }",
            "add(1, 2)[0]",
        ];

        for input in inputs {
            let rendered = parse(input).to_string();
            let rerendered = parse(&rendered).to_string();
            assert_eq!(rendered, rerendered, "input: {}", input);
        }
    }

    #[test]
    fn test_function_parameters_render_without_whitespace() {
        assert_eq!(parse("fn(x, y) { x }").to_string(), "fn(x,y) { x }");
    }

    #[test]
    fn test_parser_errors() {
        let tests = vec![
            ("let = 5;", "expected next token to be IDENT, got = instead"),
            ("let x 5;", "expected next token to be =, got 5 instead"),
            ("@", "no prefix parse function for @ found"),
            (
                "99999999999999999999",
                "could not parse \"99999999999999999999\" as integer",
            ),
            ("fn(x { x }", "expected next token to be ), got { instead"),
        ];

        for (input, expected) in tests {
            let errors = parse_errors(input);
            assert!(
                errors.iter().any(|e| e == expected),
                "input: {}, errors: {:?}",
                input,
                errors
            );
        }
    }

    #[test]
    fn test_parser_continues_after_error() {
        let mut parser = Parser::new(Lexer::new("let = 1; let y = 2;"));
        let program = parser.parse_program();

        assert!(!parser.errors().is_empty());
        assert!(program.statements.contains(&Statement::Let {
            name: "y".into(),
            value: Expression::Integer(2),
        }));
    }
}
