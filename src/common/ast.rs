use std::fmt::Display;

use super::token::Token;

/// Joins the rendered items with `", "`.
pub fn csv_str<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn token_literal(&self) -> String {
        self.statements
            .first()
            .map(Statement::token_literal)
            .unwrap_or_default()
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self
            .statements
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&s)
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

impl Display for BlockStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.statements.is_empty() {
            return f.write_str("{ }");
        }

        let body = self
            .statements
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{{ {} }}", body)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Let {
        name: String,
        value: Expression,
    },
    Return {
        value: Expression,
    },
    Expression {
        value: Expression,
    },
    Block(BlockStatement),
    Assign {
        name: String,
        value: Expression,
    },
    For {
        init: Box<Statement>,
        condition: Expression,
        post: Box<Statement>,
        body: BlockStatement,
    },
    Break,
    Continue,
}

impl Statement {
    pub fn token_literal(&self) -> String {
        match self {
            Statement::Let { .. } => Token::Let.literal(),
            Statement::Return { .. } => Token::Return.literal(),
            Statement::Expression { value } => value.token_literal(),
            Statement::Block(_) => Token::LBrace.literal(),
            Statement::Assign { .. } => Token::Assign.literal(),
            Statement::For { .. } => Token::For.literal(),
            Statement::Break => Token::Break.literal(),
            Statement::Continue => Token::Continue.literal(),
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {} = {}", name, value),
            Statement::Return { value } => write!(f, "return {}", value),
            Statement::Expression { value } => write!(f, "{}", value),
            Statement::Block(block) => write!(f, "{}", block),
            Statement::Assign { name, value } => write!(f, "{} = {}", name, value),
            Statement::For {
                init,
                condition,
                post,
                body,
            } => write!(f, "for ({}; {}; {}) {}", init, condition, post, body),
            Statement::Break => f.write_str("break"),
            Statement::Continue => f.write_str("continue"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Identifier(String),
    Integer(i64),
    Float(f64),
    Str(String),
    Boolean(bool),
    Array(Vec<Expression>),
    /// Pairs in source order.
    Hash(Vec<(Expression, Expression)>),
    Prefix(Token, Box<Expression>),
    Infix(Box<Expression>, Token, Box<Expression>),
    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },
    Function {
        parameters: Vec<String>,
        body: BlockStatement,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

impl Expression {
    pub fn token_literal(&self) -> String {
        match self {
            Expression::Identifier(name) => name.clone(),
            Expression::Integer(value) => value.to_string(),
            Expression::Float(value) => float_literal(*value),
            Expression::Str(value) => value.clone(),
            Expression::Boolean(b) => b.to_string(),
            Expression::Array(_) | Expression::Index { .. } => Token::LBracket.literal(),
            Expression::Hash(_) => Token::LBrace.literal(),
            Expression::Prefix(token, _) | Expression::Infix(_, token, _) => token.literal(),
            Expression::If { .. } => Token::If.literal(),
            Expression::Function { .. } => Token::Function.literal(),
            Expression::Call { .. } => Token::LParen.literal(),
        }
    }
}

/// Fixed-point rendering that always keeps a fractional part, so the text
/// lexes back as a float.
fn float_literal(value: f64) -> String {
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn write_escaped(f: &mut std::fmt::Formatter<'_>, s: &str) -> std::fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Identifier(name) => f.write_str(name),
            Expression::Integer(value) => write!(f, "{}", value),
            Expression::Float(value) => f.write_str(&float_literal(*value)),
            Expression::Str(value) => write_escaped(f, value),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Array(elements) => write!(f, "[{}]", csv_str(elements)),
            Expression::Hash(pairs) => {
                let pairs = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Expression::Prefix(token, expr) => write!(f, "({}{})", token, expr),
            Expression::Infix(e1, token, e2) => write!(f, "({} {} {})", e1, token, e2),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if ({}) {}", condition, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " else {}", alternative)?;
                }
                Ok(())
            }
            Expression::Function { parameters, body } => {
                write!(f, "fn({}) {}", parameters.join(","), body)
            }
            Expression::Call {
                function,
                arguments,
            } => write!(f, "{}({})", function, csv_str(arguments)),
            Expression::Index { left, index } => write!(f, "({}[{}])", left, index),
        }
    }
}
