//! Lexer and recursive-descent parser for the expression grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := '-' factor | primary
//! primary := NUMBER | IDENT | IDENT '(' args ')' | '(' expr ')'
//! args    := expr (',' expr)* | ε
//! ```
//!
//! Identifiers admit `.` and `@` so decoded variable names can be written
//! verbatim, e.g. `time_total.core@.mode@idle`.

use crate::error::ExpressionError;
use crate::expr::Node;
use crate::functions::Function;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Comma,
    LParen,
    RParen,
}

impl Token {
    fn display(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::Comma => ",".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '@'
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            c if c.is_ascii_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push((Token::Plus, offset));
            }
            '-' => {
                chars.next();
                tokens.push((Token::Minus, offset));
            }
            '*' => {
                chars.next();
                tokens.push((Token::Star, offset));
            }
            '/' => {
                chars.next();
                tokens.push((Token::Slash, offset));
            }
            ',' => {
                chars.next();
                tokens.push((Token::Comma, offset));
            }
            '(' => {
                chars.next();
                tokens.push((Token::LParen, offset));
            }
            ')' => {
                chars.next();
                tokens.push((Token::RParen, offset));
            }
            c if c.is_ascii_digit() => {
                let mut end = offset;
                let mut seen_dot = false;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() || (c == '.' && !seen_dot) {
                        seen_dot |= c == '.';
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[offset..end];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::UnexpectedToken {
                        token: text.to_string(),
                        offset,
                    })?;
                tokens.push((Token::Number(value), offset));
            }
            c if is_ident_start(c) => {
                let mut end = offset;
                while let Some(&(i, c)) = chars.peek() {
                    if is_ident_continue(c) {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(input[offset..end].to_string()), offset));
            }
            other => return Err(ExpressionError::UnexpectedCharacter { ch: other, offset }),
        }
    }

    Ok(tokens)
}

pub(crate) struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<(Token, usize)>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parses a full expression and requires the input to be exhausted.
    pub(crate) fn parse(mut self) -> Result<Node, ExpressionError> {
        let node = self.expr()?;
        match self.tokens.get(self.pos) {
            None => Ok(node),
            Some((token, offset)) => Err(ExpressionError::UnexpectedToken {
                token: token.display(),
                offset: *offset,
            }),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<(Token, usize), ExpressionError> {
        let item = self.tokens.get(self.pos).cloned().ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(item)
    }

    fn expect(&mut self, want: Token) -> Result<(), ExpressionError> {
        let (token, offset) = self.next()?;
        if token == want {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken { token: token.display(), offset })
        }
    }

    fn expr(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek() {
            let constructor = match op {
                Token::Plus => Node::add,
                Token::Minus => Node::sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = constructor(lhs, rhs);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.factor()?;
        while let Some(op) = self.peek() {
            let constructor = match op {
                Token::Star => Node::mul,
                Token::Slash => Node::div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = constructor(lhs, rhs);
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Node, ExpressionError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            let inner = self.factor()?;
            return Ok(Node::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        let (token, offset) = self.next()?;
        match token {
            Token::Number(value) => Ok(Node::Number(value)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    let function = Function::from_name(&name)
                        .ok_or(ExpressionError::UnknownFunction(name))?;
                    let mut args = Vec::new();
                    if matches!(self.peek(), Some(Token::RParen)) {
                        self.pos += 1;
                    } else {
                        loop {
                            args.push(self.expr()?);
                            let (token, offset) = self.next()?;
                            match token {
                                Token::Comma => continue,
                                Token::RParen => break,
                                other => {
                                    return Err(ExpressionError::UnexpectedToken {
                                        token: other.display(),
                                        offset,
                                    })
                                }
                            }
                        }
                    }
                    Ok(Node::Call(function, args))
                } else {
                    Ok(Node::Variable(name))
                }
            }
            other => {
                Err(ExpressionError::UnexpectedToken { token: other.display(), offset })
            }
        }
    }
}
