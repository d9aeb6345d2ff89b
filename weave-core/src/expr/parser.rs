//! Recursive-descent parser.
//!
//! Precedence, lowest first:
//!
//! | Level | Forms |
//! |---|---|
//! | sequence | `a; b` |
//! | assignment | `=`, `+=`, `-=`, arrow lambdas |
//! | conditional | `a ? b : c` |
//! | logical or | `\|\|`, `??` |
//! | logical and | `&&` |
//! | equality | `===`, `!==` |
//! | relational | `<`, `>`, `<=`, `>=` |
//! | additive | `+`, `-` |
//! | multiplicative | `*`, `/`, `%` |
//! | unary | `!`, `-`, `+` |
//! | postfix | `.name`, `[index]`, `(args)` |
//! | primary | literals, identifiers, `( )`, `[ ]`, `{ }` |

use std::sync::Arc;

use crate::error::ParseError;
use crate::value::Value;

use super::ast::{BinaryOp, Element, Expr, LogicalOp, Property, UnaryOp};
use super::lexer::{tokenize, Spanned, Token};

/// Maximum nesting of sub-expressions.
pub const MAX_DEPTH: usize = 64;

/// Parse a complete expression.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.sequence()?;
    match parser.peek_spanned() {
        None => Ok(expr),
        Some(spanned) => Err(ParseError::UnexpectedToken {
            found: spanned.token.describe(),
            expected: "end of expression",
            offset: spanned.offset,
        }),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

type ParseResult = Result<Expr, ParseError>;

impl Parser {
    // ---- Token helpers ----

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.peek_spanned().map_or_else(
            || self.tokens.last().map_or(0, |s| s.offset),
            |s| s.offset,
        )
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek_spanned() {
            Some(spanned) => ParseError::UnexpectedToken {
                found: spanned.token.describe(),
                expected,
                offset: spanned.offset,
            },
            None => ParseError::UnexpectedEnd { expected },
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ---- Grammar ----

    fn sequence(&mut self) -> ParseResult {
        let mut items = vec![self.assignment()?];
        while self.eat(&Token::Semicolon) {
            if self.peek().is_none() {
                break;
            }
            if self.peek() == Some(&Token::Semicolon) {
                continue;
            }
            items.push(self.assignment()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Sequence(items)
        })
    }

    fn assignment(&mut self) -> ParseResult {
        self.nested(|p| {
            if p.at_arrow() {
                return p.lambda();
            }

            let offset = p.offset();
            let target = p.conditional()?;
            let op = match p.peek() {
                Some(Token::Assign) => None,
                Some(Token::PlusAssign) => Some(BinaryOp::Add),
                Some(Token::MinusAssign) => Some(BinaryOp::Sub),
                _ => return Ok(target),
            };
            if !target.is_assignable() {
                return Err(ParseError::InvalidAssignmentTarget { offset });
            }
            p.pos += 1;

            let value = p.assignment()?;
            let value = match op {
                None => value,
                Some(op) => Expr::Binary {
                    op,
                    left: Box::new(target.clone()),
                    right: Box::new(value),
                },
            };
            Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
            })
        })
    }

    /// Whether the upcoming tokens start an arrow lambda.
    fn at_arrow(&self) -> bool {
        match self.peek() {
            Some(Token::Ident(_)) => self.peek_at(1) == Some(&Token::Arrow),
            Some(Token::LParen) => {
                let mut ahead = 1;
                loop {
                    match self.peek_at(ahead) {
                        Some(Token::RParen) => return self.peek_at(ahead + 1) == Some(&Token::Arrow),
                        Some(Token::Ident(_)) => {
                            ahead += 1;
                            match self.peek_at(ahead) {
                                Some(Token::Comma) => ahead += 1,
                                Some(Token::RParen) => {}
                                _ => return false,
                            }
                        }
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }

    fn lambda(&mut self) -> ParseResult {
        let mut params = Vec::new();
        if let Some(Token::Ident(name)) = self.peek().cloned() {
            self.pos += 1;
            params.push(name);
        } else {
            self.expect(&Token::LParen, "`(`")?;
            while let Some(Token::Ident(name)) = self.peek().cloned() {
                self.pos += 1;
                params.push(name);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen, "`)`")?;
        }
        self.expect(&Token::Arrow, "`=>`")?;
        let body = self.assignment()?;
        Ok(Expr::Lambda {
            params: params.into(),
            body: Arc::new(body),
        })
    }

    fn conditional(&mut self) -> ParseResult {
        let test = self.logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect(&Token::Colon, "`:`")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_or(&mut self) -> ParseResult {
        let mut left = self.logical_and()?;
        loop {
            let op = match self.peek() {
                Some(Token::Or) => LogicalOp::Or,
                Some(Token::Nullish) => LogicalOp::Nullish,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> ParseResult {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> ParseResult,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> ParseResult {
        let mut left = next(self)?;
        while let Some(op) = self.peek().and_then(op_for) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> ParseResult {
        self.binary_level(Self::relational, |t| match t {
            Token::StrictEq => Some(BinaryOp::StrictEq),
            Token::StrictNe => Some(BinaryOp::StrictNe),
            _ => None,
        })
    }

    fn relational(&mut self) -> ParseResult {
        self.binary_level(Self::additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Le => Some(BinaryOp::Le),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> ParseResult {
        self.binary_level(Self::multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> ParseResult {
        self.binary_level(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> ParseResult {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.pos += 1;
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> ParseResult {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let Some(Token::Ident(name)) = self.peek().cloned() else {
                        return Err(self.unexpected("property name"));
                    };
                    self.pos += 1;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        name,
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.assignment()?;
                    self.expect(&Token::RBracket, "`]`")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.elements(&Token::RParen, "`)`")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma-separated items with optional spread, up to `close`.
    fn elements(&mut self, close: &Token, expected: &'static str) -> Result<Vec<Element>, ParseError> {
        let mut elements = Vec::new();
        while !self.eat(close) {
            let element = if self.eat(&Token::Ellipsis) {
                Element::Spread(self.assignment()?)
            } else {
                Element::Item(self.assignment()?)
            };
            elements.push(element);
            if !self.eat(&Token::Comma) {
                self.expect(close, expected)?;
                break;
            }
        }
        Ok(elements)
    }

    fn primary(&mut self) -> ParseResult {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return Err(ParseError::UnexpectedEnd { expected: "expression" });
        };
        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::String(s) => Ok(Expr::Literal(Value::from(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                _ => Expr::Ident(name),
            }),
            Token::LParen => {
                let inner = self.assignment()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::LBracket => self.nested(|p| Ok(Expr::Array(p.elements(&Token::RBracket, "`]`")?))),
            Token::LBrace => self.nested(Self::object),
            other => Err(ParseError::UnexpectedToken {
                found: other.describe(),
                expected: "expression",
                offset,
            }),
        }
    }

    fn object(&mut self) -> ParseResult {
        let mut properties = Vec::new();
        while !self.eat(&Token::RBrace) {
            let property = if self.eat(&Token::Ellipsis) {
                Property::Spread(self.assignment()?)
            } else if self.eat(&Token::LBracket) {
                let key = self.assignment()?;
                self.expect(&Token::RBracket, "`]`")?;
                self.expect(&Token::Colon, "`:`")?;
                Property::Computed {
                    key,
                    value: self.assignment()?,
                }
            } else {
                let key = match self.advance() {
                    Some(Token::Ident(name)) => {
                        if matches!(self.peek(), Some(Token::Comma | Token::RBrace)) {
                            properties.push(Property::Static {
                                key: name.clone(),
                                value: Expr::Ident(name),
                            });
                            if !self.eat(&Token::Comma) {
                                self.expect(&Token::RBrace, "`}`")?;
                                break;
                            }
                            continue;
                        }
                        name
                    }
                    Some(Token::String(s)) => s,
                    Some(Token::Number(n)) => crate::value::format_number(n),
                    Some(_) => {
                        self.pos -= 1;
                        return Err(self.unexpected("property key"));
                    }
                    None => return Err(ParseError::UnexpectedEnd { expected: "property key" }),
                };
                self.expect(&Token::Colon, "`:`")?;
                Property::Static {
                    key,
                    value: self.assignment()?,
                }
            };
            properties.push(property);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace, "`}`")?;
                break;
            }
        }
        Ok(Expr::Object(properties))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Number(n)))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("a + b * 2").unwrap(),
            Expr::Binary {
                op: BinaryOp::Add,
                left: ident("a"),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: ident("b"),
                    right: num(2.0),
                }),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let Expr::Logical { op, right, .. } = parse("a || b && c").unwrap() else {
            panic!("expected logical");
        };
        assert_eq!(op, LogicalOp::Or);
        assert!(matches!(*right, Expr::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn member_chains_and_calls() {
        let expr = parse("user.name.toUpperCase()").unwrap();
        let Expr::Call { callee, args } = expr else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert!(matches!(*callee, Expr::Member { ref name, .. } if name == "toUpperCase"));
    }

    #[test]
    fn arrow_lambdas() {
        let Expr::Lambda { params, .. } = parse("x => x * 2").unwrap() else {
            panic!("expected lambda");
        };
        assert_eq!(&*params, ["x".to_string()]);

        let Expr::Lambda { params, .. } = parse("(acc, x) => acc + x").unwrap() else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 2);

        assert!(matches!(parse("() => 1").unwrap(), Expr::Lambda { .. }));
        // A parenthesized expression is not a lambda.
        assert!(matches!(parse("(a)").unwrap(), Expr::Ident(_)));
    }

    #[test]
    fn object_literals() {
        let Expr::Object(properties) = parse("{ a: 1, 'b-c': 2, d, [k]: 3, ...rest, }").unwrap() else {
            panic!("expected object");
        };
        assert_eq!(properties.len(), 5);
        assert!(matches!(&properties[1], Property::Static { key, .. } if key == "b-c"));
        assert!(matches!(&properties[2], Property::Static { value: Expr::Ident(v), .. } if v == "d"));
        assert!(matches!(&properties[3], Property::Computed { .. }));
        assert!(matches!(&properties[4], Property::Spread(_)));
    }

    #[test]
    fn compound_assignment_desugars() {
        let Expr::Assign { target, value } = parse("count += 1").unwrap() else {
            panic!("expected assignment");
        };
        assert_eq!(target, ident("count"));
        assert!(matches!(*value, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn sequences() {
        let Expr::Sequence(items) = parse("a = 1; b = 2;").unwrap() else {
            panic!("expected sequence");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn conditional_is_right_associative() {
        let Expr::Conditional { alternate, .. } = parse("a ? 1 : b ? 2 : 3").unwrap() else {
            panic!("expected conditional");
        };
        assert!(matches!(*alternate, Expr::Conditional { .. }));
    }

    #[test]
    fn errors() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert!(matches!(parse("a +"), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(parse("1 = 2"), Err(ParseError::InvalidAssignmentTarget { offset: 0 })));
        assert!(matches!(
            parse("a b"),
            Err(ParseError::UnexpectedToken { offset: 2, expected: "end of expression", .. })
        ));
        assert!(matches!(parse("a."), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(parse("{ 1 + }"), Err(ParseError::UnexpectedToken { .. })));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&deep), Err(ParseError::TooDeep { limit: MAX_DEPTH }));

        let negations = format!("{}x", "!".repeat(200));
        assert_eq!(parse(&negations), Err(ParseError::TooDeep { limit: MAX_DEPTH }));
    }
}
