use std::collections::HashMap;

use super::ast::{Expr, Function, Item, Prototype};
use super::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token {0} when expecting an expression")]
    ExpectedExpression(Token),
    #[error("expected {expected}, found {found}")]
    Expected {
        expected: &'static str,
        found: Token,
    },
}

pub type ParseResult<T> = Result<T, ParserError>;

/// Recursive-descent parser with one token of lookahead. Binary operators
/// come from a runtime precedence table, so the grammar can grow new ones
/// without touching the parsing code.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    precedence: HashMap<char, u32>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let cur = lexer.next_token();
        let mut precedence = HashMap::new();
        precedence.insert('<', 10);
        precedence.insert('+', 20);
        precedence.insert('-', 20);
        precedence.insert('*', 40);
        Self {
            lexer,
            cur,
            precedence,
        }
    }

    /// Install or replace a binary operator. 1 is the lowest precedence.
    pub fn define_operator(&mut self, op: char, precedence: u32) {
        self.precedence.insert(op, precedence);
    }

    pub fn current(&self) -> &Token {
        &self.cur
    }

    /// Consume the current token. Doubles as the recovery primitive: after
    /// a parse error the driver calls this once to drop the offending token.
    pub fn advance(&mut self) {
        self.cur = self.lexer.next_token();
    }

    /// Precedence of the current token, if it is a known binary operator.
    fn cur_op(&self) -> Option<(char, u32)> {
        match self.cur {
            Token::Punct(op) => self.precedence.get(&op).map(|&prec| (op, prec)),
            _ => None,
        }
    }

    /// Parse one top-level item, skipping any stray `;` first. `Ok(None)`
    /// means the input is exhausted.
    pub fn parse_statement(&mut self) -> ParseResult<Option<Item>> {
        while self.cur == Token::Punct(';') {
            self.advance();
        }

        match self.cur {
            Token::Eof => Ok(None),
            Token::Def => Ok(Some(Item::Function(self.parse_definition()?))),
            Token::Extern => Ok(Some(Item::Extern(self.parse_extern()?))),
            _ => Ok(Some(Item::Function(self.parse_top_level_expr()?))),
        }
    }

    pub fn parse_definition(&mut self) -> ParseResult<Function> {
        self.advance();
        let proto = self.parse_prototype()?;
        let body = self.parse_expr()?;
        Ok(Function { proto, body })
    }

    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.advance();
        self.parse_prototype()
    }

    /// A bare expression at the top level becomes the body of an anonymous
    /// nullary function.
    pub fn parse_top_level_expr(&mut self) -> ParseResult<Function> {
        let body = self.parse_expr()?;
        Ok(Function::top_level(body))
    }

    fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let name = match &self.cur {
            Token::Ident(name) => name.clone(),
            found => {
                return Err(ParserError::Expected {
                    expected: "function name in prototype",
                    found: found.clone(),
                })
            }
        };
        self.advance();

        if self.cur != Token::Punct('(') {
            return Err(ParserError::Expected {
                expected: "'(' in prototype",
                found: self.cur.clone(),
            });
        }

        // Parameters are whitespace-separated, no commas.
        let mut params = Vec::new();
        loop {
            self.advance();
            match &self.cur {
                Token::Ident(param) => params.push(param.clone()),
                _ => break,
            }
        }

        if self.cur != Token::Punct(')') {
            return Err(ParserError::Expected {
                expected: "')' in prototype",
                found: self.cur.clone(),
            });
        }
        self.advance();

        Ok(Prototype { name, params })
    }

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_binop_rhs(0, lhs)
    }

    /// Precedence climbing: keep folding `op primary` pairs into `lhs` while
    /// the operator binds at least as tightly as `min_prec`, recursing when
    /// the operator after the right operand binds tighter still.
    fn parse_binop_rhs(&mut self, min_prec: u32, mut lhs: Expr) -> ParseResult<Expr> {
        loop {
            let (op, prec) = match self.cur_op() {
                Some((op, prec)) if prec >= min_prec => (op, prec),
                _ => return Ok(lhs),
            };
            self.advance();

            let mut rhs = self.parse_primary()?;
            if let Some((_, next_prec)) = self.cur_op() {
                if prec < next_prec {
                    rhs = self.parse_binop_rhs(prec + 1, rhs)?;
                }
            }

            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.cur.clone() {
            Token::Number(value) => {
                self.advance();
                Ok(Expr::Number(value))
            }
            Token::Ident(name) => self.parse_identifier(name),
            Token::Punct('(') => self.parse_paren(),
            found => Err(ParserError::ExpectedExpression(found)),
        }
    }

    /// Either a variable reference or, when a `(` follows, a call with
    /// comma-separated arguments.
    fn parse_identifier(&mut self, name: String) -> ParseResult<Expr> {
        self.advance();
        if self.cur != Token::Punct('(') {
            return Ok(Expr::Variable(name));
        }

        self.advance();
        let mut args = Vec::new();
        if self.cur != Token::Punct(')') {
            loop {
                args.push(self.parse_expr()?);
                if self.cur == Token::Punct(')') {
                    break;
                }
                if self.cur != Token::Punct(',') {
                    return Err(ParserError::Expected {
                        expected: "')' or ',' in argument list",
                        found: self.cur.clone(),
                    });
                }
                self.advance();
            }
        }
        self.advance();

        Ok(Expr::Call(name, args))
    }

    fn parse_paren(&mut self) -> ParseResult<Expr> {
        self.advance();
        let expr = self.parse_expr()?;
        if self.cur != Token::Punct(')') {
            return Err(ParserError::Expected {
                expected: "')'",
                found: self.cur.clone(),
            });
        }
        self.advance();
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(input: &str) -> Expr {
        Parser::new(input).parse_expr().unwrap()
    }

    fn binary(op: char, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            expr("x + 1 * 2"),
            binary(
                '+',
                Expr::Variable("x".to_string()),
                binary('*', Expr::Number(1.0), Expr::Number(2.0)),
            )
        );
        assert_eq!(
            expr("1 * 2 + 3"),
            binary(
                '+',
                binary('*', Expr::Number(1.0), Expr::Number(2.0)),
                Expr::Number(3.0),
            )
        );
    }

    #[test]
    fn equal_precedence_associates_left() {
        assert_eq!(
            expr("1 - 2 - 3"),
            binary(
                '-',
                binary('-', Expr::Number(1.0), Expr::Number(2.0)),
                Expr::Number(3.0),
            )
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(
            expr("(x + 1) * 2"),
            binary(
                '*',
                binary('+', Expr::Variable("x".to_string()), Expr::Number(1.0)),
                Expr::Number(2.0),
            )
        );
    }

    #[test]
    fn comparison_binds_loosest() {
        assert_eq!(
            expr("a < b + 1"),
            binary(
                '<',
                Expr::Variable("a".to_string()),
                binary('+', Expr::Variable("b".to_string()), Expr::Number(1.0)),
            )
        );
    }

    #[test]
    fn calls_parse_arguments() {
        assert_eq!(
            expr("f(1, x + 2, g())"),
            Expr::Call(
                "f".to_string(),
                vec![
                    Expr::Number(1.0),
                    binary('+', Expr::Variable("x".to_string()), Expr::Number(2.0)),
                    Expr::Call("g".to_string(), vec![]),
                ],
            )
        );
    }

    #[test]
    fn expression_stops_at_unknown_operator() {
        let mut parser = Parser::new("1 ? 2");
        assert_eq!(parser.parse_expr(), Ok(Expr::Number(1.0)));
        assert_eq!(parser.current(), &Token::Punct('?'));
    }

    #[test]
    fn custom_operators_extend_the_grammar() {
        let mut parser = Parser::new("1 | 2 + 3");
        parser.define_operator('|', 5);
        assert_eq!(
            parser.parse_expr(),
            Ok(binary(
                '|',
                Expr::Number(1.0),
                binary('+', Expr::Number(2.0), Expr::Number(3.0)),
            ))
        );
    }

    #[test]
    fn parse_extern_prototype() {
        let mut parser = Parser::new("extern hypot(x y);");
        assert_eq!(
            parser.parse_statement(),
            Ok(Some(Item::Extern(Prototype {
                name: "hypot".to_string(),
                params: vec!["x".to_string(), "y".to_string()],
            })))
        );
    }

    #[test]
    fn parse_definition_wraps_prototype_and_body() {
        let mut parser = Parser::new("def id(x) x");
        assert_eq!(
            parser.parse_statement(),
            Ok(Some(Item::Function(Function {
                proto: Prototype {
                    name: "id".to_string(),
                    params: vec!["x".to_string()],
                },
                body: Expr::Variable("x".to_string()),
            })))
        );
    }

    #[test]
    fn top_level_expression_becomes_anonymous_function() {
        let mut parser = Parser::new("2 + 2;");
        let item = parser.parse_statement().unwrap().unwrap();
        match item {
            Item::Function(function) => {
                assert!(function.proto.is_anonymous());
                assert_eq!(function.proto.params, Vec::<String>::new());
                assert_eq!(function.body, binary('+', Expr::Number(2.0), Expr::Number(2.0)));
            }
            other => panic!("expected a function, got {:?}", other),
        }
    }

    #[test]
    fn statements_skip_stray_semicolons() {
        let mut parser = Parser::new(";; def one() 1 ;;");
        assert!(matches!(parser.parse_statement(), Ok(Some(Item::Function(_)))));
        assert_eq!(parser.parse_statement(), Ok(None));
    }

    #[test]
    fn missing_close_paren_is_reported() {
        let mut parser = Parser::new("(1 + 2");
        assert_eq!(
            parser.parse_expr(),
            Err(ParserError::Expected {
                expected: "')'",
                found: Token::Eof,
            })
        );
    }

    #[test]
    fn bad_argument_list_is_reported() {
        let mut parser = Parser::new("f(1; 2)");
        assert_eq!(
            parser.parse_expr(),
            Err(ParserError::Expected {
                expected: "')' or ',' in argument list",
                found: Token::Punct(';'),
            })
        );
    }

    #[test]
    fn prototype_errors_name_the_missing_piece() {
        assert_eq!(
            Parser::new("def (x) x").parse_statement(),
            Err(ParserError::Expected {
                expected: "function name in prototype",
                found: Token::Punct('('),
            })
        );
        assert_eq!(
            Parser::new("extern f;").parse_statement(),
            Err(ParserError::Expected {
                expected: "'(' in prototype",
                found: Token::Punct(';'),
            })
        );
        assert_eq!(
            Parser::new("extern f(a b;").parse_statement(),
            Err(ParserError::Expected {
                expected: "')' in prototype",
                found: Token::Punct(';'),
            })
        );
    }

    #[test]
    fn statement_error_on_leading_operator() {
        assert_eq!(
            Parser::new("+ 1").parse_statement(),
            Err(ParserError::ExpectedExpression(Token::Punct('+')))
        );
    }
}
