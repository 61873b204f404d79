//! Pratt expression parser and the `SELECT` query parser (spec.md §4.7).

use stratum_base::{err_kind, ErrorKind, Result};

use crate::ast::{DatasetRef, Expr, InfixOp, Literal, PrefixOp, Query};
use crate::token::{tokenize, Token};

pub struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(src: &str) -> Result<Self> {
        Ok(Parser { toks: tokenize(src)?, pos: 0 })
    }

    fn peek(&self) -> &Token {
        &self.toks[self.pos]
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: &Token) -> Result<()> {
        if self.peek() == t {
            self.bump();
            Ok(())
        } else {
            Err(err_kind(ErrorKind::InvalidQuery, format!("expected {:?}, found {:?}", t, self.peek())))
        }
    }

    fn at_end(&self) -> bool {
        *self.peek() == Token::Eof
    }

    // --- expression parsing (Pratt) ---

    /// Binding power for a binary operator token, lowest-to-highest per spec.md §4.7.
    fn infix_binding_power(t: &Token) -> Option<(u8, InfixOp)> {
        Some(match t {
            Token::Or => (1, InfixOp::Or),
            Token::And => (1, InfixOp::And),
            Token::Eq => (2, InfixOp::Eq),
            Token::Ne => (2, InfixOp::Ne),
            Token::Is => (2, InfixOp::Is),
            Token::Lt => (3, InfixOp::Lt),
            Token::Le => (3, InfixOp::Le),
            Token::Gt => (3, InfixOp::Gt),
            Token::Ge => (3, InfixOp::Ge),
            Token::Plus => (4, InfixOp::Add),
            Token::Minus => (4, InfixOp::Sub),
            Token::Star => (5, InfixOp::Mul),
            Token::Slash => (5, InfixOp::Div),
            _ => return None,
        })
    }

    pub fn parse_expression(&mut self) -> Result<Expr> {
        let e = self.parse_expr_bp(0)?;
        if !self.at_end() {
            return Err(err_kind(ErrorKind::InvalidQuery, format!("unparsed trailing tokens at {:?}", self.peek())));
        }
        Ok(e)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;
        loop {
            if matches!(self.peek(), Token::Not) {
                // Only "not in" is legal as a continuation here.
                let save = self.pos;
                self.bump();
                if matches!(self.peek(), Token::In) {
                    self.bump();
                    lhs = Expr::In { expr: Box::new(lhs), list: self.parse_tuple()?, negated: true };
                    continue;
                }
                self.pos = save;
            }
            if matches!(self.peek(), Token::In) {
                self.bump();
                lhs = Expr::In { expr: Box::new(lhs), list: self.parse_tuple()?, negated: false };
                continue;
            }
            let Some((bp, op)) = Self::infix_binding_power(self.peek()) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.parse_expr_bp(bp + 1)?;
            lhs = Expr::Infix { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_tuple(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        if matches!(self.peek(), Token::RParen) {
            return Err(err_kind(ErrorKind::InvalidTuple, "empty tuple in IN expression"));
        }
        let mut items = Vec::new();
        items.push(self.parse_expr_bp(0)?);
        while matches!(self.peek(), Token::Comma) {
            self.bump();
            items.push(self.parse_expr_bp(0)?);
        }
        self.expect(&Token::RParen)?;
        Ok(items)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let expr = match self.peek().clone() {
            Token::Minus => {
                self.bump();
                Expr::Prefix { op: PrefixOp::Neg, expr: Box::new(self.parse_expr_bp(6)?) }
            }
            Token::Not => {
                self.bump();
                Expr::Prefix { op: PrefixOp::Not, expr: Box::new(self.parse_expr_bp(6)?) }
            }
            Token::LParen => {
                self.bump();
                let inner = self.parse_expr_bp(0)?;
                self.expect(&Token::RParen)?;
                Expr::Parens(Box::new(inner))
            }
            Token::Int(v) => {
                self.bump();
                Expr::Literal(Literal::Int(v))
            }
            Token::Float(v) => {
                self.bump();
                Expr::Literal(Literal::Float(v.into()))
            }
            Token::Str(s) => {
                self.bump();
                Expr::Literal(Literal::Str(s))
            }
            Token::True => {
                self.bump();
                Expr::Literal(Literal::Bool(true))
            }
            Token::False => {
                self.bump();
                Expr::Literal(Literal::Bool(false))
            }
            Token::Null => {
                self.bump();
                Expr::Literal(Literal::Null)
            }
            Token::Star => {
                self.bump();
                Expr::Star
            }
            Token::Ident(name) => {
                self.bump();
                self.finish_ident_or_call(name, false)?
            }
            Token::QuotedIdent(name) => {
                self.bump();
                self.finish_ident_or_call(name, true)?
            }
            Token::Eof => return Err(err_kind(ErrorKind::EmptyExpression, "empty expression")),
            other => return Err(err_kind(ErrorKind::UnsupportedPrefix, format!("unsupported prefix token {:?}", other))),
        };
        Ok(expr)
    }

    fn finish_ident_or_call(&mut self, name: String, quoted: bool) -> Result<Expr> {
        if quoted || !matches!(self.peek(), Token::LParen) {
            return Ok(Expr::Ident { name, quoted });
        }
        self.bump(); // (
        if name == "count" && matches!(self.peek(), Token::Star) {
            self.bump();
            self.expect(&Token::RParen)?;
            return Ok(Expr::Call { name, args: vec![], distinct: false });
        }
        let mut distinct = false;
        if matches!(self.peek(), Token::Distinct) {
            self.bump();
            distinct = true;
        }
        let mut args = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            args.push(self.parse_expr_bp(0)?);
            while matches!(self.peek(), Token::Comma) {
                self.bump();
                args.push(self.parse_expr_bp(0)?);
            }
        }
        self.expect(&Token::RParen)?;
        if distinct && name != "count" {
            return Err(err_kind(ErrorKind::DistinctMisuse, "distinct is only meaningful inside count(...)"));
        }
        Ok(Expr::Call { name, args, distinct })
    }

    // --- select-list item: trailing alias handling ---

    fn parse_select_item(&mut self) -> Result<Expr> {
        let expr = self.parse_expr_bp(0)?;
        if matches!(self.peek(), Token::As) {
            self.bump();
            let name = self.expect_name()?;
            return Ok(Expr::Relabel { expr: Box::new(expr), name });
        }
        if let Token::Ident(_) | Token::QuotedIdent(_) = self.peek() {
            let name = self.expect_name()?;
            return Ok(Expr::Relabel { expr: Box::new(expr), name });
        }
        Ok(expr)
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.bump() {
            Token::Ident(n) | Token::QuotedIdent(n) => Ok(n),
            other => Err(err_kind(ErrorKind::InvalidQuery, format!("expected identifier, found {:?}", other))),
        }
    }

    fn parse_order_item(&mut self) -> Result<Expr> {
        let expr = self.parse_expr_bp(0)?;
        let desc = match self.peek() {
            Token::Asc => {
                self.bump();
                false
            }
            Token::Desc => {
                self.bump();
                true
            }
            _ => false,
        };
        let nulls_first = if matches!(self.peek(), Token::Nulls) {
            self.bump();
            match self.bump() {
                Token::First => true,
                Token::Last => false,
                other => return Err(err_kind(ErrorKind::InvalidQuery, format!("expected FIRST/LAST, found {:?}", other))),
            }
        } else {
            // Default ordering: nulls sort last for ASC, first for DESC.
            desc
        };
        Ok(Expr::Ordering { expr: Box::new(expr), desc, nulls_first })
    }

    // --- SQL query parsing ---

    pub fn parse_query(&mut self) -> Result<Query> {
        self.expect(&Token::Select)?;
        let mut select = Vec::new();
        select.push(self.parse_select_item()?);
        while matches!(self.peek(), Token::Comma) {
            self.bump();
            select.push(self.parse_select_item()?);
        }

        let from = if matches!(self.peek(), Token::From) {
            self.bump();
            let name = self.expect_name()?;
            let version = if matches!(self.peek(), Token::At) {
                self.bump();
                match self.bump() {
                    Token::Int(v) => Some(v),
                    other => return Err(err_kind(ErrorKind::InvalidQuery, format!("expected version number, found {:?}", other))),
                }
            } else {
                None
            };
            Some(DatasetRef { name, version })
        } else {
            None
        };

        let filter = if matches!(self.peek(), Token::Where) {
            self.bump();
            Some(self.parse_expr_bp(0)?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if matches!(self.peek(), Token::Group) {
            self.bump();
            self.expect(&Token::By)?;
            group_by.push(self.parse_expr_bp(0)?);
            while matches!(self.peek(), Token::Comma) {
                self.bump();
                group_by.push(self.parse_expr_bp(0)?);
            }
        }

        let mut order_by = Vec::new();
        if matches!(self.peek(), Token::Order) {
            self.bump();
            self.expect(&Token::By)?;
            order_by.push(self.parse_order_item()?);
            while matches!(self.peek(), Token::Comma) {
                self.bump();
                order_by.push(self.parse_order_item()?);
            }
        }

        let limit = if matches!(self.peek(), Token::Limit) {
            self.bump();
            match self.bump() {
                Token::Int(v) => Some(v),
                other => return Err(err_kind(ErrorKind::InvalidQuery, format!("expected integer after LIMIT, found {:?}", other))),
            }
        } else {
            None
        };

        if !self.at_end() {
            return Err(err_kind(ErrorKind::InvalidQuery, format!("unparsed trailing tokens at {:?}", self.peek())));
        }

        Ok(Query { select, from, filter, group_by, order_by, limit })
    }
}

pub fn parse_expression(src: &str) -> Result<Expr> {
    Parser::new(src)?.parse_expression()
}

pub fn parse_expression_list(src: &str) -> Result<Vec<Expr>> {
    let mut p = Parser::new(src)?;
    let mut items = vec![p.parse_expr_bp(0)?];
    while matches!(p.peek(), Token::Comma) {
        p.bump();
        items.push(p.parse_expr_bp(0)?);
    }
    if !p.at_end() {
        return Err(err_kind(ErrorKind::InvalidQuery, format!("unparsed trailing tokens at {:?}", p.peek())));
    }
    Ok(items)
}

pub fn parse_query(src: &str) -> Result<Query> {
    Parser::new(src)?.parse_query()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stringer::stringify_query;
    use test_log::test;

    #[test]
    fn test_parse_simple_binary() {
        let e = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            e,
            Expr::Infix {
                op: InfixOp::Add,
                lhs: Box::new(Expr::Literal(Literal::Int(1))),
                rhs: Box::new(Expr::Infix {
                    op: InfixOp::Mul,
                    lhs: Box::new(Expr::Literal(Literal::Int(2))),
                    rhs: Box::new(Expr::Literal(Literal::Int(3))),
                }),
            }
        );
    }

    #[test]
    fn test_parse_and_or_same_precedence_left_assoc() {
        let e = parse_expression("a or b and c").unwrap();
        // OR and AND share precedence per spec.md §4.7: left-to-right, so this is
        // (a or b) and c, not a or (b and c).
        match e {
            Expr::Infix { op: InfixOp::And, lhs, .. } => {
                assert!(matches!(*lhs, Expr::Infix { op: InfixOp::Or, .. }));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_count_star() {
        let e = parse_expression("count(*)").unwrap();
        assert_eq!(e, Expr::Call { name: "count".into(), args: vec![], distinct: false });
    }

    #[test]
    fn test_count_distinct() {
        let e = parse_expression("count(distinct x)").unwrap();
        match e {
            Expr::Call { name, args, distinct } => {
                assert_eq!(name, "count");
                assert_eq!(args.len(), 1);
                assert!(distinct);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_distinct_outside_aggregator_errors() {
        assert!(parse_expression("sum(distinct x)").is_err());
    }

    #[test]
    fn test_in_tuple() {
        let e = parse_expression("x in (1, 2, 3)").unwrap();
        assert!(matches!(e, Expr::In { negated: false, .. }));
    }

    #[test]
    fn test_not_in_tuple() {
        let e = parse_expression("x not in (1, 2)").unwrap();
        assert!(matches!(e, Expr::In { negated: true, .. }));
    }

    #[test]
    fn test_empty_tuple_errors() {
        assert!(parse_expression("x in ()").is_err());
    }

    #[test]
    fn test_query_roundtrip() {
        let q1 = parse_query("select a, b as c from t where a > 1 group by a order by a asc nulls last limit 10").unwrap();
        let s = stringify_query(&q1);
        let q2 = parse_query(&s).unwrap();
        assert_eq!(q1, q2);
    }

    #[test]
    fn test_implicit_alias() {
        let q = parse_query("select foo bar from t").unwrap();
        assert!(matches!(&q.select[0], Expr::Relabel { name, .. } if name == "bar"));
    }

    #[test]
    fn test_unparsed_trailing_tokens_error() {
        assert!(parse_expression("1 2").is_err());
    }
}
