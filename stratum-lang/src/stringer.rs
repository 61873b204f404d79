//! Renders an `Expr`/`Query` back to source text. Paired with the parser to satisfy
//! the roundtrip invariant `parse(stringify(parse(q))) == parse(q)` (spec.md §4.7).

use std::fmt::{self, Write};

use crate::ast::{DatasetRef, Expr, InfixOp, Literal, PrefixOp, Query};

fn write_ident(out: &mut String, name: &str, quoted: bool) {
    if quoted {
        write!(out, "\"{}\"", name).unwrap();
    } else {
        out.push_str(name);
    }
}

fn infix_op_str(op: InfixOp) -> &'static str {
    match op {
        InfixOp::Add => "+",
        InfixOp::Sub => "-",
        InfixOp::Mul => "*",
        InfixOp::Div => "/",
        InfixOp::Eq => "=",
        InfixOp::Ne => "!=",
        InfixOp::Lt => "<",
        InfixOp::Le => "<=",
        InfixOp::Gt => ">",
        InfixOp::Ge => ">=",
        InfixOp::Is => "is",
        InfixOp::And => "and",
        InfixOp::Or => "or",
    }
}

pub fn stringify_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Literal(Literal::Int(v)) => write!(out, "{v}").unwrap(),
        Expr::Literal(Literal::Float(v)) => write!(out, "{}", v.0).unwrap(),
        Expr::Literal(Literal::Bool(v)) => write!(out, "{v}").unwrap(),
        Expr::Literal(Literal::Null) => out.push_str("null"),
        Expr::Literal(Literal::Str(s)) => {
            write!(out, "'{}'", s.replace('\'', "''")).unwrap();
        }
        Expr::Ident { name, quoted } => write_ident(out, name, *quoted),
        Expr::Star => out.push('*'),
        Expr::Prefix { op, expr } => {
            match op {
                PrefixOp::Neg => out.push('-'),
                PrefixOp::Not => out.push_str("not "),
            }
            write_expr(out, expr);
        }
        Expr::Infix { op, lhs, rhs } => {
            write_expr(out, lhs);
            write!(out, " {} ", infix_op_str(*op)).unwrap();
            write_expr(out, rhs);
        }
        Expr::Call { name, args, distinct } => {
            if name == "count" && args.is_empty() && !distinct {
                out.push_str("count(*)");
                return;
            }
            write!(out, "{name}(").unwrap();
            if *distinct {
                out.push_str("distinct ");
            }
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, a);
            }
            out.push(')');
        }
        Expr::Tuple(items) => {
            out.push('(');
            for (i, a) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, a);
            }
            out.push(')');
        }
        Expr::In { expr, list, negated } => {
            write_expr(out, expr);
            if *negated {
                out.push_str(" not in (");
            } else {
                out.push_str(" in (");
            }
            for (i, a) in list.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, a);
            }
            out.push(')');
        }
        Expr::Relabel { expr, name } => {
            write_expr(out, expr);
            write!(out, " as {name}").unwrap();
        }
        Expr::Parens(inner) => {
            out.push('(');
            write_expr(out, inner);
            out.push(')');
        }
        Expr::Ordering { expr, desc, nulls_first } => {
            write_expr(out, expr);
            out.push_str(if *desc { " desc" } else { " asc" });
            out.push_str(if *nulls_first { " nulls first" } else { " nulls last" });
        }
    }
}

pub fn stringify_query(q: &Query) -> String {
    let mut out = String::new();
    out.push_str("select ");
    for (i, e) in q.select.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(&mut out, e);
    }
    if let Some(DatasetRef { name, version }) = &q.from {
        write!(out, " from {name}").unwrap();
        if let Some(v) = version {
            write!(out, "@{v}").unwrap();
        }
    }
    if let Some(f) = &q.filter {
        out.push_str(" where ");
        write_expr(&mut out, f);
    }
    if !q.group_by.is_empty() {
        out.push_str(" group by ");
        for (i, e) in q.group_by.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write_expr(&mut out, e);
        }
    }
    if !q.order_by.is_empty() {
        out.push_str(" order by ");
        for (i, e) in q.order_by.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write_expr(&mut out, e);
        }
    }
    if let Some(limit) = q.limit {
        write!(out, " limit {limit}").unwrap();
    }
    out
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stringify_expr(self))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stringify_query(self))
    }
}
