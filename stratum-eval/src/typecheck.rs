//! Return-type derivation (spec.md §4.8): given a `TableSchema`, derive the
//! `Schema { dtype, nullable }` an expression would produce if evaluated.

use stratum_base::{err_kind, Dtype, ErrorKind, Result, Schema, TableSchema};
use stratum_lang::{Expr, InfixOp, Literal, PrefixOp};

/// Promotes two compatible dtypes (spec.md §4.8): identical dtypes pass through;
/// `int`/`float` promote to `float`; either side being `null` yields the other side
/// (a `null` literal or all-null column is compatible with anything).
fn promote(a: Dtype, b: Dtype) -> Option<Dtype> {
    match (a, b) {
        (x, y) if x == y => Some(x),
        (Dtype::Null, x) | (x, Dtype::Null) => Some(x),
        (Dtype::Int, Dtype::Float) | (Dtype::Float, Dtype::Int) => Some(Dtype::Float),
        _ => None,
    }
}

fn coalesce_types(dtypes: &[Dtype]) -> Result<Dtype> {
    let mut iter = dtypes.iter().copied();
    let Some(first) = iter.next() else {
        return Err(err_kind(ErrorKind::EmptyProjection, "coalesce requires at least one argument"));
    };
    let mut acc = first;
    for d in iter {
        if d == acc {
            continue;
        }
        if matches!((acc, d), (Dtype::Int, Dtype::Float) | (Dtype::Float, Dtype::Int)) {
            acc = Dtype::Float;
            continue;
        }
        return Err(err_kind(ErrorKind::TypeMismatch, format!("coalesce: incompatible types {acc} and {d}")));
    }
    Ok(acc)
}

pub fn typecheck(expr: &Expr, schema: &TableSchema) -> Result<Schema> {
    match expr {
        Expr::Literal(Literal::Null) => Ok(Schema::new("", Dtype::Null, false)),
        Expr::Literal(lit) => {
            let dtype = match lit {
                Literal::Int(_) => Dtype::Int,
                Literal::Float(_) => Dtype::Float,
                Literal::Str(_) => Dtype::String,
                Literal::Bool(_) => Dtype::Bool,
                Literal::Null => unreachable!(),
            };
            Ok(Schema::new("", dtype, false))
        }
        Expr::Star => Err(err_kind(ErrorKind::InvalidQuery, "'*' cannot be typechecked standalone")),
        Expr::Ident { name, quoted } => {
            let (_, col) = schema
                .find(name, *quoted)
                .ok_or_else(|| err_kind(ErrorKind::UnknownColumn, format!("unknown column {name:?}")))?;
            Ok(col.clone())
        }
        Expr::Prefix { op: PrefixOp::Neg, expr } => {
            let inner = typecheck(expr, schema)?;
            if !inner.dtype.is_numeric() && inner.dtype != Dtype::Null {
                return Err(err_kind(ErrorKind::WrongArgumentType, "unary '-' requires a numeric operand"));
            }
            Ok(Schema::new("", inner.dtype, inner.nullable))
        }
        Expr::Prefix { op: PrefixOp::Not, expr } => {
            let inner = typecheck(expr, schema)?;
            if inner.dtype != Dtype::Bool && inner.dtype != Dtype::Null {
                return Err(err_kind(ErrorKind::WrongArgumentType, "unary 'not' requires a bool operand"));
            }
            Ok(Schema::new("", Dtype::Bool, inner.nullable))
        }
        Expr::Infix { op, lhs, rhs } => typecheck_infix(*op, lhs, rhs, schema),
        Expr::In { expr, list, .. } => {
            let target = typecheck(expr, schema)?;
            for item in list {
                let item_ty = typecheck(item, schema)?;
                if promote(target.dtype, item_ty.dtype).is_none() {
                    return Err(err_kind(ErrorKind::TypeMismatch, "IN list member type incompatible with expression"));
                }
            }
            Ok(Schema::new("", Dtype::Bool, true))
        }
        Expr::Call { name, args, .. } => typecheck_call(name, args, schema),
        Expr::Relabel { expr, name } => {
            let mut inner = typecheck(expr, schema)?;
            inner.name = name.clone();
            Ok(inner)
        }
        Expr::Parens(inner) | Expr::Ordering { expr: inner, .. } => typecheck(inner, schema),
        Expr::Tuple(_) => Err(err_kind(ErrorKind::InvalidTuple, "a bare tuple has no type outside of IN")),
    }
}

fn typecheck_infix(op: InfixOp, lhs: &Expr, rhs: &Expr, schema: &TableSchema) -> Result<Schema> {
    let l = typecheck(lhs, schema)?;
    let r = typecheck(rhs, schema)?;
    let nullable = l.nullable || r.nullable;
    match op {
        InfixOp::And | InfixOp::Or => {
            if !matches!(l.dtype, Dtype::Bool | Dtype::Null) || !matches!(r.dtype, Dtype::Bool | Dtype::Null) {
                return Err(err_kind(ErrorKind::WrongArgumentType, "and/or require bool operands"));
            }
            Ok(Schema::new("", Dtype::Bool, nullable))
        }
        InfixOp::Add | InfixOp::Sub | InfixOp::Mul => {
            let Some(promoted) = promote(l.dtype, r.dtype) else {
                return Err(err_kind(ErrorKind::TypeMismatch, format!("{:?} incompatible with {:?}", l.dtype, r.dtype)));
            };
            if !promoted.is_numeric() && promoted != Dtype::Null {
                return Err(err_kind(ErrorKind::WrongArgumentType, "arithmetic requires numeric operands"));
            }
            Ok(Schema::new("", promoted, nullable))
        }
        InfixOp::Div => {
            if promote(l.dtype, r.dtype).is_none() {
                return Err(err_kind(ErrorKind::TypeMismatch, format!("{:?} incompatible with {:?}", l.dtype, r.dtype)));
            }
            Ok(Schema::new("", Dtype::Float, nullable))
        }
        InfixOp::Eq | InfixOp::Ne | InfixOp::Lt | InfixOp::Le | InfixOp::Gt | InfixOp::Ge | InfixOp::Is => {
            if promote(l.dtype, r.dtype).is_none() {
                return Err(err_kind(ErrorKind::TypeMismatch, format!("{:?} incompatible with {:?}", l.dtype, r.dtype)));
            }
            Ok(Schema::new("", Dtype::Bool, nullable))
        }
    }
}

const TRIG_FNS: &[&str] =
    &["sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "sqrt", "exp", "exp2", "log", "log2", "log10"];

/// Whether `expr`'s tree contains an aggregate call anywhere, used both to reject
/// nested aggregation and by the query runner to classify a projection as aggregating.
pub fn contains_aggregate(expr: &Expr) -> bool {
    match expr.unwrap_transparent() {
        Expr::Call { name, args, .. } => {
            matches!(name.as_str(), "count" | "min" | "max" | "sum" | "avg") || args.iter().any(contains_aggregate)
        }
        Expr::Infix { lhs, rhs, .. } => contains_aggregate(lhs) || contains_aggregate(rhs),
        Expr::Prefix { expr, .. } => contains_aggregate(expr),
        Expr::In { expr, list, .. } => contains_aggregate(expr) || list.iter().any(contains_aggregate),
        Expr::Relabel { expr, .. } => contains_aggregate(expr),
        _ => false,
    }
}

fn typecheck_call(name: &str, args: &[Expr], schema: &TableSchema) -> Result<Schema> {
    if matches!(name, "count" | "min" | "max" | "sum" | "avg") && args.iter().any(contains_aggregate) {
        return Err(err_kind(ErrorKind::NoNestedAggregations, format!("{name} may not contain a nested aggregate")));
    }
    let arg_tys: Vec<Schema> = args.iter().map(|a| typecheck(a, schema)).collect::<Result<_>>()?;
    match name {
        "count" => {
            if arg_tys.len() > 1 {
                return Err(err_kind(ErrorKind::WrongArgumentCount, "count takes 0 or 1 arguments"));
            }
            Ok(Schema::new("", Dtype::Int, false))
        }
        "min" | "max" => {
            let [a] = require_n(&arg_tys, name)?;
            Ok(Schema::new("", a.dtype, a.nullable))
        }
        "sum" => {
            let [a] = require_n(&arg_tys, name)?;
            if !a.dtype.is_numeric() {
                return Err(err_kind(ErrorKind::WrongArgumentType, "sum requires a numeric argument"));
            }
            Ok(Schema::new("", a.dtype, a.nullable))
        }
        "avg" => {
            let [a] = require_n(&arg_tys, name)?;
            if !a.dtype.is_numeric() {
                return Err(err_kind(ErrorKind::WrongArgumentType, "avg requires a numeric argument"));
            }
            Ok(Schema::new("", Dtype::Float, a.nullable))
        }
        "round" => {
            if arg_tys.is_empty() || arg_tys.len() > 2 {
                return Err(err_kind(ErrorKind::WrongArgumentCount, "round takes 1 or 2 arguments"));
            }
            if !arg_tys[0].dtype.is_numeric() {
                return Err(err_kind(ErrorKind::WrongArgumentType, "round requires a numeric first argument"));
            }
            Ok(Schema::new("", Dtype::Float, arg_tys[0].nullable))
        }
        "nullif" => {
            let [a, _b] = require_2(&arg_tys, name)?;
            Ok(Schema::new("", a.dtype, true))
        }
        "coalesce" => {
            if arg_tys.is_empty() {
                return Err(err_kind(ErrorKind::WrongArgumentCount, "coalesce requires at least one argument"));
            }
            let dtype = coalesce_types(&arg_tys.iter().map(|s| s.dtype).collect::<Vec<_>>())?;
            let nullable = arg_tys.iter().all(|s| s.nullable);
            Ok(Schema::new("", dtype, nullable))
        }
        "trim" | "lower" | "upper" => {
            let [a] = require_n(&arg_tys, name)?;
            if a.dtype != Dtype::String {
                return Err(err_kind(ErrorKind::WrongArgumentType, format!("{name} requires a string argument")));
            }
            Ok(Schema::new("", Dtype::String, a.nullable))
        }
        "left" => {
            let [a, b] = require_2(&arg_tys, name)?;
            if a.dtype != Dtype::String || b.dtype != Dtype::Int {
                return Err(err_kind(ErrorKind::WrongArgumentType, "left requires (string, int)"));
            }
            Ok(Schema::new("", Dtype::String, a.nullable || b.nullable))
        }
        _ if TRIG_FNS.contains(&name) => {
            let [a] = require_n(&arg_tys, name)?;
            if !a.dtype.is_numeric() {
                return Err(err_kind(ErrorKind::WrongArgumentType, format!("{name} requires a numeric argument")));
            }
            Ok(Schema::new("", Dtype::Float, true))
        }
        _ => Err(err_kind(ErrorKind::WrongArgumentType, format!("unknown function {name:?}"))),
    }
}

fn require_n(tys: &[Schema], name: &str) -> Result<[&Schema; 1]> {
    match tys {
        [a] => Ok([a]),
        _ => Err(err_kind(ErrorKind::WrongArgumentCount, format!("{name} takes exactly 1 argument"))),
    }
}

fn require_2<'a>(tys: &'a [Schema], name: &str) -> Result<[&'a Schema; 2]> {
    match tys {
        [a, b] => Ok([a, b]),
        _ => Err(err_kind(ErrorKind::WrongArgumentCount, format!("{name} takes exactly 2 arguments"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use stratum_lang::parse_expression;
    use test_log::test;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Schema::new("a", Dtype::Int, false),
            Schema::new("b", Dtype::Float, true),
            Schema::new("s", Dtype::String, false),
        ])
    }

    #[test]
    fn test_column_lookup() {
        let s = typecheck(&parse_expression("a").unwrap(), &schema()).unwrap();
        assert_eq!(s.dtype, Dtype::Int);
        assert!(!s.nullable);
    }

    #[test]
    fn test_arithmetic_promotion() {
        let s = typecheck(&parse_expression("a + b").unwrap(), &schema()).unwrap();
        assert_eq!(s.dtype, Dtype::Float);
        assert!(s.nullable);
    }

    #[test]
    fn test_division_always_float() {
        let s = typecheck(&parse_expression("a / a").unwrap(), &schema()).unwrap();
        assert_eq!(s.dtype, Dtype::Float);
    }

    #[test]
    fn test_comparison_is_bool() {
        let s = typecheck(&parse_expression("a > 1").unwrap(), &schema()).unwrap();
        assert_eq!(s.dtype, Dtype::Bool);
    }

    #[test]
    fn test_type_mismatch() {
        assert!(typecheck(&parse_expression("a + s").unwrap(), &schema()).is_err());
    }

    #[test]
    fn test_coalesce_int_float() {
        let s = typecheck(&parse_expression("coalesce(a, b)").unwrap(), &schema()).unwrap();
        assert_eq!(s.dtype, Dtype::Float);
        assert!(!s.nullable);
    }

    #[test]
    fn test_nullif_always_nullable() {
        let s = typecheck(&parse_expression("nullif(a, 1)").unwrap(), &schema()).unwrap();
        assert_eq!(s.dtype, Dtype::Int);
        assert!(s.nullable);
    }

    #[test]
    fn test_unknown_column_errors() {
        assert!(typecheck(&parse_expression("nope").unwrap(), &schema()).is_err());
    }

    #[test]
    fn test_nested_aggregation_rejected() {
        let e = parse_expression("sum(min(a))").unwrap();
        let err = typecheck(&e, &schema()).unwrap_err();
        assert_eq!(err.kind(), stratum_base::ErrorKind::NoNestedAggregations);
    }
}
