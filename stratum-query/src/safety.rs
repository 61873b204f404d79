//! Aggregation-safety validation for projections (spec.md §4.11): every leaf
//! identifier in a SELECT expression must either be wrapped in an aggregator or match
//! a group expression by stringified form.

use std::collections::BTreeSet;

use stratum_base::{err_kind, ErrorKind, Result};
use stratum_lang::{stringify_expr, Expr};

fn is_aggregate_name(name: &str) -> bool {
    matches!(name, "count" | "min" | "max" | "sum" | "avg")
}

fn check_node(expr: &Expr, group_keys: &BTreeSet<String>, inside_agg: bool) -> Result<()> {
    if !inside_agg && group_keys.contains(&stringify_expr(expr)) {
        return Ok(());
    }
    match expr {
        Expr::Ident { .. } => {
            if inside_agg {
                Ok(())
            } else {
                Err(err_kind(
                    ErrorKind::InvalidProjectionInAggregation,
                    format!("{} is neither a group expression nor wrapped in an aggregator", stringify_expr(expr)),
                ))
            }
        }
        Expr::Call { name, args, .. } if is_aggregate_name(name) => {
            for a in args {
                check_node(a, group_keys, true)?;
            }
            Ok(())
        }
        Expr::Call { args, .. } => {
            for a in args {
                check_node(a, group_keys, inside_agg)?;
            }
            Ok(())
        }
        Expr::Prefix { expr, .. } => check_node(expr, group_keys, inside_agg),
        Expr::Infix { lhs, rhs, .. } => {
            check_node(lhs, group_keys, inside_agg)?;
            check_node(rhs, group_keys, inside_agg)
        }
        Expr::In { expr, list, .. } => {
            check_node(expr, group_keys, inside_agg)?;
            for item in list {
                check_node(item, group_keys, inside_agg)?;
            }
            Ok(())
        }
        Expr::Relabel { expr, .. } | Expr::Parens(expr) | Expr::Ordering { expr, .. } => {
            check_node(expr, group_keys, inside_agg)
        }
        Expr::Tuple(items) => {
            for item in items {
                check_node(item, group_keys, inside_agg)?;
            }
            Ok(())
        }
        Expr::Literal(_) | Expr::Star => Ok(()),
    }
}

pub fn check_aggregation_safe(select: &[Expr], group_by: &[Expr]) -> Result<()> {
    let group_keys: BTreeSet<String> = group_by.iter().map(stringify_expr).collect();
    for expr in select {
        check_node(expr, &group_keys, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use stratum_lang::parse_expression;
    use test_log::test;

    #[test]
    fn test_group_key_projection_is_safe() {
        let select = vec![parse_expression("a").unwrap(), parse_expression("sum(b)").unwrap()];
        let group_by = vec![parse_expression("a").unwrap()];
        assert!(check_aggregation_safe(&select, &group_by).is_ok());
    }

    #[test]
    fn test_ungrouped_identifier_is_unsafe() {
        let select = vec![parse_expression("b").unwrap()];
        let group_by = vec![parse_expression("a").unwrap()];
        let err = check_aggregation_safe(&select, &group_by).unwrap_err();
        assert_eq!(err.kind(), stratum_base::ErrorKind::InvalidProjectionInAggregation);
    }

    #[test]
    fn test_whole_expression_matching_group_key_is_safe() {
        let select = vec![parse_expression("a + 1").unwrap()];
        let group_by = vec![parse_expression("a + 1").unwrap()];
        assert!(check_aggregation_safe(&select, &group_by).is_ok());
    }
}
