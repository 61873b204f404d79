//! JSON in/out for expression lists (spec.md §4.7, §9 "Query JSON"): expression
//! lists serialise as a single string that round-trips through the parser/stringer,
//! not as a structured tree.

use stratum_base::Result;

use crate::ast::Expr;
use crate::parser::parse_expression_list;
use crate::stringer::stringify_expr;

pub fn expr_list_to_json(exprs: &[Expr]) -> serde_json::Value {
    let s = exprs.iter().map(stringify_expr).collect::<Vec<_>>().join(", ");
    serde_json::Value::String(s)
}

pub fn expr_list_from_json(value: &serde_json::Value) -> Result<Vec<Expr>> {
    let s = value
        .as_str()
        .ok_or_else(|| stratum_base::err_kind(stratum_base::ErrorKind::InvalidQuery, "expression list JSON must be a string"))?;
    parse_expression_list(s)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse_expression;
    use test_log::test;

    #[test]
    fn test_json_roundtrip() {
        let exprs = vec![parse_expression("a + 1").unwrap(), parse_expression("b").unwrap()];
        let json = expr_list_to_json(&exprs);
        let back = expr_list_from_json(&json).unwrap();
        assert_eq!(exprs, back);
    }
}
