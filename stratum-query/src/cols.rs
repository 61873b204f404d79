//! Identifier collection, used to compute the minimal set of columns a query needs
//! to read from a stripe (spec.md §4.11, "cols_used").

use std::collections::BTreeSet;

use stratum_lang::Expr;

pub fn collect_identifiers(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Ident { name, .. } => {
            out.insert(name.clone());
        }
        Expr::Prefix { expr, .. } => collect_identifiers(expr, out),
        Expr::Infix { lhs, rhs, .. } => {
            collect_identifiers(lhs, out);
            collect_identifiers(rhs, out);
        }
        Expr::Call { args, .. } => args.iter().for_each(|a| collect_identifiers(a, out)),
        Expr::In { expr, list, .. } => {
            collect_identifiers(expr, out);
            list.iter().for_each(|e| collect_identifiers(e, out));
        }
        Expr::Relabel { expr, .. } | Expr::Parens(expr) | Expr::Ordering { expr, .. } => collect_identifiers(expr, out),
        Expr::Tuple(items) => items.iter().for_each(|e| collect_identifiers(e, out)),
        Expr::Literal(_) | Expr::Star => {}
    }
}
