//! Executes a parsed query against a cataloged dataset (spec.md §4.11): reads only
//! the columns a query needs, then drives it through filtering, optional grouped
//! aggregation, projection, and limit.
//!
//! Non-aggregating queries stream stripe by stripe: `reading -> filtered -> pruned ->
//! projected -> limit_checked`, stopping as soon as the limit is satisfied. Aggregating
//! queries must see every row before a group's aggregate is final, so they scan every
//! stripe and only truncate to `LIMIT` groups at the end.

use std::collections::{BTreeSet, HashMap};

use stratum_base::ioutil::FileReader;
use stratum_base::{err_kind, Bitmap, CancelToken, Dtype, ErrorKind, Result, TableSchema, Uid};
use stratum_catalog::{Catalog, Dataset};
use stratum_coldb::{Chunk, Stripe};
use stratum_eval::{contains_aggregate, evaluate, evaluate_over_groups, typecheck, AggKind, Aggregator, ColumnMap};
use stratum_lang::{stringify_expr, Expr, Query};

use crate::cols::collect_identifiers;
use crate::safety::check_aggregation_safe;

/// The output of a query: one chunk per SELECT item, in SELECT order, all the same
/// length.
pub struct QueryResult {
    pub names: Vec<String>,
    pub columns: Vec<Chunk>,
}

impl QueryResult {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }
}

pub fn run_query(query: &Query, catalog: &Catalog, cancel: &CancelToken) -> Result<QueryResult> {
    if query.select.is_empty() {
        return Err(err_kind(ErrorKind::EmptyProjection, "a query must project at least one expression"));
    }
    if let Some(limit) = query.limit {
        if limit < 0 {
            return Err(err_kind(ErrorKind::InvalidLimitValue, "LIMIT must not be negative"));
        }
    }
    if !query.order_by.is_empty() {
        return Err(err_kind(ErrorKind::OrderByNotSupported, "ORDER BY is parsed but not executed"));
    }

    let dataset_ref = query.from.as_ref().ok_or_else(|| err_kind(ErrorKind::InvalidQuery, "query has no FROM dataset"))?;
    let dataset = catalog
        .get_by_name(&dataset_ref.name)
        .ok_or_else(|| err_kind(ErrorKind::UnknownColumn, format!("unknown dataset {:?}", dataset_ref.name)))?;

    let names: Vec<String> = query.select.iter().map(select_item_name).collect();
    let is_aggregating = !query.group_by.is_empty() || query.select.iter().any(contains_aggregate);

    if is_aggregating {
        run_aggregating(query, &dataset, catalog, names, cancel)
    } else {
        run_plain(query, &dataset, catalog, names, cancel)
    }
}

fn select_item_name(expr: &Expr) -> String {
    match expr {
        Expr::Relabel { name, .. } => name.clone(),
        other => stringify_expr(other),
    }
}

fn empty_chunk_for(expr: &Expr, schema: &TableSchema) -> Result<Chunk> {
    let s = typecheck(expr, schema)?;
    Ok(Chunk::new(s.dtype, s.nullable))
}

/// Reads exactly the columns named in `needed` from one stripe file, by index, using
/// the single-column random-access path (spec.md §4.3). `cancel` is checked between
/// each column chunk read (spec.md §5).
fn read_stripe_columns(
    catalog: &Catalog,
    dataset: &Dataset,
    stripe_uid: Uid,
    needed: &BTreeSet<String>,
    cancel: &CancelToken,
) -> Result<(ColumnMap, usize)> {
    let path = catalog.stripe_path(dataset.uid, stripe_uid);
    let mut rd = FileReader::open(&path)?;
    let n_columns = dataset.schema.columns().len();
    let mut columns = ColumnMap::new();
    let mut len = 0;
    for name in needed {
        cancel.check()?;
        let (idx, col) = dataset
            .schema
            .find(name, false)
            .ok_or_else(|| err_kind(ErrorKind::UnknownColumn, format!("unknown column {name:?}")))?;
        let chunk = Stripe::read_column(&mut rd, n_columns, idx, col.dtype)?;
        len = len.max(chunk.len());
        columns.insert(col.name.clone(), chunk);
    }
    if needed.is_empty() {
        // A query that touches no columns (e.g. a bare `count()`) still needs a row
        // count for this stripe; read the first column for its length alone.
        if let Some(col0) = dataset.schema.columns().first() {
            len = Stripe::read_column(&mut rd, n_columns, 0, col0.dtype)?.len();
        }
    }
    Ok((columns, len))
}

fn all_true(len: usize) -> Bitmap {
    let mut bm = Bitmap::new(len);
    bm.invert();
    bm
}

fn eval_filter(filter: &Expr, columns: &ColumnMap, schema: &TableSchema, len: usize) -> Result<Bitmap> {
    let fc = evaluate(filter, columns, schema, len)?;
    let Chunk::Bool(b) = fc else {
        return Err(err_kind(ErrorKind::TypeMismatch, "FILTER must evaluate to a boolean expression"));
    };
    let mut bm = Bitmap::new(len);
    for i in 0..len {
        if b.get(i) == Some(true) {
            bm.set(i, true);
        }
    }
    Ok(bm)
}

fn run_plain(query: &Query, dataset: &Dataset, catalog: &Catalog, names: Vec<String>, cancel: &CancelToken) -> Result<QueryResult> {
    if let Some(f) = &query.filter {
        let s = typecheck(f, &dataset.schema)?;
        if !matches!(s.dtype, Dtype::Bool | Dtype::Null) {
            return Err(err_kind(ErrorKind::TypeMismatch, "FILTER must be a boolean expression"));
        }
    }
    for e in &query.select {
        typecheck(e, &dataset.schema)?;
    }

    let mut needed = BTreeSet::new();
    if let Some(f) = &query.filter {
        collect_identifiers(f, &mut needed);
    }
    for e in &query.select {
        collect_identifiers(e, &mut needed);
    }

    let mut remaining = query.limit;
    let mut outputs: Vec<Option<Chunk>> = vec![None; query.select.len()];

    for &stripe_uid in &dataset.stripes {
        if remaining == Some(0) {
            break;
        }
        cancel.check()?;
        let (columns, len) = read_stripe_columns(catalog, dataset, stripe_uid, &needed, cancel)?;
        if len == 0 {
            continue;
        }

        let mut bm = match &query.filter {
            Some(f) => eval_filter(f, &columns, &dataset.schema, len)?,
            None => all_true(len),
        };

        if let Some(rem) = remaining {
            if bm.count() as i64 > rem {
                bm.keep_first_n(rem);
            }
        }

        let selected = bm.count();
        if selected == 0 {
            continue;
        }

        for (i, expr) in query.select.iter().enumerate() {
            let full = evaluate(expr, &columns, &dataset.schema, len)?;
            let pruned = full.prune(&bm)?;
            match &mut outputs[i] {
                Some(acc) => acc.append(&pruned)?,
                None => outputs[i] = Some(pruned),
            }
        }

        if let Some(rem) = remaining.as_mut() {
            *rem -= selected as i64;
        }
    }

    let mut columns = Vec::with_capacity(query.select.len());
    for (i, slot) in outputs.into_iter().enumerate() {
        columns.push(match slot {
            Some(c) => c,
            None => empty_chunk_for(&query.select[i], &dataset.schema)?,
        });
    }

    Ok(QueryResult { names, columns })
}

fn collect_aggregate_calls(expr: &Expr, out: &mut Vec<Expr>, seen: &mut BTreeSet<String>) {
    match expr {
        _ if expr.is_aggregate_call() => {
            if seen.insert(stringify_expr(expr)) {
                out.push(expr.clone());
            }
        }
        Expr::Call { args, .. } => args.iter().for_each(|a| collect_aggregate_calls(a, out, seen)),
        Expr::Prefix { expr, .. } => collect_aggregate_calls(expr, out, seen),
        Expr::Infix { lhs, rhs, .. } => {
            collect_aggregate_calls(lhs, out, seen);
            collect_aggregate_calls(rhs, out, seen);
        }
        Expr::In { expr, list, .. } => {
            collect_aggregate_calls(expr, out, seen);
            list.iter().for_each(|e| collect_aggregate_calls(e, out, seen));
        }
        Expr::Relabel { expr, .. } | Expr::Parens(expr) | Expr::Ordering { expr, .. } => collect_aggregate_calls(expr, out, seen),
        Expr::Tuple(items) => items.iter().for_each(|e| collect_aggregate_calls(e, out, seen)),
        Expr::Literal(_) | Expr::Star | Expr::Ident { .. } => {}
    }
}

fn run_aggregating(query: &Query, dataset: &Dataset, catalog: &Catalog, names: Vec<String>, cancel: &CancelToken) -> Result<QueryResult> {
    check_aggregation_safe(&query.select, &query.group_by)?;

    if let Some(f) = &query.filter {
        if contains_aggregate(f) {
            return Err(err_kind(ErrorKind::QueryPatternNotSupported, "FILTER cannot reference an aggregate"));
        }
        let s = typecheck(f, &dataset.schema)?;
        if !matches!(s.dtype, Dtype::Bool | Dtype::Null) {
            return Err(err_kind(ErrorKind::TypeMismatch, "FILTER must be a boolean expression"));
        }
    }
    for g in &query.group_by {
        typecheck(g, &dataset.schema)?;
    }
    for e in &query.select {
        typecheck(e, &dataset.schema)?;
    }

    let mut agg_exprs = Vec::new();
    let mut seen = BTreeSet::new();
    for e in &query.select {
        collect_aggregate_calls(e, &mut agg_exprs, &mut seen);
    }

    let mut aggregators = Vec::with_capacity(agg_exprs.len());
    let mut arg_exprs: Vec<Option<Expr>> = Vec::with_capacity(agg_exprs.len());
    for call in &agg_exprs {
        let Expr::Call { name, args, distinct } = call else { unreachable!() };
        if *distinct {
            return Err(err_kind(ErrorKind::QueryPatternNotSupported, "DISTINCT aggregates are not supported"));
        }
        let has_arg = !args.is_empty();
        let kind = AggKind::from_name(name, has_arg)
            .ok_or_else(|| err_kind(ErrorKind::WrongArgumentCount, format!("{name} is not a known aggregate")))?;
        let arg_dtype = if has_arg { typecheck(&args[0], &dataset.schema)?.dtype } else { Dtype::Invalid };
        aggregators.push(Aggregator::new(kind, arg_dtype));
        arg_exprs.push(if has_arg { Some(args[0].clone()) } else { None });
    }

    let mut needed = BTreeSet::new();
    if let Some(f) = &query.filter {
        collect_identifiers(f, &mut needed);
    }
    for g in &query.group_by {
        collect_identifiers(g, &mut needed);
    }
    for a in arg_exprs.iter().flatten() {
        collect_identifiers(a, &mut needed);
    }

    let mut group_map: HashMap<u64, usize> = HashMap::new();
    let mut n_groups: usize = 0;
    let mut group_key_chunks: Vec<Option<Chunk>> = vec![None; query.group_by.len()];

    for &stripe_uid in &dataset.stripes {
        cancel.check()?;
        let (columns, len) = read_stripe_columns(catalog, dataset, stripe_uid, &needed, cancel)?;
        if len == 0 {
            continue;
        }

        let included = match &query.filter {
            Some(f) => eval_filter(f, &columns, &dataset.schema, len)?,
            None => all_true(len),
        };
        if included.count() == 0 {
            continue;
        }

        let group_chunks: Vec<Chunk> =
            query.group_by.iter().map(|g| evaluate(g, &columns, &dataset.schema, len)).collect::<Result<_>>()?;

        let mut hashes = vec![0u64; len];
        for gc in &group_chunks {
            gc.hash_into(&mut hashes);
        }

        let mut group_index_full = vec![0u64; len];
        let mut new_bits = vec![false; len];
        for row in 0..len {
            if !included.get(row) {
                continue;
            }
            let idx = *group_map.entry(hashes[row]).or_insert_with(|| {
                new_bits[row] = true;
                let i = n_groups;
                n_groups += 1;
                i
            });
            group_index_full[row] = idx as u64;
        }

        if new_bits.iter().any(|&b| b) {
            let new_bm = Bitmap::from_bools(&new_bits);
            for (i, gc) in group_chunks.iter().enumerate() {
                let pruned = gc.prune(&new_bm)?;
                match &mut group_key_chunks[i] {
                    Some(acc) => acc.append(&pruned)?,
                    None => group_key_chunks[i] = Some(pruned),
                }
            }
        }

        let group_index: Vec<u64> = (0..len).filter(|&r| included.get(r)).map(|r| group_index_full[r]).collect();

        for (agg, arg_expr) in aggregators.iter_mut().zip(arg_exprs.iter()) {
            let arg_chunk = match arg_expr {
                Some(e) => {
                    let full = evaluate(e, &columns, &dataset.schema, len)?;
                    Some(full.prune(&included)?)
                }
                None => None,
            };
            agg.extend(&group_index, n_groups, arg_chunk.as_ref())?;
        }
    }

    let mut resolved: ColumnMap = HashMap::new();
    for (call, agg) in agg_exprs.iter().zip(aggregators.iter()) {
        resolved.insert(stringify_expr(call), agg.resolve()?);
    }
    for (g, slot) in query.group_by.iter().zip(group_key_chunks.into_iter()) {
        let chunk = match slot {
            Some(c) => c,
            None => empty_chunk_for(g, &dataset.schema)?,
        };
        resolved.insert(stringify_expr(g), chunk);
    }

    let mut columns: Vec<Chunk> =
        query.select.iter().map(|e| evaluate_over_groups(e, &resolved, n_groups)).collect::<Result<_>>()?;

    if let Some(limit) = query.limit {
        let mut bm = all_true(n_groups);
        bm.keep_first_n(limit);
        columns = columns.into_iter().map(|c| c.prune(&bm)).collect::<Result<_>>()?;
    }

    Ok(QueryResult { names, columns })
}

#[cfg(test)]
mod test {
    use super::*;
    use stratum_base::{Schema, UidTag};
    use stratum_coldb::IntChunk;
    use stratum_lang::parse_query;
    use stratum_loader::{load_with_schema, Settings, VecRowSource};
    use test_log::test;

    fn tmp_catalog() -> Catalog {
        let dir = std::env::temp_dir().join(format!("stratum-query-test-{}", Uid::new(UidTag::Dataset)));
        Catalog::new(dir)
    }

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Schema::new("a", Dtype::Int, false),
            Schema::new("b", Dtype::Float, true),
            Schema::new("name", Dtype::String, true),
        ])
    }

    fn seed(catalog: &Catalog, rows: Vec<Vec<&str>>) -> Dataset {
        let mut source = VecRowSource::new(
            vec!["a".into(), "b".into(), "name".into()],
            rows.into_iter().map(|r| r.into_iter().map(String::from).collect()).collect(),
        );
        let settings = Settings { max_rows_per_stripe: 2, ..Settings::default() };
        load_with_schema(&mut source, schema(), &settings, catalog, "events", &CancelToken::new()).unwrap()
    }

    fn int_col(c: &Chunk) -> &IntChunk {
        let Chunk::Int(ic) = c else { panic!("expected int chunk") };
        ic
    }

    #[test]
    fn test_plain_filter_and_limit() {
        let catalog = tmp_catalog();
        seed(&catalog, vec![vec!["1", "1.5", "a"], vec!["2", "2.5", "b"], vec!["3", "3.5", "c"], vec!["4", "4.5", "d"]]);

        let query = parse_query("select a from events where a > 1 limit 2").unwrap();
        let result = run_query(&query, &catalog, &CancelToken::new()).unwrap();
        assert_eq!(result.num_rows(), 2);
        let ic = int_col(&result.columns[0]);
        assert_eq!(ic.get(0), Some(2));
        assert_eq!(ic.get(1), Some(3));

        let _ = std::fs::remove_dir_all(catalog.working_directory());
    }

    #[test]
    fn test_grouped_sum_with_nulls() {
        let catalog = tmp_catalog();
        seed(
            &catalog,
            vec![
                vec!["1", "1.0", "x"],
                vec!["1", "", "x"],
                vec!["2", "5.0", "y"],
                vec!["2", "3.0", "y"],
            ],
        );

        let query = parse_query("select a, sum(b) from events group by a").unwrap();
        let result = run_query(&query, &catalog, &CancelToken::new()).unwrap();
        assert_eq!(result.num_rows(), 2);
        let groups = int_col(&result.columns[0]);
        let Chunk::Float(sums) = &result.columns[1] else { panic!("expected float chunk") };
        let by_group: HashMap<i64, f64> =
            (0..result.num_rows()).map(|i| (groups.get(i).unwrap(), sums.get(i).unwrap())).collect();
        assert_eq!(by_group.get(&1), Some(&1.0));
        assert_eq!(by_group.get(&2), Some(&8.0));

        let _ = std::fs::remove_dir_all(catalog.working_directory());
    }

    #[test]
    fn test_count_star_never_null() {
        let catalog = tmp_catalog();
        seed(&catalog, vec![vec!["1", "", "x"], vec!["1", "", "x"]]);

        let query = parse_query("select count() from events").unwrap();
        let result = run_query(&query, &catalog, &CancelToken::new()).unwrap();
        assert_eq!(result.num_rows(), 1);
        let ic = int_col(&result.columns[0]);
        assert_eq!(ic.get(0), Some(2));

        let _ = std::fs::remove_dir_all(catalog.working_directory());
    }

    #[test]
    fn test_empty_projection_rejected() {
        let query = Query { select: vec![], from: None, filter: None, group_by: vec![], order_by: vec![], limit: None };
        let catalog = tmp_catalog();
        let err = run_query(&query, &catalog, &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyProjection);
    }

    #[test]
    fn test_negative_limit_rejected() {
        let catalog = tmp_catalog();
        seed(&catalog, vec![vec!["1", "1.0", "x"]]);
        let mut query = parse_query("select a from events").unwrap();
        query.limit = Some(-1);
        let err = run_query(&query, &catalog, &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLimitValue);
        let _ = std::fs::remove_dir_all(catalog.working_directory());
    }

    #[test]
    fn test_ungrouped_projection_rejected_at_analysis_time() {
        let catalog = tmp_catalog();
        seed(&catalog, vec![vec!["1", "1.0", "x"]]);
        let query = parse_query("select name, sum(b) from events group by a").unwrap();
        let err = run_query(&query, &catalog, &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidProjectionInAggregation);
        let _ = std::fs::remove_dir_all(catalog.working_directory());
    }

    #[test]
    fn test_cancelled_token_aborts_before_reading_any_stripe() {
        let catalog = tmp_catalog();
        seed(&catalog, vec![vec!["1", "1.0", "x"], vec!["2", "2.0", "y"]]);
        let query = parse_query("select a from events").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_query(&query, &catalog, &cancel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let _ = std::fs::remove_dir_all(catalog.working_directory());
    }
}
