//! Evaluates an expression over a stripe's columns into a chunk (spec.md §4.9).

use std::collections::HashMap;

use stratum_base::{err_kind, Dtype, ErrorKind, Result, TableSchema};
use stratum_coldb::{cmp_bool, cmp_bytes, cmp_f64, cmp_i64, BoolChunk, Chunk, CompareOp, FloatChunk, IntChunk, StringChunk};
use stratum_lang::{stringify_expr, Expr, InfixOp, Literal, PrefixOp};

pub type ColumnMap = HashMap<String, Chunk>;

fn infix_to_compare_op(op: InfixOp) -> Option<CompareOp> {
    Some(match op {
        InfixOp::Eq | InfixOp::Is => CompareOp::Eq,
        InfixOp::Ne => CompareOp::Ne,
        InfixOp::Lt => CompareOp::Lt,
        InfixOp::Le => CompareOp::Le,
        InfixOp::Gt => CompareOp::Gt,
        InfixOp::Ge => CompareOp::Ge,
        _ => return None,
    })
}

/// `evaluate(expr, columns) -> chunk`: the returned chunk's length equals `len`
/// (spec.md §4.9). `len` is required explicitly so literal sub-expressions — which
/// carry no length of their own — expand to the stripe's row count.
pub fn evaluate(expr: &Expr, columns: &ColumnMap, schema: &TableSchema, len: usize) -> Result<Chunk> {
    eval(expr, columns, schema, len, None)
}

/// Evaluates a projection over already-resolved group values instead of raw columns
/// (spec.md §4.11's post-aggregation projection pass): any sub-expression whose
/// stringified form is a key of `resolved` — a resolved aggregator call or a
/// materialised group-key chunk — is substituted directly rather than looked up as a
/// schema column. Sub-expressions not covered by `resolved` are combined structurally
/// the same way row-wise evaluation combines them; a bare identifier that isn't
/// covered means the caller's aggregation-safety check let something through it
/// shouldn't have.
pub fn evaluate_over_groups(expr: &Expr, resolved: &ColumnMap, len: usize) -> Result<Chunk> {
    let empty_columns = ColumnMap::new();
    let empty_schema = TableSchema::new(Vec::new());
    eval(expr, &empty_columns, &empty_schema, len, Some(resolved))
}

fn eval(expr: &Expr, columns: &ColumnMap, schema: &TableSchema, len: usize, overrides: Option<&ColumnMap>) -> Result<Chunk> {
    if let Some(ov) = overrides {
        if let Some(c) = ov.get(&stringify_expr(expr)) {
            return Ok(c.clone());
        }
    }
    match expr {
        Expr::Literal(lit) => literal_chunk(lit, len),
        Expr::Star => Err(err_kind(ErrorKind::InvalidQuery, "'*' cannot be evaluated directly")),
        Expr::Ident { name, quoted } => {
            let (_, col) = schema
                .find(name, *quoted)
                .ok_or_else(|| err_kind(ErrorKind::UnknownColumn, format!("unknown column {name:?}")))?;
            columns
                .get(&col.name)
                .cloned()
                .ok_or_else(|| err_kind(ErrorKind::UnknownColumn, format!("column {name:?} not materialised for this stripe")))
        }
        Expr::Prefix { op, expr } => eval_prefix(*op, expr, columns, schema, len, overrides),
        Expr::Infix { op, lhs, rhs } => eval_infix(*op, lhs, rhs, columns, schema, len, overrides),
        Expr::In { expr, list, negated } => eval_in(expr, list, *negated, columns, schema, len, overrides),
        Expr::Call { name, args, .. } => eval_call(name, args, columns, schema, len, overrides),
        Expr::Relabel { expr, .. } | Expr::Parens(expr) | Expr::Ordering { expr, .. } => {
            eval(expr, columns, schema, len, overrides)
        }
        Expr::Tuple(_) => Err(err_kind(ErrorKind::InvalidTuple, "a bare tuple cannot be evaluated outside IN")),
    }
}

fn literal_chunk(lit: &Literal, len: usize) -> Result<Chunk> {
    match lit {
        Literal::Null => {
            let mut c = Chunk::new(Dtype::Null, false);
            for _ in 0..len {
                c.append_value("")?;
            }
            Ok(c)
        }
        Literal::Int(v) => fill(Dtype::Int, &v.to_string(), len),
        Literal::Float(v) => fill(Dtype::Float, &v.0.to_string(), len),
        Literal::Bool(v) => fill(Dtype::Bool, if *v { "true" } else { "false" }, len),
        Literal::Str(s) => {
            // A literal empty string is indistinguishable from the chunk-level null
            // marker; see the column-chunk null convention (spec.md §4.2).
            let mut c = Chunk::new(Dtype::String, s.is_empty());
            for _ in 0..len {
                c.append_value(s)?;
            }
            Ok(c)
        }
    }
}

fn fill(dtype: Dtype, text: &str, len: usize) -> Result<Chunk> {
    let mut c = Chunk::new(dtype, false);
    for _ in 0..len {
        c.append_value(text)?;
    }
    Ok(c)
}

fn eval_prefix(
    op: PrefixOp,
    expr: &Expr,
    columns: &ColumnMap,
    schema: &TableSchema,
    len: usize,
    overrides: Option<&ColumnMap>,
) -> Result<Chunk> {
    let inner = eval(expr, columns, schema, len, overrides)?;
    match (op, &inner) {
        (PrefixOp::Neg, Chunk::Int(c)) => {
            let mut out = IntChunk::new(Dtype::Int, true);
            for i in 0..c.len() {
                match c.get(i) {
                    Some(v) => out.append_value(&(-v).to_string())?,
                    None => out.append_value("")?,
                }
            }
            Ok(Chunk::Int(out))
        }
        (PrefixOp::Neg, Chunk::Float(c)) => {
            let mut out = FloatChunk::new(true);
            for i in 0..c.len() {
                match c.get(i) {
                    Some(v) => out.append_value(&(-v).to_string())?,
                    None => out.append_value("")?,
                }
            }
            Ok(Chunk::Float(out))
        }
        (PrefixOp::Not, Chunk::Bool(c)) => {
            let mut out = BoolChunk::new(true);
            for i in 0..c.len() {
                match c.get(i) {
                    Some(v) => out.append_value(if !v { "true" } else { "false" })?,
                    None => out.append_value("")?,
                }
            }
            Ok(Chunk::Bool(out))
        }
        (PrefixOp::Neg, Chunk::Nulls(_)) | (PrefixOp::Not, Chunk::Nulls(_)) => Ok(inner),
        _ => Err(err_kind(ErrorKind::WrongArgumentType, "prefix operator applied to incompatible chunk")),
    }
}

fn eval_infix(
    op: InfixOp,
    lhs: &Expr,
    rhs: &Expr,
    columns: &ColumnMap,
    schema: &TableSchema,
    len: usize,
    overrides: Option<&ColumnMap>,
) -> Result<Chunk> {
    let l = eval(lhs, columns, schema, len, overrides)?;
    let r = eval(rhs, columns, schema, len, overrides)?;
    match op {
        InfixOp::And | InfixOp::Or => eval_bool_logic(op, &l, &r),
        InfixOp::Add | InfixOp::Sub | InfixOp::Mul | InfixOp::Div => eval_arith(op, &l, &r),
        _ => {
            let cmp_op = infix_to_compare_op(op).expect("all non-arith/logic ops are comparisons");
            eval_compare(cmp_op, &l, &r)
        }
    }
}

fn eval_bool_logic(op: InfixOp, l: &Chunk, r: &Chunk) -> Result<Chunk> {
    let (Chunk::Bool(lb), Chunk::Bool(rb)) = (l, r) else {
        return Err(err_kind(ErrorKind::WrongArgumentType, "AND/OR require boolean operands"));
    };
    let mut out = BoolChunk::new(true);
    for i in 0..lb.len() {
        let v = match (lb.get(i), rb.get(i)) {
            (Some(a), Some(b)) => Some(if op == InfixOp::And { a && b } else { a || b }),
            _ => None,
        };
        out.append_value(match v {
            Some(true) => "true",
            Some(false) => "false",
            None => "",
        })?;
    }
    Ok(Chunk::Bool(out))
}

fn numeric_row(c: &Chunk, i: usize) -> Option<f64> {
    match c {
        Chunk::Int(ic) => ic.get(i).map(|v| v as f64),
        Chunk::Float(fc) => fc.get(i),
        _ => None,
    }
}

fn is_float_chunk(c: &Chunk) -> bool {
    matches!(c, Chunk::Float(_))
}

fn eval_arith(op: InfixOp, l: &Chunk, r: &Chunk) -> Result<Chunk> {
    if matches!(l, Chunk::Nulls(_)) || matches!(r, Chunk::Nulls(_)) {
        let n = l.len().max(r.len());
        let mut out = FloatChunk::new(true);
        for _ in 0..n {
            out.append_value("")?;
        }
        return Ok(Chunk::Float(out));
    }
    let result_float = op == InfixOp::Div || is_float_chunk(l) || is_float_chunk(r);
    let n = l.len();
    if result_float {
        let mut out = FloatChunk::new(true);
        for i in 0..n {
            match (numeric_row(l, i), numeric_row(r, i)) {
                (Some(a), Some(b)) => {
                    let v = match op {
                        InfixOp::Add => a + b,
                        InfixOp::Sub => a - b,
                        InfixOp::Mul => a * b,
                        InfixOp::Div => a / b,
                        _ => unreachable!(),
                    };
                    out.append_value(&v.to_string())?;
                }
                _ => out.append_value("")?,
            }
        }
        Ok(Chunk::Float(out))
    } else {
        let (Chunk::Int(li), Chunk::Int(ri)) = (l, r) else {
            return Err(err_kind(ErrorKind::WrongArgumentType, "arithmetic requires numeric operands"));
        };
        let mut out = IntChunk::new(Dtype::Int, true);
        for i in 0..n {
            match (li.get(i), ri.get(i)) {
                (Some(a), Some(b)) => {
                    let v = match op {
                        InfixOp::Add => a + b,
                        InfixOp::Sub => a - b,
                        InfixOp::Mul => a * b,
                        _ => unreachable!(),
                    };
                    out.append_value(&v.to_string())?;
                }
                _ => out.append_value("")?,
            }
        }
        Ok(Chunk::Int(out))
    }
}

fn eval_compare(op: CompareOp, l: &Chunk, r: &Chunk) -> Result<Chunk> {
    let n = l.len().max(r.len());
    let mut out = BoolChunk::new(true);
    for i in 0..n {
        let v = match (l, r) {
            (Chunk::Int(a), Chunk::Int(b)) => match (a.get(i), b.get(i)) {
                (Some(x), Some(y)) => Some(cmp_i64(op, x, y)),
                _ => None,
            },
            (Chunk::Float(_), _) | (_, Chunk::Float(_)) => match (numeric_row(l, i), numeric_row(r, i)) {
                (Some(x), Some(y)) => Some(cmp_f64(op, x, y)),
                _ => None,
            },
            (Chunk::Bool(a), Chunk::Bool(b)) => match (a.get(i), b.get(i)) {
                (Some(x), Some(y)) => cmp_bool(op, x, y),
                _ => None,
            },
            (Chunk::String(a), Chunk::String(b)) => match (a.get(i), b.get(i)) {
                (Some(x), Some(y)) => Some(cmp_bytes(op, x.as_bytes(), y.as_bytes())),
                _ => None,
            },
            (Chunk::Datetime(a), Chunk::Datetime(b)) => match (a.get(i), b.get(i)) {
                (Some(x), Some(y)) => Some(cmp_i64(op, x, y)),
                _ => None,
            },
            _ => None,
        };
        out.append_value(match v {
            Some(true) => "true",
            Some(false) => "false",
            None => "",
        })?;
    }
    Ok(Chunk::Bool(out))
}

fn eval_in(
    expr: &Expr,
    list: &[Expr],
    negated: bool,
    columns: &ColumnMap,
    schema: &TableSchema,
    len: usize,
    overrides: Option<&ColumnMap>,
) -> Result<Chunk> {
    let target = eval(expr, columns, schema, len, overrides)?;
    let members: Vec<Chunk> = list.iter().map(|e| eval(e, columns, schema, len, overrides)).collect::<Result<_>>()?;
    let mut out = BoolChunk::new(true);
    for i in 0..target.len() {
        let mut v = None;
        for m in &members {
            match eval_compare(CompareOp::Eq, &target, m)? {
                Chunk::Bool(b) => {
                    if let Some(hit) = b.get(i) {
                        if hit {
                            v = Some(true);
                            break;
                        } else if v.is_none() {
                            v = Some(false);
                        }
                    }
                }
                _ => unreachable!(),
            }
        }
        let v = v.map(|b| if negated { !b } else { b });
        out.append_value(match v {
            Some(true) => "true",
            Some(false) => "false",
            None => "",
        })?;
    }
    Ok(Chunk::Bool(out))
}

fn string_rows(c: &Chunk) -> Option<&StringChunk> {
    match c {
        Chunk::String(s) => Some(s),
        _ => None,
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    columns: &ColumnMap,
    schema: &TableSchema,
    len: usize,
    overrides: Option<&ColumnMap>,
) -> Result<Chunk> {
    if matches!(name, "count" | "min" | "max" | "sum" | "avg") {
        return Err(err_kind(
            ErrorKind::QueryPatternNotSupported,
            "aggregate calls resolve through the query runner's aggregator, not the row evaluator",
        ));
    }
    let arg_chunks: Vec<Chunk> = args.iter().map(|a| eval(a, columns, schema, len, overrides)).collect::<Result<_>>()?;
    match name {
        "round" => eval_round(&arg_chunks),
        "nullif" => eval_nullif(&arg_chunks),
        "coalesce" => eval_coalesce(&arg_chunks),
        "trim" | "lower" | "upper" => eval_string_unary(name, &arg_chunks),
        "left" => eval_left(&arg_chunks),
        _ => eval_trig(name, &arg_chunks),
    }
}

fn eval_round(args: &[Chunk]) -> Result<Chunk> {
    let digits = if args.len() == 2 {
        match &args[1] {
            Chunk::Int(c) => (0..c.len()).map(|i| c.get(i).unwrap_or(0)).collect::<Vec<_>>(),
            _ => return Err(err_kind(ErrorKind::WrongArgumentType, "round's second argument must be int")),
        }
    } else {
        vec![]
    };
    let n = args[0].len();
    let mut out = FloatChunk::new(true);
    for i in 0..n {
        match numeric_row(&args[0], i) {
            Some(v) => {
                let d = digits.get(i).copied().unwrap_or(0);
                let factor = 10f64.powi(d as i32);
                out.append_value(&((v * factor).round() / factor).to_string())?;
            }
            None => out.append_value("")?,
        }
    }
    Ok(Chunk::Float(out))
}

fn eval_nullif(args: &[Chunk]) -> Result<Chunk> {
    let cmp = eval_compare(CompareOp::Eq, &args[0], &args[1])?;
    let Chunk::Bool(eqb) = cmp else { unreachable!() };
    match &args[0] {
        Chunk::Int(c) => {
            let mut out = IntChunk::new(Dtype::Int, true);
            for i in 0..c.len() {
                if eqb.get(i) == Some(true) {
                    out.append_value("")?;
                } else {
                    match c.get(i) {
                        Some(v) => out.append_value(&v.to_string())?,
                        None => out.append_value("")?,
                    }
                }
            }
            Ok(Chunk::Int(out))
        }
        Chunk::Float(c) => {
            let mut out = FloatChunk::new(true);
            for i in 0..c.len() {
                if eqb.get(i) == Some(true) {
                    out.append_value("")?;
                } else {
                    match c.get(i) {
                        Some(v) => out.append_value(&v.to_string())?,
                        None => out.append_value("")?,
                    }
                }
            }
            Ok(Chunk::Float(out))
        }
        Chunk::String(c) => {
            let mut out = StringChunk::new(true);
            for i in 0..c.len() {
                if eqb.get(i) == Some(true) {
                    out.append_value("")?;
                } else {
                    match c.get(i) {
                        Some(v) => out.append_value(v)?,
                        None => out.append_value("")?,
                    }
                }
            }
            Ok(Chunk::String(out))
        }
        Chunk::Bool(c) => {
            let mut out = BoolChunk::new(true);
            for i in 0..c.len() {
                if eqb.get(i) == Some(true) {
                    out.append_value("")?;
                } else {
                    out.append_value(match c.get(i) {
                        Some(true) => "true",
                        Some(false) => "false",
                        None => "",
                    })?;
                }
            }
            Ok(Chunk::Bool(out))
        }
        other => Ok(other.clone()),
    }
}

fn eval_coalesce(args: &[Chunk]) -> Result<Chunk> {
    let any_float = args.iter().any(is_float_chunk);
    let n = args.iter().map(|c| c.len()).max().unwrap_or(0);
    if any_float || args.iter().any(|c| matches!(c, Chunk::Int(_) | Chunk::Float(_))) {
        let mut out = FloatChunk::new(true);
        for i in 0..n {
            let v = args.iter().find_map(|c| numeric_row(c, i));
            match v {
                Some(v) => out.append_value(&v.to_string())?,
                None => out.append_value("")?,
            }
        }
        return Ok(Chunk::Float(out));
    }
    if let Some(Chunk::String(_)) = args.first() {
        let mut out = StringChunk::new(true);
        for i in 0..n {
            let v = args.iter().find_map(|c| string_rows(c).and_then(|s| s.get(i)));
            out.append_value(v.unwrap_or(""))?;
        }
        return Ok(Chunk::String(out));
    }
    Err(err_kind(ErrorKind::WrongArgumentType, "coalesce requires compatible argument chunks"))
}

fn eval_string_unary(name: &str, args: &[Chunk]) -> Result<Chunk> {
    let Some(c) = string_rows(&args[0]) else {
        return Err(err_kind(ErrorKind::WrongArgumentType, format!("{name} requires a string argument")));
    };
    let mut out = StringChunk::new(true);
    for i in 0..c.len() {
        match c.get(i) {
            Some(v) => {
                let transformed = match name {
                    "trim" => v.trim().to_string(),
                    "lower" => v.to_lowercase(),
                    "upper" => v.to_uppercase(),
                    _ => unreachable!(),
                };
                out.append_value(&transformed)?;
            }
            None => out.append_value("")?,
        }
    }
    Ok(Chunk::String(out))
}

fn eval_left(args: &[Chunk]) -> Result<Chunk> {
    let Some(s) = string_rows(&args[0]) else {
        return Err(err_kind(ErrorKind::WrongArgumentType, "left requires (string, int)"));
    };
    let Chunk::Int(n) = &args[1] else {
        return Err(err_kind(ErrorKind::WrongArgumentType, "left requires (string, int)"));
    };
    let mut out = StringChunk::new(true);
    for i in 0..s.len() {
        match (s.get(i), n.get(i)) {
            (Some(v), Some(k)) => {
                let k = k.max(0) as usize;
                let cut = v.char_indices().nth(k).map(|(idx, _)| idx).unwrap_or(v.len());
                out.append_value(&v[..cut])?;
            }
            _ => out.append_value("")?,
        }
    }
    Ok(Chunk::String(out))
}

fn eval_trig(name: &str, args: &[Chunk]) -> Result<Chunk> {
    let f: fn(f64) -> f64 = match name {
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "asin" => f64::asin,
        "acos" => f64::acos,
        "atan" => f64::atan,
        "sinh" => f64::sinh,
        "cosh" => f64::cosh,
        "tanh" => f64::tanh,
        "sqrt" => f64::sqrt,
        "exp" => f64::exp,
        "exp2" => f64::exp2,
        "log" => f64::ln,
        "log2" => f64::log2,
        "log10" => f64::log10,
        other => return Err(err_kind(ErrorKind::WrongArgumentType, format!("unknown function {other:?}"))),
    };
    let c = &args[0];
    let mut out = FloatChunk::new(true);
    for i in 0..c.len() {
        match numeric_row(c, i) {
            Some(v) => {
                let r = f(v);
                if r.is_nan() {
                    out.append_value("")?;
                } else {
                    out.append_value(&r.to_string())?;
                }
            }
            None => out.append_value("")?,
        }
    }
    Ok(Chunk::Float(out))
}
