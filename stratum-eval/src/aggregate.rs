//! Per-group aggregator state (spec.md §4.10). An aggregator is instantiated once per
//! query given its kind and argument dtype, then fed one stripe's worth of rows at a
//! time through `extend`, and finally turned into a result chunk by `resolve`.

use stratum_base::{err_kind, Dtype, ErrorKind, Result};
use stratum_coldb::{Chunk, FloatChunk, IntChunk};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggKind {
    Count,
    CountArg,
    Min,
    Max,
    Sum,
    Avg,
}

impl AggKind {
    pub fn from_name(name: &str, has_arg: bool) -> Option<AggKind> {
        Some(match name {
            "count" if has_arg => AggKind::CountArg,
            "count" => AggKind::Count,
            "min" => AggKind::Min,
            "max" => AggKind::Max,
            "sum" => AggKind::Sum,
            "avg" => AggKind::Avg,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
enum GroupValue {
    Count(u64),
    IntMinMax { set: bool, value: i64 },
    FloatMinMax { set: bool, value: f64 },
    IntSum { set: bool, value: i64 },
    FloatSum { set: bool, value: f64 },
    Avg { sum: f64, n: u64 },
}

/// Owns one aggregator's per-group state for the life of a single query (spec.md §5,
/// "Expression AST nodes are immutable post-parse except for aggregator state, which is
/// owned exclusively by its owning query").
#[derive(Clone, Debug)]
pub struct Aggregator {
    kind: AggKind,
    arg_dtype: Dtype,
    groups: Vec<GroupValue>,
}

fn zero(kind: AggKind, arg_dtype: Dtype) -> GroupValue {
    match kind {
        AggKind::Count | AggKind::CountArg => GroupValue::Count(0),
        AggKind::Min | AggKind::Max if arg_dtype == Dtype::Float => GroupValue::FloatMinMax { set: false, value: 0.0 },
        AggKind::Min | AggKind::Max => GroupValue::IntMinMax { set: false, value: 0 },
        AggKind::Sum if arg_dtype == Dtype::Float => GroupValue::FloatSum { set: false, value: 0.0 },
        AggKind::Sum => GroupValue::IntSum { set: false, value: 0 },
        AggKind::Avg => GroupValue::Avg { sum: 0.0, n: 0 },
    }
}

impl Aggregator {
    pub fn new(kind: AggKind, arg_dtype: Dtype) -> Self {
        Aggregator { kind, arg_dtype, groups: Vec::new() }
    }

    fn ensure_groups(&mut self, n_groups: usize) {
        while self.groups.len() < n_groups {
            self.groups.push(zero(self.kind, self.arg_dtype));
        }
    }

    /// Extends per-group state to `n_groups` and folds in one stripe's rows, per
    /// spec.md §4.10. `arg` is `None` for a bare `count()`.
    pub fn extend(&mut self, group_index: &[u64], n_groups: usize, arg: Option<&Chunk>) -> Result<()> {
        self.ensure_groups(n_groups);
        for (row, &g) in group_index.iter().enumerate() {
            let g = g as usize;
            match (self.kind, arg) {
                (AggKind::Count, _) => {
                    let GroupValue::Count(c) = &mut self.groups[g] else { unreachable!() };
                    *c += 1;
                }
                (AggKind::CountArg, Some(arg)) => {
                    if chunk_is_some(arg, row) {
                        let GroupValue::Count(c) = &mut self.groups[g] else { unreachable!() };
                        *c += 1;
                    }
                }
                (AggKind::Min, Some(arg)) | (AggKind::Max, Some(arg)) => {
                    self.fold_min_max(g, arg, row)?;
                }
                (AggKind::Sum, Some(arg)) => self.fold_sum(g, arg, row)?,
                (AggKind::Avg, Some(arg)) => self.fold_avg(g, arg, row)?,
                _ => return Err(err_kind(ErrorKind::WrongArgumentCount, "aggregator requires an argument column")),
            }
        }
        Ok(())
    }

    fn fold_min_max(&mut self, g: usize, arg: &Chunk, row: usize) -> Result<()> {
        let is_max = self.kind == AggKind::Max;
        match (&mut self.groups[g], arg) {
            (GroupValue::IntMinMax { set, value }, Chunk::Int(c) | Chunk::Datetime(c)) => {
                if let Some(v) = c.get(row) {
                    if !*set || (is_max && v > *value) || (!is_max && v < *value) {
                        *set = true;
                        *value = v;
                    }
                }
            }
            (GroupValue::FloatMinMax { set, value }, Chunk::Float(c)) => {
                if let Some(v) = c.get(row) {
                    if !*set || (is_max && v > *value) || (!is_max && v < *value) {
                        *set = true;
                        *value = v;
                    }
                }
            }
            _ => return Err(err_kind(ErrorKind::WrongArgumentType, "min/max argument dtype mismatch")),
        }
        Ok(())
    }

    fn fold_sum(&mut self, g: usize, arg: &Chunk, row: usize) -> Result<()> {
        match (&mut self.groups[g], arg) {
            (GroupValue::IntSum { set, value }, Chunk::Int(c)) => {
                if let Some(v) = c.get(row) {
                    *set = true;
                    *value += v;
                }
            }
            (GroupValue::FloatSum { set, value }, Chunk::Float(c)) => {
                if let Some(v) = c.get(row) {
                    *set = true;
                    *value += v;
                }
            }
            _ => return Err(err_kind(ErrorKind::WrongArgumentType, "sum argument dtype mismatch")),
        }
        Ok(())
    }

    fn fold_avg(&mut self, g: usize, arg: &Chunk, row: usize) -> Result<()> {
        let GroupValue::Avg { sum, n } = &mut self.groups[g] else { unreachable!() };
        let v = match arg {
            Chunk::Int(c) => c.get(row).map(|v| v as f64),
            Chunk::Float(c) => c.get(row),
            _ => return Err(err_kind(ErrorKind::WrongArgumentType, "avg argument must be numeric")),
        };
        if let Some(v) = v {
            *sum += v;
            *n += 1;
        }
        Ok(())
    }

    /// Produces a chunk of length `n_groups` in group-index order (spec.md §4.10).
    pub fn resolve(&self) -> Result<Chunk> {
        match self.kind {
            AggKind::Count | AggKind::CountArg => {
                let mut out = IntChunk::new(Dtype::Int, false);
                for g in &self.groups {
                    let GroupValue::Count(c) = g else { unreachable!() };
                    out.append_value(&c.to_string())?;
                }
                Ok(Chunk::Int(out))
            }
            AggKind::Min | AggKind::Max if self.arg_dtype == Dtype::Float => {
                let mut out = FloatChunk::new(true);
                for g in &self.groups {
                    let GroupValue::FloatMinMax { set, value } = g else { unreachable!() };
                    if *set {
                        out.append_value(&value.to_string())?;
                    } else {
                        out.append_value("")?;
                    }
                }
                Ok(Chunk::Float(out))
            }
            AggKind::Min | AggKind::Max => {
                let mut out = IntChunk::new(self.arg_dtype, true);
                for g in &self.groups {
                    let GroupValue::IntMinMax { set, value } = g else { unreachable!() };
                    if *set {
                        out.append_value(&value.to_string())?;
                    } else {
                        out.append_value("")?;
                    }
                }
                Ok(if self.arg_dtype == Dtype::Datetime { Chunk::Datetime(out) } else { Chunk::Int(out) })
            }
            AggKind::Sum if self.arg_dtype == Dtype::Float => {
                let mut out = FloatChunk::new(true);
                for g in &self.groups {
                    let GroupValue::FloatSum { set, value } = g else { unreachable!() };
                    if *set {
                        out.append_value(&value.to_string())?;
                    } else {
                        out.append_value("")?;
                    }
                }
                Ok(Chunk::Float(out))
            }
            AggKind::Sum => {
                let mut out = IntChunk::new(Dtype::Int, true);
                for g in &self.groups {
                    let GroupValue::IntSum { set, value } = g else { unreachable!() };
                    if *set {
                        out.append_value(&value.to_string())?;
                    } else {
                        out.append_value("")?;
                    }
                }
                Ok(Chunk::Int(out))
            }
            AggKind::Avg => {
                let mut out = FloatChunk::new(true);
                for g in &self.groups {
                    let GroupValue::Avg { sum, n } = g else { unreachable!() };
                    if *n > 0 {
                        out.append_value(&(sum / *n as f64).to_string())?;
                    } else {
                        out.append_value("")?;
                    }
                }
                Ok(Chunk::Float(out))
            }
        }
    }
}

fn chunk_is_some(c: &Chunk, row: usize) -> bool {
    match c {
        Chunk::Int(ic) | Chunk::Datetime(ic) => ic.get(row).is_some(),
        Chunk::Float(fc) => fc.get(row).is_some(),
        Chunk::Bool(bc) => bc.get(row).is_some(),
        Chunk::String(sc) => sc.get(row).is_some(),
        Chunk::Nulls(_) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn ints(vals: &[&str]) -> Chunk {
        let mut c = Chunk::new(Dtype::Int, true);
        c.append_values(vals).unwrap();
        c
    }

    #[test]
    fn test_count_star() {
        let mut agg = Aggregator::new(AggKind::Count, Dtype::Invalid);
        agg.extend(&[0, 0, 1], 2, None).unwrap();
        let Chunk::Int(out) = agg.resolve().unwrap() else { panic!() };
        assert_eq!(out.get(0), Some(2));
        assert_eq!(out.get(1), Some(1));
    }

    #[test]
    fn test_count_arg_skips_nulls() {
        let mut agg = Aggregator::new(AggKind::CountArg, Dtype::Int);
        let arg = ints(&["1", "", "3"]);
        agg.extend(&[0, 0, 0], 1, Some(&arg)).unwrap();
        let Chunk::Int(out) = agg.resolve().unwrap() else { panic!() };
        assert_eq!(out.get(0), Some(2));
    }

    #[test]
    fn test_sum_and_avg() {
        let arg = ints(&["1", "2", "3"]);
        let mut sum = Aggregator::new(AggKind::Sum, Dtype::Int);
        sum.extend(&[0, 0, 1], 2, Some(&arg)).unwrap();
        let Chunk::Int(s) = sum.resolve().unwrap() else { panic!() };
        assert_eq!(s.get(0), Some(3));
        assert_eq!(s.get(1), Some(3));

        let mut avg = Aggregator::new(AggKind::Avg, Dtype::Int);
        avg.extend(&[0, 0, 1], 2, Some(&arg)).unwrap();
        let Chunk::Float(a) = avg.resolve().unwrap() else { panic!() };
        assert_eq!(a.get(0), Some(1.5));
        assert_eq!(a.get(1), Some(3.0));
    }

    #[test]
    fn test_min_max() {
        let arg = ints(&["5", "1", "9"]);
        let mut min = Aggregator::new(AggKind::Min, Dtype::Int);
        min.extend(&[0, 0, 0], 1, Some(&arg)).unwrap();
        let Chunk::Int(m) = min.resolve().unwrap() else { panic!() };
        assert_eq!(m.get(0), Some(1));
    }

    #[test]
    fn test_all_null_group_is_null() {
        let arg = ints(&["", ""]);
        let mut avg = Aggregator::new(AggKind::Avg, Dtype::Int);
        avg.extend(&[0, 0], 1, Some(&arg)).unwrap();
        let Chunk::Float(a) = avg.resolve().unwrap() else { panic!() };
        assert_eq!(a.get(0), None);
    }
}
