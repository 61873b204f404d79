//! The two-pass auto-inferring loader and the schema-supplied direct loader
//! (spec.md §4.5).

use stratum_base::ioutil::{FileReader, FileWriter};
use stratum_base::{err_kind, CancelToken, Dtype, ErrorKind, Result, Schema, TableSchema, Uid, UidTag};
use stratum_catalog::{Catalog, Dataset};
use stratum_coldb::{Chunk, Stripe};
use tracing::debug;

use crate::guess::ColumnGuesser;
use crate::row_source::RowSource;
use crate::settings::Settings;

struct StripeCutter<'a> {
    catalog: &'a Catalog,
    dataset_uid: Uid,
    schema: &'a TableSchema,
    settings: &'a Settings,
    cancel: &'a CancelToken,
    chunks: Vec<Chunk>,
    rows: usize,
    bytes: usize,
    stripes: Vec<Uid>,
}

impl<'a> StripeCutter<'a> {
    fn new(catalog: &'a Catalog, dataset_uid: Uid, schema: &'a TableSchema, settings: &'a Settings, cancel: &'a CancelToken) -> Self {
        let chunks = schema.columns().iter().map(|c| Chunk::new(c.dtype, c.nullable)).collect();
        StripeCutter { catalog, dataset_uid, schema, settings, cancel, chunks, rows: 0, bytes: 0, stripes: Vec::new() }
    }

    fn push_row(&mut self, values: &[&str]) -> Result<()> {
        for (chunk, value) in self.chunks.iter_mut().zip(values) {
            chunk.append_value(value)?;
            self.bytes += value.len();
        }
        self.rows += 1;
        if self.rows >= self.settings.max_rows_per_stripe || self.bytes >= self.settings.max_bytes_per_stripe {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.rows == 0 {
            return Ok(());
        }
        self.cancel.check()?;
        let stripe_uid = Uid::new(UidTag::Stripe);
        std::fs::create_dir_all(self.catalog.dataset_directory(self.dataset_uid))?;
        let mut wr = FileWriter::create_new(self.catalog.stripe_path(self.dataset_uid, stripe_uid))?;
        Stripe::new(std::mem::take(&mut self.chunks)).write(&mut wr)?;
        debug!(stripe = %stripe_uid, rows = self.rows, "loader: cut stripe");
        self.stripes.push(stripe_uid);
        self.chunks = self.schema.columns().iter().map(|c| Chunk::new(c.dtype, c.nullable)).collect();
        self.rows = 0;
        self.bytes = 0;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Uid>> {
        self.flush()?;
        Ok(self.stripes)
    }
}

fn all_string_schema(columns: &[String]) -> TableSchema {
    TableSchema::new(columns.iter().map(|c| Schema::new(c.clone(), Dtype::String, false)).collect())
}

/// Auto-inference mode (spec.md §4.5): pass 1 writes an all-string dataset, pass 2
/// infers a schema from it, pass 3 casts every stripe to the inferred schema. The
/// intermediate string-typed dataset is deleted once casting completes.
///
/// `cancel` is checked between stripes in every pass (spec.md §5); on cancellation no
/// partial dataset is added to `catalog` — the half-written temporary dataset's files
/// are left on disk but never registered, so a caller never observes a partial result.
pub fn load_auto(source: &mut dyn RowSource, settings: &Settings, catalog: &Catalog, name: &str, cancel: &CancelToken) -> Result<Dataset> {
    let string_schema = all_string_schema(source.columns());
    let tmp_uid = Uid::new(UidTag::Dataset);
    let mut cutter = StripeCutter::new(catalog, tmp_uid, &string_schema, settings, cancel);

    while let Some(row) = source.next_row()? {
        let refs: Vec<&str> = row.iter().map(String::as_str).collect();
        cutter.push_row(&refs)?;
    }
    let stripe_uids = cutter.finish()?;

    let mut tmp_dataset = Dataset::new(tmp_uid, format!("{name}.__strings"), string_schema.clone());
    for s in &stripe_uids {
        tmp_dataset.push_stripe(*s);
    }
    catalog.add(tmp_dataset)?;

    let string_dtypes: Vec<Dtype> = string_schema.columns().iter().map(|_| Dtype::String).collect();
    let mut guessers: Vec<ColumnGuesser> = string_schema.columns().iter().map(|_| ColumnGuesser::new()).collect();
    for stripe in &stripe_uids {
        cancel.check()?;
        let mut rd = FileReader::open(catalog.stripe_path(tmp_uid, *stripe))?;
        let loaded = Stripe::read_all(&mut rd, &string_dtypes)?;
        for (col_idx, chunk) in loaded.columns.iter().enumerate() {
            let Chunk::String(sc) = chunk else { unreachable!("string-typed pass") };
            for i in 0..sc.len() {
                guessers[col_idx].see(sc.get(i).unwrap_or(""));
            }
        }
    }
    let final_columns: Vec<Schema> = string_schema
        .columns()
        .iter()
        .zip(guessers.iter())
        .map(|(col, guesser)| {
            let (dtype, nullable) = guesser.finish();
            Schema::new(col.name.clone(), dtype, nullable)
        })
        .collect();
    let final_schema = TableSchema::new(final_columns);

    let final_uid = Uid::new(UidTag::Dataset);
    std::fs::create_dir_all(catalog.dataset_directory(final_uid))?;
    let mut final_dataset = Dataset::new(final_uid, name, final_schema.clone());

    for stripe in &stripe_uids {
        cancel.check()?;
        let mut rd = FileReader::open(catalog.stripe_path(tmp_uid, *stripe))?;
        let loaded = Stripe::read_all(&mut rd, &string_dtypes)?;
        let mut typed: Vec<Chunk> = final_schema.columns().iter().map(|c| Chunk::new(c.dtype, c.nullable)).collect();
        for (col_idx, chunk) in loaded.columns.iter().enumerate() {
            let Chunk::String(sc) = chunk else { unreachable!("string-typed pass") };
            let col_name = &final_schema.columns()[col_idx].name;
            for i in 0..sc.len() {
                let text = sc.get(i).unwrap_or("");
                typed[col_idx]
                    .append_value(text)
                    .map_err(|e| err_kind(e.kind(), format!("column {col_name:?}: {e}")))?;
            }
        }
        let new_stripe_uid = Uid::new(UidTag::Stripe);
        let mut wr = FileWriter::create_new(catalog.stripe_path(final_uid, new_stripe_uid))?;
        Stripe::new(typed).write(&mut wr)?;
        final_dataset.push_stripe(new_stripe_uid);
    }

    cancel.check()?;
    catalog.add(final_dataset.clone())?;
    catalog.remove(tmp_uid)?;
    Ok(final_dataset)
}

/// Schema-supplied mode (spec.md §4.5): validates the source's column names against
/// `schema` and writes typed chunks directly, with no intermediate string pass.
///
/// `cancel` is checked between stripes (spec.md §5); on cancellation the dataset is
/// never added to `catalog`, so no partial result is ever observable by a caller.
pub fn load_with_schema(
    source: &mut dyn RowSource,
    schema: TableSchema,
    settings: &Settings,
    catalog: &Catalog,
    name: &str,
    cancel: &CancelToken,
) -> Result<Dataset> {
    let expected: Vec<&str> = schema.columns().iter().map(|c| c.name.as_str()).collect();
    let actual = source.columns();
    if actual.len() != expected.len() || !actual.iter().zip(&expected).all(|(a, e)| a.eq_ignore_ascii_case(e)) {
        return Err(err_kind(
            ErrorKind::SchemaMismatch,
            format!("row source columns {actual:?} do not match supplied schema columns {expected:?}"),
        ));
    }

    let uid = Uid::new(UidTag::Dataset);
    let mut cutter = StripeCutter::new(catalog, uid, &schema, settings, cancel);

    let mut row_num = 0usize;
    while let Some(row) = source.next_row()? {
        let refs: Vec<&str> = row.iter().map(String::as_str).collect();
        cutter.push_row(&refs).map_err(|e| err_kind(e.kind(), format!("row {row_num}: {e}")))?;
        row_num += 1;
    }
    let stripe_uids = cutter.finish()?;

    cancel.check()?;
    let mut dataset = Dataset::new(uid, name, schema);
    for s in stripe_uids {
        dataset.push_stripe(s);
    }
    catalog.add(dataset.clone())?;
    Ok(dataset)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::row_source::VecRowSource;
    use test_log::test;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect()
    }

    #[test]
    fn test_auto_infers_int_column() {
        let tmp = std::env::temp_dir().join(format!("stratum-loader-test-{}", Uid::new(UidTag::Dataset)));
        let settings = Settings::default();
        let catalog = Catalog::new(&tmp);
        let mut src = VecRowSource::new(cols(&["id", "name"]), rows(&[&["1", "alice"], &["2", "bob"], &["", "carol"]]));
        let dataset = load_auto(&mut src, &settings, &catalog, "people", &CancelToken::new()).unwrap();
        assert_eq!(dataset.schema.columns()[0].dtype, Dtype::Int);
        assert!(dataset.schema.columns()[0].nullable);
        assert_eq!(dataset.schema.columns()[1].dtype, Dtype::String);
        assert_eq!(dataset.stripes.len(), 1);
        assert!(catalog.get_by_name("people.__strings").is_none());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_stripe_cutting_respects_max_rows() {
        let tmp = std::env::temp_dir().join(format!("stratum-loader-test-{}", Uid::new(UidTag::Dataset)));
        let settings = Settings { max_rows_per_stripe: 2, ..Settings::default() };
        let catalog = Catalog::new(&tmp);
        let mut src = VecRowSource::new(cols(&["id"]), rows(&[&["1"], &["2"], &["3"], &["4"], &["5"]]));
        let dataset = load_auto(&mut src, &settings, &catalog, "seq", &CancelToken::new()).unwrap();
        assert_eq!(dataset.stripes.len(), 3);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_schema_supplied_rejects_mismatched_columns() {
        let tmp = std::env::temp_dir().join(format!("stratum-loader-test-{}", Uid::new(UidTag::Dataset)));
        let settings = Settings::default();
        let catalog = Catalog::new(&tmp);
        let schema = TableSchema::new(vec![Schema::new("id", Dtype::Int, false)]);
        let mut src = VecRowSource::new(cols(&["other"]), rows(&[&["1"]]));
        let err = load_with_schema(&mut src, schema, &settings, &catalog, "x", &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_schema_supplied_writes_typed_chunks() {
        let tmp = std::env::temp_dir().join(format!("stratum-loader-test-{}", Uid::new(UidTag::Dataset)));
        let settings = Settings::default();
        let catalog = Catalog::new(&tmp);
        let schema = TableSchema::new(vec![Schema::new("id", Dtype::Int, false), Schema::new("score", Dtype::Float, true)]);
        let mut src = VecRowSource::new(cols(&["id", "score"]), rows(&[&["1", "1.5"], &["2", ""]]));
        let dataset = load_with_schema(&mut src, schema, &settings, &catalog, "scored", &CancelToken::new()).unwrap();
        assert_eq!(dataset.stripes.len(), 1);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_cancellation_leaves_no_dataset_registered() {
        let tmp = std::env::temp_dir().join(format!("stratum-loader-test-{}", Uid::new(UidTag::Dataset)));
        let settings = Settings { max_rows_per_stripe: 1, ..Settings::default() };
        let catalog = Catalog::new(&tmp);
        let schema = TableSchema::new(vec![Schema::new("id", Dtype::Int, false)]);
        let mut src = VecRowSource::new(cols(&["id"]), rows(&[&["1"], &["2"], &["3"]]));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = load_with_schema(&mut src, schema, &settings, &catalog, "x", &cancel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(catalog.get_by_name("x").is_none());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
