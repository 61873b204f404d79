//! Concrete end-to-end scenarios exercised through the `Database` facade
//! (spec.md §8).

use stratum::Database;
use stratum_base::{Dtype, ErrorKind, Uid, UidTag};
use stratum_coldb::Chunk;
use stratum_loader::VecRowSource;
use test_log::test;

fn tmp_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("stratum-e2e-{label}-{}", Uid::new(UidTag::Dataset)))
}

fn source(columns: &[&str], rows: &[&[&str]]) -> VecRowSource {
    let cols = columns.iter().map(|s| s.to_string()).collect();
    let rows = rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect();
    VecRowSource::new(cols, rows)
}

#[test]
fn test_scenario_auto_load_roundtrip() {
    let dir = tmp_dir("roundtrip");
    let db = Database::open(&dir);
    let mut src = source(&["foo", "bar", "baz"], &[&["1", "true", "1.23"], &["1444", "", "1e8"]]);
    let dataset = db.load_auto(&mut src, "t").unwrap();

    assert_eq!(dataset.schema.columns()[0].dtype, Dtype::Int);
    assert_eq!(dataset.schema.columns()[1].dtype, Dtype::Bool);
    assert!(dataset.schema.columns()[1].nullable);
    assert_eq!(dataset.schema.columns()[2].dtype, Dtype::Float);
    assert_eq!(dataset.stripes.len(), 1);

    let result = db.query("select foo, bar, baz from t").unwrap();
    let Chunk::Int(foo) = &result.columns[0] else { panic!("expected int") };
    assert_eq!(foo.get(0), Some(1));
    assert_eq!(foo.get(1), Some(1444));
    let Chunk::Bool(bar) = &result.columns[1] else { panic!("expected bool") };
    assert_eq!(bar.get(0), Some(true));
    assert_eq!(bar.get(1), None);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_scenario_filter() {
    let dir = tmp_dir("filter");
    let db = Database::open(&dir);
    let mut src = source(&["foo", "bar"], &[&["1", "4"], &["5", "5"], &["10", "4"]]);
    db.load_auto(&mut src, "t").unwrap();

    let result = db.query("select foo from t where foo > bar").unwrap();
    assert_eq!(result.num_rows(), 1);
    let Chunk::Int(foo) = &result.columns[0] else { panic!("expected int") };
    assert_eq!(foo.get(0), Some(10));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_scenario_grouped_aggregation_with_ints() {
    let dir = tmp_dir("grp-int");
    let db = Database::open(&dir);
    let mut src = source(&["foo", "bar"], &[&["1", "12"], &["13", "2"], &["1", "3"]]);
    db.load_auto(&mut src, "t").unwrap();

    let result = db.query("select foo, min(bar) from t group by foo").unwrap();
    assert_eq!(result.num_rows(), 2);
    let Chunk::Int(foo) = &result.columns[0] else { panic!("expected int") };
    let Chunk::Int(min_bar) = &result.columns[1] else { panic!("expected int") };
    assert_eq!((foo.get(0), min_bar.get(0)), (Some(1), Some(3)));
    assert_eq!((foo.get(1), min_bar.get(1)), (Some(13), Some(2)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_scenario_grouped_aggregation_with_nulls() {
    let dir = tmp_dir("grp-null");
    let db = Database::open(&dir);
    let mut src = source(&["foo", "bar"], &[&["1", ""], &["", ""], &["1", "10"], &["", "4"], &["", ""]]);
    db.load_auto(&mut src, "t").unwrap();

    let result = db.query("select foo, count(bar) from t group by foo").unwrap();
    assert_eq!(result.num_rows(), 2);
    let Chunk::Int(foo) = &result.columns[0] else { panic!("expected int") };
    let Chunk::Int(count_bar) = &result.columns[1] else { panic!("expected int") };
    assert_eq!((foo.get(0), count_bar.get(0)), (Some(1), Some(1)));
    assert_eq!((foo.get(1), count_bar.get(1)), (None, Some(1)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_scenario_order_preserving_grouping() {
    let dir = tmp_dir("grp-order");
    let db = Database::open(&dir);
    let mut src = source(&["foo", "bar"], &[&["a", "b"], &["b", "a"]]);
    db.load_auto(&mut src, "t").unwrap();

    let result = db.query("select foo, bar from t group by foo, bar").unwrap();
    assert_eq!(result.num_rows(), 2);
    let Chunk::String(foo) = &result.columns[0] else { panic!("expected string") };
    let Chunk::String(bar) = &result.columns[1] else { panic!("expected string") };
    assert_eq!((foo.get(0), bar.get(0)), (Some("a"), Some("b")));
    assert_eq!((foo.get(1), bar.get(1)), (Some("b"), Some("a")));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_scenario_bitflip_detection() {
    let dir = tmp_dir("bitflip");
    let db = Database::open(&dir);
    let mut src = source(&["foo", "bar", "baz"], &[&["1", "true", "1.23"], &["1444", "", "1e8"]]);
    let dataset = db.load_auto(&mut src, "t").unwrap();
    assert_eq!(dataset.stripes.len(), 1);

    let stripe_path = db.working_directory().join(dataset.uid.to_hex()).join(format!("{}.stripe", dataset.stripes[0].to_hex()));
    let original = std::fs::read(&stripe_path).unwrap();

    let mut flipped_any_detected = false;
    for pos in 2..original.len().saturating_sub(32) {
        let mut bytes = original.clone();
        bytes[pos] ^= 0xFF;
        std::fs::write(&stripe_path, &bytes).unwrap();

        let mut rd = stratum_base::ioutil::FileReader::open(&stripe_path).unwrap();
        let dtypes: Vec<Dtype> = dataset.schema.columns().iter().map(|c| c.dtype).collect();
        if stratum_coldb::Stripe::read_all(&mut rd, &dtypes).is_err_and(|e| e.kind() == ErrorKind::IncorrectChecksum) {
            flipped_any_detected = true;
        }
    }
    assert!(flipped_any_detected, "expected at least one flipped byte to trip a checksum failure");

    std::fs::write(&stripe_path, &original).unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}
