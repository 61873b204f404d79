//! A dataset's catalog entry (spec.md §4.4): its identity, schema, and the ordered
//! list of stripes that make up its rows.

use serde::{Deserialize, Serialize};

use stratum_base::{TableSchema, Uid};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub uid: Uid,
    pub name: String,
    pub schema: TableSchema,
    /// Stripe UIDs in dataset row order (spec.md §5: "dataset row order equals
    /// stripe-list order concatenated with in-stripe row order").
    pub stripes: Vec<Uid>,
}

impl Dataset {
    pub fn new(uid: Uid, name: impl Into<String>, schema: TableSchema) -> Self {
        Dataset { uid, name: name.into(), schema, stripes: Vec::new() }
    }

    pub fn push_stripe(&mut self, stripe: Uid) {
        self.stripes.push(stripe);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use stratum_base::{Dtype, Schema, UidTag};
    use test_log::test;

    #[test]
    fn test_json_roundtrip() {
        let mut d = Dataset::new(Uid::new(UidTag::Dataset), "events", TableSchema::new(vec![Schema::new("a", Dtype::Int, false)]));
        d.push_stripe(Uid::new(UidTag::Stripe));
        let json = serde_json::to_string(&d).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
