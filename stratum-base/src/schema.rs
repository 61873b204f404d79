// Dtype and schema: the data model shared by every crate in the workspace
// (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Invalid,
    Null,
    String,
    Int,
    Float,
    Bool,
    Datetime,
}

impl Dtype {
    pub fn is_numeric(self) -> bool {
        matches!(self, Dtype::Int | Dtype::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dtype::Invalid => "invalid",
            Dtype::Null => "null",
            Dtype::String => "string",
            Dtype::Int => "int",
            Dtype::Float => "float",
            Dtype::Bool => "bool",
            Dtype::Datetime => "datetime",
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub dtype: Dtype,
    pub nullable: bool,
}

impl Schema {
    pub fn new(name: impl Into<String>, dtype: Dtype, nullable: bool) -> Self {
        Schema { name: name.into(), dtype, nullable }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema(pub Vec<Schema>);

impl TableSchema {
    pub fn new(cols: Vec<Schema>) -> Self {
        TableSchema(cols)
    }

    pub fn columns(&self) -> &[Schema] {
        &self.0
    }

    /// Locate a column by name: case-sensitive if `quoted`, case-insensitive otherwise
    /// (spec.md §3 "columns are located by name").
    pub fn find(&self, name: &str, quoted: bool) -> Option<(usize, &Schema)> {
        self.0.iter().enumerate().find(|(_, s)| {
            if quoted {
                s.name == name
            } else {
                s.name.eq_ignore_ascii_case(name)
            }
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_find_case_insensitive() {
        let ts = TableSchema::new(vec![Schema::new("Foo", Dtype::Int, false)]);
        assert!(ts.find("foo", false).is_some());
        assert!(ts.find("foo", true).is_none());
        assert!(ts.find("Foo", true).is_some());
    }

    #[test]
    fn test_schema_json() {
        let s = Schema::new("bar", Dtype::Float, true);
        let j = serde_json::to_string(&s).unwrap();
        assert_eq!(j, r#"{"name":"bar","dtype":"float","nullable":true}"#);
    }
}
