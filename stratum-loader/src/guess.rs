//! Per-column type inference over an all-string dataset (spec.md §4.5).

use stratum_base::Dtype;
use stratum_coldb::looks_like_datetime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Guess {
    Unknown,
    Bool,
    Int,
    Float,
    Datetime,
    String,
}

fn classify(value: &str) -> Guess {
    if matches!(value, "t" | "T" | "f" | "F" | "true" | "TRUE" | "false" | "FALSE") {
        return Guess::Bool;
    }
    if value.chars().any(|c| c.is_ascii_digit()) {
        if value.parse::<i64>().is_ok() {
            return Guess::Int;
        }
        if value.parse::<f64>().is_ok() {
            return Guess::Float;
        }
        if looks_like_datetime(value) {
            return Guess::Datetime;
        }
    }
    Guess::String
}

fn combine(acc: Guess, new: Guess) -> Guess {
    match (acc, new) {
        (Guess::Unknown, x) => x,
        (a, b) if a == b => a,
        (Guess::Int, Guess::Float) | (Guess::Float, Guess::Int) => Guess::Float,
        _ => Guess::String,
    }
}

#[derive(Clone, Debug, Default)]
pub struct ColumnGuesser {
    nullable: bool,
    any_non_null: bool,
    guess: Option<Guess>,
}

impl ColumnGuesser {
    pub fn new() -> Self {
        ColumnGuesser::default()
    }

    /// Folds in one observed raw value (empty string is the loader's null marker,
    /// per the same convention as the chunk layer).
    pub fn see(&mut self, value: &str) {
        if value.is_empty() {
            self.nullable = true;
            return;
        }
        self.any_non_null = true;
        let g = classify(value);
        self.guess = Some(match self.guess {
            Some(acc) => combine(acc, g),
            None => g,
        });
    }

    /// Aggregation rule (spec.md §4.5): a single observed type wins outright; a mix of
    /// only ints and floats promotes to float; anything else falls back to string;
    /// zero non-null rows become the `null` dtype.
    pub fn finish(&self) -> (Dtype, bool) {
        if !self.any_non_null {
            return (Dtype::Null, true);
        }
        let dtype = match self.guess.unwrap_or(Guess::String) {
            Guess::Unknown => Dtype::String,
            Guess::Bool => Dtype::Bool,
            Guess::Int => Dtype::Int,
            Guess::Float => Dtype::Float,
            Guess::Datetime => Dtype::Datetime,
            Guess::String => Dtype::String,
        };
        (dtype, self.nullable)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_single_type_wins() {
        let mut g = ColumnGuesser::new();
        for v in ["1", "2", "3"] {
            g.see(v);
        }
        assert_eq!(g.finish(), (Dtype::Int, false));
    }

    #[test]
    fn test_int_float_mix_promotes_to_float() {
        let mut g = ColumnGuesser::new();
        g.see("1");
        g.see("2.5");
        assert_eq!(g.finish(), (Dtype::Float, false));
    }

    #[test]
    fn test_mixed_types_fall_back_to_string() {
        let mut g = ColumnGuesser::new();
        g.see("1");
        g.see("hello");
        assert_eq!(g.finish(), (Dtype::String, false));
    }

    #[test]
    fn test_empty_marks_nullable_without_counting() {
        let mut g = ColumnGuesser::new();
        g.see("");
        g.see("1");
        assert_eq!(g.finish(), (Dtype::Int, true));
    }

    #[test]
    fn test_all_null_column() {
        let mut g = ColumnGuesser::new();
        g.see("");
        g.see("");
        assert_eq!(g.finish(), (Dtype::Null, true));
    }

    #[test]
    fn test_bool_classification() {
        let mut g = ColumnGuesser::new();
        g.see("true");
        g.see("FALSE");
        assert_eq!(g.finish(), (Dtype::Bool, false));
    }

    #[test]
    fn test_datetime_classification() {
        let mut g = ColumnGuesser::new();
        g.see("2024-01-15T09:30:00Z");
        g.see("2024-02-20T18:05:30.125Z");
        assert_eq!(g.finish(), (Dtype::Datetime, false));
    }

    #[test]
    fn test_datetime_mixed_with_string_falls_back_to_string() {
        let mut g = ColumnGuesser::new();
        g.see("2024-01-15T09:30:00Z");
        g.see("not a date");
        assert_eq!(g.finish(), (Dtype::String, false));
    }
}
