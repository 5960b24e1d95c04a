//! 4.6: the evaluator's collaborator contract. `function_library.rs` does not
//! implement a spreadsheet's whole function surface; it defines the trait
//! boundary and ships a small built-in set so the engine and its tests can
//! run end to end without an external library plugged in.

use formualizer_common::{ExcelError, ExcelErrorKind, LiteralValue};
use rustc_hash::FxHashMap;

/// An already-evaluated call argument: either a single value or a 2D block,
/// so functions like `SUM`/`AVERAGE` can fold over a range without the
/// caller flattening it first.
#[derive(Debug, Clone)]
pub enum FnArg {
    Scalar(LiteralValue),
    Range(Vec<Vec<LiteralValue>>),
}

impl FnArg {
    pub fn flatten(&self) -> Vec<LiteralValue> {
        match self {
            FnArg::Scalar(v) => vec![v.clone()],
            FnArg::Range(rows) => rows.iter().flat_map(|r| r.iter().cloned()).collect(),
        }
    }

    pub fn as_scalar(&self) -> LiteralValue {
        match self {
            FnArg::Scalar(v) => v.clone(),
            FnArg::Range(rows) => rows
                .first()
                .and_then(|r| r.first())
                .cloned()
                .unwrap_or(LiteralValue::Empty),
        }
    }
}

/// How a function call should be scheduled: whether it must re-run on every
/// recompute regardless of dirtiness (`NOW`, `RAND`) and whether its result
/// depends on sheet shape rather than just cell values (`ROW`, `OFFSET`),
/// which forces the owning vertex to be tagged `structural` in `FormulaData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionTraits {
    pub volatile: bool,
    pub structural: bool,
}

pub trait FunctionLibrary {
    /// Looks up a function by case-insensitive name, evaluating `args` that
    /// have already been resolved from the graph. Returns `Error(Name)` via
    /// the caller when `None`.
    fn call(&self, name: &str, args: &[FnArg]) -> LiteralValue;

    fn traits(&self, name: &str) -> FunctionTraits;

    fn contains(&self, name: &str) -> bool;
}

fn numeric_fold(args: &[FnArg], init: f64, f: impl Fn(f64, f64) -> f64) -> LiteralValue {
    let mut acc = init;
    for arg in args {
        for v in arg.flatten() {
            match v {
                LiteralValue::Number(n) => acc = f(acc, n),
                LiteralValue::Empty => {}
                LiteralValue::Boolean(b) => acc = f(acc, if b { 1.0 } else { 0.0 }),
                LiteralValue::Error(e) => return LiteralValue::Error(e),
                _ => {}
            }
        }
    }
    LiteralValue::Number(acc)
}

fn count_numeric(args: &[FnArg]) -> usize {
    args.iter()
        .flat_map(|a| a.flatten())
        .filter(|v| matches!(v, LiteralValue::Number(_)))
        .count()
}

/// A minimal built-in library covering enough surface (aggregation,
/// branching, a volatile clock function) for the engine to be exercised
/// without a full formula-function implementation plugged in.
pub struct BuiltinLibrary {
    traits: FxHashMap<&'static str, FunctionTraits>,
}

impl Default for BuiltinLibrary {
    fn default() -> Self {
        let mut traits = FxHashMap::default();
        traits.insert("SUM", FunctionTraits::default());
        traits.insert("AVERAGE", FunctionTraits::default());
        traits.insert("COUNT", FunctionTraits::default());
        traits.insert("MIN", FunctionTraits::default());
        traits.insert("MAX", FunctionTraits::default());
        traits.insert("IF", FunctionTraits::default());
        traits.insert(
            "NOW",
            FunctionTraits {
                volatile: true,
                structural: false,
            },
        );
        Self { traits }
    }
}

impl BuiltinLibrary {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FunctionLibrary for BuiltinLibrary {
    fn call(&self, name: &str, args: &[FnArg]) -> LiteralValue {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => numeric_fold(args, 0.0, |a, b| a + b),
            "AVERAGE" => {
                let count = count_numeric(args);
                if count == 0 {
                    return LiteralValue::Error(ExcelError::new(ExcelErrorKind::Div));
                }
                match numeric_fold(args, 0.0, |a, b| a + b) {
                    LiteralValue::Number(sum) => LiteralValue::Number(sum / count as f64),
                    other => other,
                }
            }
            "COUNT" => LiteralValue::Number(count_numeric(args) as f64),
            "MIN" => numeric_fold(args, f64::INFINITY, f64::min),
            "MAX" => numeric_fold(args, f64::NEG_INFINITY, f64::max),
            "IF" => {
                let cond = args.first().map(|a| a.as_scalar()).unwrap_or(LiteralValue::Empty);
                let truthy = match cond {
                    LiteralValue::Boolean(b) => b,
                    LiteralValue::Number(n) => n != 0.0,
                    LiteralValue::Error(e) => return LiteralValue::Error(e),
                    _ => false,
                };
                if truthy {
                    args.get(1).map(|a| a.as_scalar()).unwrap_or(LiteralValue::Boolean(true))
                } else {
                    args.get(2).map(|a| a.as_scalar()).unwrap_or(LiteralValue::Boolean(false))
                }
            }
            "NOW" => LiteralValue::Error(ExcelError::new(ExcelErrorKind::Value)),
            _ => LiteralValue::Error(ExcelError::new(ExcelErrorKind::Name)),
        }
    }

    fn traits(&self, name: &str) -> FunctionTraits {
        self.traits
            .get(name.to_ascii_uppercase().as_str())
            .copied()
            .unwrap_or_default()
    }

    fn contains(&self, name: &str) -> bool {
        self.traits.contains_key(name.to_ascii_uppercase().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_folds_scalars_and_ranges() {
        let lib = BuiltinLibrary::new();
        let args = vec![
            FnArg::Scalar(LiteralValue::Number(1.0)),
            FnArg::Range(vec![vec![LiteralValue::Number(2.0), LiteralValue::Number(3.0)]]),
        ];
        assert_eq!(lib.call("SUM", &args), LiteralValue::Number(6.0));
    }

    #[test]
    fn average_of_no_numbers_is_div_error() {
        let lib = BuiltinLibrary::new();
        let args = vec![FnArg::Scalar(LiteralValue::Text("x".into()))];
        assert_eq!(
            lib.call("AVERAGE", &args),
            LiteralValue::Error(ExcelError::new(ExcelErrorKind::Div))
        );
    }

    #[test]
    fn if_selects_branch_by_condition() {
        let lib = BuiltinLibrary::new();
        let args = vec![
            FnArg::Scalar(LiteralValue::Boolean(false)),
            FnArg::Scalar(LiteralValue::Number(1.0)),
            FnArg::Scalar(LiteralValue::Number(2.0)),
        ];
        assert_eq!(lib.call("IF", &args), LiteralValue::Number(2.0));
    }

    #[test]
    fn now_is_classified_volatile() {
        let lib = BuiltinLibrary::new();
        assert!(lib.traits("now").volatile);
    }

    #[test]
    fn unknown_function_is_name_error() {
        let lib = BuiltinLibrary::new();
        assert!(!lib.contains("BOGUS"));
        assert_eq!(
            lib.call("BOGUS", &[]),
            LiteralValue::Error(ExcelError::new(ExcelErrorKind::Name))
        );
    }
}
