use hostex_core::Value;

/// The built-in aggregate function table.
///
/// Every function is variadic and accepts any mix of scalars and nested
/// sequences; sequences are flattened recursively before reducing, so
/// `sum(x)` where `x` is a per-core sequence is the plain sum of every
/// core's value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Function {
    /// Sum of all leaf scalars.
    Sum,
    /// `sum / count` over the same flattened leaf set.
    ///
    /// With zero leaves this is `0.0 / 0.0` and yields `NaN`, which the
    /// exposition renders literally as `NaN`. Retained compatibility quirk,
    /// like the [`Function::Max`] seed.
    Average,
    /// Number of leaf scalars.
    Count,
    /// Maximum leaf scalar, folded from a `0.0` seed.
    ///
    /// The zero seed is a retained compatibility quirk: inputs that are
    /// entirely negative report `0.0` instead of their true maximum. Fixing
    /// it would silently change long-published series.
    Max,
    /// Minimum leaf scalar, folded from a `0.0` seed (same quirk as
    /// [`Function::Max`]).
    Min,
}

impl Function {
    /// Looks a function up by its name in an expression.
    pub fn from_name(name: &str) -> Option<Function> {
        match name {
            "sum" => Some(Function::Sum),
            "average" => Some(Function::Average),
            "count" => Some(Function::Count),
            "max" => Some(Function::Max),
            "min" => Some(Function::Min),
            _ => None,
        }
    }

    /// The name this function is called by.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Sum => "sum",
            Function::Average => "average",
            Function::Count => "count",
            Function::Max => "max",
            Function::Min => "min",
        }
    }

    /// Applies the function to already-evaluated arguments.
    pub fn apply(&self, args: &[Value]) -> f64 {
        match self {
            Function::Sum => fold_leaves(args, 0.0, |acc, v| acc + v),
            Function::Count => count(args),
            Function::Average => fold_leaves(args, 0.0, |acc, v| acc + v) / count(args),
            Function::Max => fold_leaves(args, 0.0, f64::max),
            Function::Min => fold_leaves(args, 0.0, f64::min),
        }
    }
}

fn fold_leaves(args: &[Value], seed: f64, f: impl Fn(f64, f64) -> f64) -> f64 {
    let mut acc = seed;
    for arg in args {
        arg.for_each_leaf(&mut |v| acc = f(acc, v));
    }
    acc
}

fn count(args: &[Value]) -> f64 {
    args.iter().map(Value::leaf_count).sum::<usize>() as f64
}

#[cfg(test)]
mod tests {
    use hostex_core::Value;

    use super::Function;

    fn seq(vs: &[f64]) -> Value {
        vs.iter().copied().collect()
    }

    #[test]
    fn sum_flattens_nested_sequences() {
        let args = [Value::Scalar(1.0), Value::Scalar(2.0), seq(&[3.0, 4.0])];
        assert_eq!(Function::Sum.apply(&args), 10.0);
    }

    #[test]
    fn average_is_sum_over_count_of_leaves() {
        let args = [Value::Scalar(2.0), Value::Scalar(4.0)];
        assert_eq!(Function::Average.apply(&args), 3.0);

        let args = [Value::Scalar(1.0), seq(&[2.0, 3.0])];
        assert_eq!(Function::Average.apply(&args), 2.0);
    }

    #[test]
    fn average_of_zero_leaves_is_nan() {
        assert!(Function::Average.apply(&[]).is_nan());
        assert!(Function::Average.apply(&[Value::Sequence(Vec::new())]).is_nan());
    }

    #[test]
    fn count_counts_leaves_only() {
        let args = [Value::Scalar(1.0), seq(&[2.0, 3.0])];
        assert_eq!(Function::Count.apply(&args), 3.0);

        let nested = [Value::Sequence(vec![seq(&[1.0, 2.0]), Value::Scalar(3.0)])];
        assert_eq!(Function::Count.apply(&nested), 3.0);
    }

    #[test]
    fn max_and_min_keep_the_zero_seed_quirk() {
        // All-negative inputs pin at zero. Known, retained defect.
        let args = [seq(&[-3.0, -1.0, -2.0])];
        assert_eq!(Function::Max.apply(&args), 0.0);
        assert_eq!(Function::Min.apply(&args), -3.0);

        let args = [seq(&[3.0, 1.0, 2.0])];
        assert_eq!(Function::Max.apply(&args), 3.0);
        assert_eq!(Function::Min.apply(&args), 0.0);
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Function::from_name("sum"), Some(Function::Sum));
        assert_eq!(Function::from_name("median"), None);
        assert_eq!(Function::Average.name(), "average");
    }
}
