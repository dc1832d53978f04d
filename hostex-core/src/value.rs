/// A raw value produced by a collector's snapshot.
///
/// Raw values are either a single scalar (a fully pinned instance, such as
/// one CPU core) or a sequence of values (one per instance, produced when a
/// variable name carries an aggregate marker). Sequences may nest; the
/// aggregate functions in `hostex-eval` flatten them recursively before
/// reducing.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A single numeric value.
    Scalar(f64),
    /// One value per instance of an unpinned dimension.
    Sequence(Vec<Value>),
}

impl Value {
    /// Returns the scalar payload, or `None` for a sequence.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Sequence(_) => None,
        }
    }

    /// Visits every leaf scalar in depth-first order.
    pub fn for_each_leaf<F: FnMut(f64)>(&self, f: &mut F) {
        match self {
            Value::Scalar(v) => f(*v),
            Value::Sequence(items) => {
                for item in items {
                    item.for_each_leaf(f);
                }
            }
        }
    }

    /// Number of leaf scalars reachable from this value.
    pub fn leaf_count(&self) -> usize {
        let mut n = 0;
        self.for_each_leaf(&mut |_| n += 1);
        n
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(vs: Vec<f64>) -> Self {
        Value::Sequence(vs.into_iter().map(Value::Scalar).collect())
    }
}

impl FromIterator<f64> for Value {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Value::Sequence(iter.into_iter().map(Value::Scalar).collect())
    }
}
