//! Codec for dotted, at-sign-delimited variable names.
//!
//! Configuration authors address raw collector values with strings of the
//! form `base.dim1@val1.dim2@val2`, e.g. `cstate_seconds_total.core@0.state@c1`.
//! A dimension with an empty value (`core@`) is the aggregate marker: the
//! resolving collector returns one value per instance of that dimension
//! instead of a single scalar.

use std::collections::BTreeMap;

use thiserror::Error;

/// Decoded dimension name/value pairs of a variable name.
pub type Dimensions = BTreeMap<String, String>;

/// Error decoding a variable name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VarNameError {
    /// The variable name was empty or started with a dot.
    #[error("variable name has an empty base")]
    EmptyBase,

    /// A dimension segment did not contain an `@` separator.
    #[error("malformed dimension segment '{0}', expected 'dim@value'")]
    MalformedSegment(String),
}

/// Splits a variable name into its base name and dimension map.
///
/// Decoding is pure: no global state, no panics. Invalid input fails with a
/// [`VarNameError`].
pub fn decode(varname: &str) -> Result<(String, Dimensions), VarNameError> {
    let mut parts = varname.split('.');
    let base = parts.next().unwrap_or_default();
    if base.is_empty() {
        return Err(VarNameError::EmptyBase);
    }

    let mut dims = Dimensions::new();
    for segment in parts {
        let (dim, value) = segment
            .split_once('@')
            .ok_or_else(|| VarNameError::MalformedSegment(segment.to_string()))?;
        if dim.is_empty() {
            return Err(VarNameError::MalformedSegment(segment.to_string()));
        }
        dims.insert(dim.to_string(), value.to_string());
    }

    Ok((base.to_string(), dims))
}

/// Whether the decoded value for a dimension requests an aggregate across
/// all instances of that dimension.
pub fn is_aggregate(dims: &Dimensions, dim: &str) -> bool {
    matches!(dims.get(dim), Some(v) if v.is_empty())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{decode, is_aggregate, VarNameError};

    #[test]
    fn decodes_pinned_dimensions() {
        let (base, dims) = decode("cstate_seconds_total.core@0.state@c1").unwrap();
        assert_eq!(base, "cstate_seconds_total");
        assert_eq!(dims.get("core").map(String::as_str), Some("0"));
        assert_eq!(dims.get("state").map(String::as_str), Some("c1"));
    }

    #[test]
    fn empty_value_is_the_aggregate_marker() {
        let (base, dims) = decode("x.core@").unwrap();
        assert_eq!(base, "x");
        assert_eq!(dims.get("core").map(String::as_str), Some(""));
        assert!(is_aggregate(&dims, "core"));
        assert!(!is_aggregate(&dims, "state"));
    }

    #[test]
    fn bare_base_has_no_dimensions() {
        let (base, dims) = decode("interrupts_total").unwrap();
        assert_eq!(base, "interrupts_total");
        assert!(dims.is_empty());
    }

    #[test]
    fn missing_separator_is_an_error() {
        assert_eq!(
            decode("x.core"),
            Err(VarNameError::MalformedSegment("core".to_string()))
        );
        assert_eq!(decode(""), Err(VarNameError::EmptyBase));
        assert_eq!(decode(".core@0"), Err(VarNameError::EmptyBase));
    }

    #[test]
    fn value_may_itself_contain_an_at_sign() {
        let (_, dims) = decode("x.tag@a@b").unwrap();
        assert_eq!(dims.get("tag").map(String::as_str), Some("a@b"));
    }

    proptest! {
        // Any well-formed name round-trips its base and dimension values.
        #[test]
        fn well_formed_names_decode(
            base in "[a-z_][a-z0-9_]{0,12}",
            dims in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,4}", 0..4),
        ) {
            let mut name = base.clone();
            for (d, v) in &dims {
                name.push('.');
                name.push_str(d);
                name.push('@');
                name.push_str(v);
            }

            let (decoded_base, decoded_dims) = decode(&name).unwrap();
            prop_assert_eq!(decoded_base, base);
            prop_assert_eq!(decoded_dims.len(), dims.len());
            for (d, v) in &dims {
                prop_assert_eq!(decoded_dims.get(d), Some(v));
            }
        }
    }
}
