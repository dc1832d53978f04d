//! Core metric primitives shared across the hostex exporter.
//!
//! This crate is deliberately small and synchronous: it defines what a
//! metric *is* (descriptor, kind, sample), what a raw collector value looks
//! like ([`Value`]), and how a dotted variable name addresses a raw value
//! ([`varname`]). Everything that moves data around lives in the `hostex`
//! crate itself.
#![deny(missing_docs)]

mod descriptor;
pub use self::descriptor::{build_fq_name, MetricDescriptor, Sample, UnknownValueKind, ValueKind};

mod value;
pub use self::value::Value;

pub mod varname;
