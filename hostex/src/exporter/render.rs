//! Rendering scraped samples in the Prometheus text exposition format.
//!
//! Samples arrive in channel order, possibly interleaved across collectors,
//! and the exposition format requires every line of a family to sit under a
//! single `# HELP`/`# TYPE` header. Rendering therefore groups samples by
//! descriptor in first-seen order before writing anything out.

use std::sync::Arc;

use hostex_core::{MetricDescriptor, Sample};
use indexmap::IndexMap;

/// Renders one scrape's samples into the text exposition format.
pub fn render(samples: &[Sample]) -> String {
    let mut families: IndexMap<&str, (&Arc<MetricDescriptor>, &Sample, Vec<&Sample>)> =
        IndexMap::new();
    for sample in samples {
        families
            .entry(sample.descriptor.name())
            .or_insert_with(|| (&sample.descriptor, sample, Vec::new()))
            .2
            .push(sample);
    }

    let mut buffer = String::new();
    for (name, (descriptor, first, group)) in &families {
        buffer.push_str("# HELP ");
        buffer.push_str(name);
        buffer.push(' ');
        buffer.push_str(&escape(descriptor.help(), false));
        buffer.push('\n');

        buffer.push_str("# TYPE ");
        buffer.push_str(name);
        buffer.push(' ');
        buffer.push_str(first.kind.as_str());
        buffer.push('\n');

        for sample in group {
            write_sample_line(&mut buffer, sample);
        }
    }
    buffer
}

fn write_sample_line(buffer: &mut String, sample: &Sample) {
    buffer.push_str(sample.descriptor.name());

    let names = sample.descriptor.label_names();
    if !names.is_empty() {
        buffer.push('{');
        for (i, (name, value)) in names.iter().zip(&sample.label_values).enumerate() {
            if i > 0 {
                buffer.push(',');
            }
            buffer.push_str(name);
            buffer.push_str("=\"");
            buffer.push_str(&escape(value, true));
            buffer.push('"');
        }
        buffer.push('}');
    }

    buffer.push(' ');
    write_value(buffer, sample.value);
    buffer.push('\n');
}

fn write_value(buffer: &mut String, value: f64) {
    if value.is_nan() {
        buffer.push_str("NaN");
    } else if value == f64::INFINITY {
        buffer.push_str("+Inf");
    } else if value == f64::NEG_INFINITY {
        buffer.push_str("-Inf");
    } else {
        buffer.push_str(&value.to_string());
    }
}

/// Escapes backslashes and newlines; double quotes too when `in_label` (help
/// text lives outside quotes and keeps its quotes literal).
fn escape(raw: &str, in_label: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' if in_label => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hostex_core::{MetricDescriptor, Sample, ValueKind};

    use super::render;

    fn descriptor(name: &str, help: &str, labels: &[&str]) -> Arc<MetricDescriptor> {
        Arc::new(MetricDescriptor::new(
            name.to_string(),
            help,
            labels.iter().map(|l| l.to_string()).collect(),
        ))
    }

    #[test]
    fn groups_interleaved_samples_by_family_in_first_seen_order() {
        let a = descriptor("hostex_cpu_usage_ratio", "CPU usage.", &["core"]);
        let b = descriptor("hostex_cpu_count", "Core count.", &[]);
        let samples = vec![
            Sample::new(a.clone(), ValueKind::Gauge, 0.5, vec!["0".to_string()]),
            Sample::new(b.clone(), ValueKind::Gauge, 2.0, Vec::new()),
            Sample::new(a.clone(), ValueKind::Gauge, 0.25, vec!["1".to_string()]),
        ];

        let text = render(&samples);
        let expected = "\
# HELP hostex_cpu_usage_ratio CPU usage.
# TYPE hostex_cpu_usage_ratio gauge
hostex_cpu_usage_ratio{core=\"0\"} 0.5
hostex_cpu_usage_ratio{core=\"1\"} 0.25
# HELP hostex_cpu_count Core count.
# TYPE hostex_cpu_count gauge
hostex_cpu_count 2
";
        assert_eq!(text, expected);
    }

    #[test]
    fn escapes_label_values_and_help_text() {
        let desc = descriptor("hostex_test_metric", "line one\nline two \\ end", &["path"]);
        let samples =
            vec![Sample::new(desc, ValueKind::Counter, 1.0, vec!["C:\\tmp \"x\"".to_string()])];

        let text = render(&samples);
        assert!(text.contains("# HELP hostex_test_metric line one\\nline two \\\\ end\n"));
        assert!(text.contains("path=\"C:\\\\tmp \\\"x\\\"\""));
    }

    #[test]
    fn non_finite_values_use_prometheus_spellings() {
        let desc = descriptor("hostex_test_metric", "Help.", &[]);
        let samples = vec![
            Sample::new(desc.clone(), ValueKind::Gauge, f64::INFINITY, Vec::new()),
            Sample::new(desc.clone(), ValueKind::Gauge, f64::NEG_INFINITY, Vec::new()),
            Sample::new(desc, ValueKind::Gauge, f64::NAN, Vec::new()),
        ];

        let text = render(&samples);
        assert!(text.contains(" +Inf\n"));
        assert!(text.contains(" -Inf\n"));
        assert!(text.contains(" NaN\n"));
    }

    #[test]
    fn empty_scrape_renders_empty_body() {
        assert_eq!(render(&[]), "");
    }
}
