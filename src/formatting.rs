//! Rendering of StatsD protocol lines.
use std::fmt::Write;

use metrics::Key;

// <PREFIX>.<METRIC_NAME>.<SUFFIX>:<VALUE>|<TYPE>
//
// The type is omitted for plain statistic lines, which most aggregators read as gauges.

/// Builds a registry name for a [`metrics`] key, folding its labels into the name as
/// `<name>.<label key>_<label value>` segments since plain StatsD has no tags.
pub fn key_to_name(key: &Key) -> String {
    let mut name = sanitize_metric_name(key.name());
    for label in key.labels() {
        name.push('.');
        name.push_str(&sanitize_metric_suffix(label.key()));
        name.push('_');
        name.push_str(&sanitize_metric_suffix(label.value()));
    }
    name
}

/// Replaces every character that would break the line protocol with an underscore.
///
/// Dots are kept, since they are the namespace separator aggregators understand.
pub fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| if invalid_metric_name_character(c) { '_' } else { c })
        .collect()
}

/// Like [`sanitize_metric_name`], but also replaces dots so the result stays a single
/// segment.
pub fn sanitize_metric_suffix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if invalid_metric_name_character(c) || c == '.' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Returns the suffix under which quantile `q` is reported.
///
/// The quantile is written as a percentage with its decimal point dropped:
/// `0.5` becomes `50-percentile`, `0.99` becomes `99-percentile` and `0.999` becomes
/// `999-percentile`. Digits are taken from the shortest decimal form of `q`, so no
/// rounding error from multiplying by 100 can leak into the name.
pub fn percentile_suffix(q: f64) -> String {
    let repr = q.to_string();
    let mut digits = repr
        .split_once('.')
        .map(|(_, fraction)| fraction.to_owned())
        .unwrap_or_default();
    while digits.len() < 2 {
        digits.push('0');
    }

    let (whole, fraction) = digits.split_at(2);
    let whole = whole.trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };
    format!("{whole}{fraction}-percentile")
}

/// Appends one line to `buffer`.
///
/// An empty prefix is treated like no prefix at all. `mtype` is appended after a pipe when
/// present.
pub fn write_metric_line<T>(
    buffer: &mut String,
    prefix: Option<&str>,
    name: &str,
    suffix: Option<&str>,
    value: T,
    mtype: Option<&str>,
) where
    T: std::fmt::Display,
{
    if let Some(pref) = prefix.filter(|p| !p.is_empty()) {
        buffer.push_str(pref);
        buffer.push('.');
    }
    buffer.push_str(name);

    if let Some(suf) = suffix {
        buffer.push('.');
        buffer.push_str(suf);
    }

    buffer.push(':');
    // Writing into a `String` cannot fail.
    let _ = write!(buffer, "{value}");

    if let Some(mtype) = mtype {
        buffer.push('|');
        buffer.push_str(mtype);
    }
    buffer.push('\n');
}

#[inline]
fn invalid_metric_name_character(c: char) -> bool {
    matches!(c, ':' | '|' | '@' | '#') || c.is_whitespace() || c.is_control()
}

#[cfg(test)]
mod tests {
    use super::{
        key_to_name, percentile_suffix, sanitize_metric_name, sanitize_metric_suffix,
        write_metric_line,
    };
    use metrics::{Key, Label};

    fn parse(line: &str) -> (&str, f64, Option<&str>) {
        let (name, rest) = line.trim_end_matches('\n').split_once(':').unwrap();
        let mut parts = rest.split('|');
        let value = parts.next().unwrap().parse().unwrap();
        (name, value, parts.next())
    }

    #[test]
    fn test_write_line() {
        let mut buffer = String::new();
        write_metric_line(&mut buffer, Some("foobar"), "foo", Some("count"), 2, Some("c"));
        assert_eq!(buffer, "foobar.foo.count:2|c\n");

        let mut buffer = String::new();
        write_metric_line(&mut buffer, None, "foo", None, -3.25, Some("g"));
        assert_eq!(buffer, "foo:-3.25|g\n");

        let mut buffer = String::new();
        write_metric_line(&mut buffer, Some(""), "baz", Some("mean"), 3000.0, None);
        assert_eq!(buffer, "baz.mean:3000\n");
    }

    #[test]
    fn test_no_exponent() {
        let mut buffer = String::new();
        write_metric_line(&mut buffer, None, "tiny", None, 0.000_001, None);
        write_metric_line(&mut buffer, None, "huge", None, 1e21, None);
        assert_eq!(buffer, "tiny:0.000001\nhuge:1000000000000000000000\n");
    }

    #[test]
    fn test_line_round_trip() {
        let cases = [
            ("app.requests.count", 17.0, Some("c")),
            ("app.queue", -0.5, Some("g")),
            ("app.latency.99-percentile", 5000.0, None),
            ("app.latency.mean", 1234.5678, None),
        ];
        for (name, value, mtype) in cases {
            let mut buffer = String::new();
            write_metric_line(&mut buffer, None, name, None, value, mtype);
            assert_eq!(parse(&buffer), (name, value, mtype));
        }
    }

    #[test]
    fn test_percentile_suffix() {
        assert_eq!(percentile_suffix(0.5), "50-percentile");
        assert_eq!(percentile_suffix(0.75), "75-percentile");
        assert_eq!(percentile_suffix(0.95), "95-percentile");
        assert_eq!(percentile_suffix(0.99), "99-percentile");
        assert_eq!(percentile_suffix(0.999), "999-percentile");
        assert_eq!(percentile_suffix(0.05), "5-percentile");
        assert_eq!(percentile_suffix(0.001), "01-percentile");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_metric_name("http.req|uests:total"), "http.req_uests_total");
        assert_eq!(sanitize_metric_name("a b\n@c#"), "a_b__c_");
        assert_eq!(sanitize_metric_suffix("v1.2"), "v1_2");
    }

    #[test]
    fn test_key_to_name() {
        let key = Key::from_parts("http.requests", vec![Label::new("status", "2xx")]);
        assert_eq!(key_to_name(&key), "http.requests.status_2xx");
        assert_eq!(key_to_name(&Key::from_name("plain")), "plain");
    }
}
