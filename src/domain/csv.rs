// CSV rendering of a channel's buffered window
use chrono::SecondsFormat;

use super::telemetry::SnapshotPoint;

/// `Time,<raw label>,Processed` header followed by one row per window entry.
/// Missing values are written as empty fields.
pub fn format_csv(raw_label: &str, points: &[SnapshotPoint]) -> String {
    let mut out = format!("Time,{},Processed\n", raw_label);
    for point in points {
        out.push_str(&format!(
            "{},{},{}\n",
            point.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            format_value(point.raw),
            format_value(point.processed),
        ));
    }
    out
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
