//! Title Templater: renders a playlist title from a template and an instant.
//!
//! Placeholders: `{name}`, `{date}`, `{day}`, `{week_start}`, `{month}`.
//! Unknown placeholders are copied through untouched so templates written for
//! newer placeholders keep rendering. Substituted text is never re-scanned.

use chrono::{DateTime, Datelike, Duration, Utc};

pub const DEFAULT_TEMPLATE: &str = "{name} - {date}";

/// Renders `template` for `script_name` at `as_of`. An absent or blank
/// template falls back to [`DEFAULT_TEMPLATE`].
pub fn render_title(template: Option<&str>, script_name: &str, as_of: DateTime<Utc>) -> String {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_TEMPLATE);

    let mut out = String::with_capacity(template.len() + script_name.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];

        match after.find('}') {
            Some(close) => {
                let key = &after[1..close];
                match expand(key, script_name, as_of) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&after[..=close]),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand(key: &str, script_name: &str, as_of: DateTime<Utc>) -> Option<String> {
    let value = match key {
        "name" => script_name.to_string(),
        "date" => as_of.format("%Y-%m-%d").to_string(),
        "day" => as_of.format("%A").to_string(),
        "week_start" => week_start(as_of).format("%Y-%m-%d").to_string(),
        "month" => as_of.format("%B %Y").to_string(),
        _ => return None,
    };
    Some(value)
}

/// Monday of the ISO week containing `as_of`.
fn week_start(as_of: DateTime<Utc>) -> chrono::NaiveDate {
    let date = as_of.date_naive();
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}
