//! Temporal filter synthesis.
//!
//! Turns a time specification (a discrete timestamp, a comma-separated
//! list of timestamps, or a list of `start/end` ranges) into a backend
//! filter expression built on `date_trunc`, and installs it on the layer.

use lazy_static::lazy_static;
use pylayer_common::layer::{Expression, Layer};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeResolution {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl TimeResolution {
    fn keyword(self) -> &'static str {
        match self {
            TimeResolution::Second => "second",
            TimeResolution::Minute => "minute",
            TimeResolution::Hour => "hour",
            TimeResolution::Day => "day",
            TimeResolution::Month => "month",
            TimeResolution::Year => "year",
        }
    }
}

lazy_static! {
    static ref YEAR: Regex = Regex::new(r"^\d{4}$").unwrap();
    static ref MONTH: Regex = Regex::new(r"^\d{4}-\d{1,2}$").unwrap();
    static ref DAY: Regex = Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap();
    static ref HOUR: Regex = Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}[T ]\d{1,2}$").unwrap();
    static ref MINUTE: Regex =
        Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}[T ]\d{1,2}:\d{1,2}$").unwrap();
    static ref SECOND: Regex =
        Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}[T ]\d{1,2}:\d{1,2}:\d{1,2}(\.\d+)?$").unwrap();
}

/// Classify a timestamp's resolution from its textual shape.
fn resolution(timestamp: &str) -> Option<TimeResolution> {
    if YEAR.is_match(timestamp) {
        Some(TimeResolution::Year)
    } else if MONTH.is_match(timestamp) {
        Some(TimeResolution::Month)
    } else if DAY.is_match(timestamp) {
        Some(TimeResolution::Day)
    } else if HOUR.is_match(timestamp) {
        Some(TimeResolution::Hour)
    } else if MINUTE.is_match(timestamp) {
        Some(TimeResolution::Minute)
    } else if SECOND.is_match(timestamp) {
        Some(TimeResolution::Second)
    } else {
        None
    }
}

/// Pad a partial timestamp so `date_trunc` accepts it: `2004` becomes
/// `2004-01-01`, `2004-01-01 15` becomes `2004-01-01 15:00:00`.
fn complete(timestamp: &str, resolution: TimeResolution) -> String {
    let mut completed = timestamp.to_string();
    match resolution {
        TimeResolution::Year => {
            if completed.ends_with('-') {
                completed.push_str("01-01");
            } else {
                completed.push_str("-01-01");
            }
        }
        TimeResolution::Month => {
            if completed.ends_with('-') {
                completed.push_str("01");
            } else {
                completed.push_str("-01");
            }
        }
        TimeResolution::Hour => {
            if completed.ends_with(':') {
                completed.push_str("00:00");
            } else {
                completed.push_str(":00:00");
            }
        }
        TimeResolution::Minute => {
            if completed.ends_with(':') {
                completed.push_str("00");
            } else {
                completed.push_str(":00");
            }
        }
        TimeResolution::Day | TimeResolution::Second => {}
    }
    completed
}

fn truncated(resolution: TimeResolution, field: &str) -> String {
    format!("date_trunc('{}', {})", resolution.keyword(), field)
}

/// Synthesize a temporal filter expression and install it on the layer.
///
/// Returns false, leaving the layer untouched, when the specification
/// cannot be interpreted. An existing expression-typed filter is preserved
/// by prefixing `(<old>) and ` onto the synthesized expression.
pub fn apply_time_filter(layer: &mut Layer, timestring: &str, timefield: &str) -> bool {
    if timestring.is_empty() || timefield.is_empty() {
        return false;
    }

    let discrete = !timestring.contains(',') && !timestring.contains('/');
    let probe = if discrete {
        timestring.trim().to_string()
    } else {
        let Some(first) = timestring.split(',').map(str::trim).find(|s| !s.is_empty()) else {
            return false;
        };
        let tokens: Vec<&str> = first.split('/').collect();
        match tokens.len() {
            2 => tokens[0].trim().to_string(),
            1 => first.to_string(),
            _ => return false,
        }
    };
    let Some(resolution) = resolution(&probe) else {
        return false;
    };

    let prefix = match &layer.filter {
        Some(filter) if filter.is_expression => format!("({}) and ", filter.text),
        _ => String::new(),
    };

    let body = if discrete {
        format!(
            "({} = '{}')",
            truncated(resolution, timefield),
            complete(timestring.trim(), resolution)
        )
    } else {
        let entries: Vec<&str> = timestring
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();
        if entries.is_empty() {
            return false;
        }
        let ranged = entries[0].split('/').count() == 2;
        let terms: Vec<String> = if ranged {
            entries
                .iter()
                .filter_map(|entry| {
                    let tokens: Vec<&str> = entry.split('/').collect();
                    if tokens.len() != 2 {
                        return None;
                    }
                    Some(format!(
                        "({} >= '{}' AND {} <= '{}')",
                        truncated(resolution, timefield),
                        complete(tokens[0].trim(), resolution),
                        truncated(resolution, timefield),
                        complete(tokens[1].trim(), resolution)
                    ))
                })
                .collect()
        } else {
            entries
                .iter()
                .map(|entry| {
                    format!(
                        "({} = '{}')",
                        truncated(resolution, timefield),
                        complete(entry, resolution)
                    )
                })
                .collect()
        };
        if terms.is_empty() {
            return false;
        }
        format!("({})", terms.join(" OR "))
    };

    layer.filter_item = Some(timefield.to_string());
    layer.filter = Some(Expression::expression(format!("{prefix}{body}")));
    true
}

#[cfg(test)]
mod tests {
    use pylayer_common::layer::LayerType;

    use super::*;

    fn layer() -> Layer {
        Layer::new("events", LayerType::Point)
    }

    fn installed(layer: &Layer) -> &str {
        layer.filter.as_ref().map(|f| f.text.as_str()).unwrap_or("")
    }

    #[test]
    fn discrete_day() {
        let mut layer = layer();
        assert!(apply_time_filter(&mut layer, "2004-08-06", "ts"));
        assert_eq!(installed(&layer), "(date_trunc('day', ts) = '2004-08-06')");
        assert_eq!(layer.filter_item.as_deref(), Some("ts"));
    }

    #[test]
    fn partial_timestamps_are_completed() {
        let mut layer = layer();
        assert!(apply_time_filter(&mut layer, "2004", "ts"));
        assert_eq!(installed(&layer), "(date_trunc('year', ts) = '2004-01-01')");

        let mut layer = self::layer();
        assert!(apply_time_filter(&mut layer, "2004-08", "ts"));
        assert_eq!(installed(&layer), "(date_trunc('month', ts) = '2004-08-01')");

        let mut layer = self::layer();
        assert!(apply_time_filter(&mut layer, "2004-08-06 15", "ts"));
        assert_eq!(
            installed(&layer),
            "(date_trunc('hour', ts) = '2004-08-06 15:00:00')"
        );

        let mut layer = self::layer();
        assert!(apply_time_filter(&mut layer, "2004-08-06 15:30", "ts"));
        assert_eq!(
            installed(&layer),
            "(date_trunc('minute', ts) = '2004-08-06 15:30:00')"
        );
    }

    #[test]
    fn range_specifications_become_bounded_terms() {
        let mut layer = layer();
        assert!(apply_time_filter(
            &mut layer,
            "2004-01-01/2004-02-01",
            "ts"
        ));
        assert_eq!(
            installed(&layer),
            "((date_trunc('day', ts) >= '2004-01-01' AND date_trunc('day', ts) <= '2004-02-01'))"
        );

        let mut layer = self::layer();
        assert!(apply_time_filter(
            &mut layer,
            "2004-01-01/2004-02-01,2004-03-01/2004-04-01",
            "ts"
        ));
        assert_eq!(
            installed(&layer),
            "((date_trunc('day', ts) >= '2004-01-01' AND date_trunc('day', ts) <= '2004-02-01') \
             OR (date_trunc('day', ts) >= '2004-03-01' AND date_trunc('day', ts) <= '2004-04-01'))"
        );
    }

    #[test]
    fn multiple_discrete_times_become_alternatives() {
        let mut layer = layer();
        assert!(apply_time_filter(&mut layer, "2004-01-01,2004-02-03", "ts"));
        assert_eq!(
            installed(&layer),
            "((date_trunc('day', ts) = '2004-01-01') OR (date_trunc('day', ts) = '2004-02-03'))"
        );
    }

    #[test]
    fn existing_expression_filter_is_preserved() {
        let mut layer = layer();
        layer.filter = Some(Expression::expression("status = 'open'"));
        assert!(apply_time_filter(&mut layer, "2004-08-06", "ts"));
        assert_eq!(
            installed(&layer),
            "(status = 'open') and (date_trunc('day', ts) = '2004-08-06')"
        );
    }

    #[test]
    fn string_filters_are_replaced_not_composed() {
        let mut layer = layer();
        layer.filter = Some(Expression::string_match("open"));
        assert!(apply_time_filter(&mut layer, "2004-08-06", "ts"));
        assert_eq!(installed(&layer), "(date_trunc('day', ts) = '2004-08-06')");
    }

    #[test]
    fn malformed_specifications_leave_the_layer_untouched() {
        let mut layer = layer();
        assert!(!apply_time_filter(&mut layer, "", "ts"));
        assert!(!apply_time_filter(&mut layer, "2004-08-06", ""));
        assert!(!apply_time_filter(&mut layer, "yesterday", "ts"));
        assert!(!apply_time_filter(&mut layer, "2004-01-01/2004-02-01/2004-03-01", "ts"));
        assert!(layer.filter.is_none());
        assert!(layer.filter_item.is_none());
    }
}
