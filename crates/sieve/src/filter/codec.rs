//! Pure conversions between form input, URL text and [`FilterValue`]s.
//!
//! Nothing here fails: malformed input degrades to "no filter" (`None`) or to
//! a blank range bound.

use chrono::NaiveDate;

use super::value::{FilterValue, FormPayload, RawInput};

/// Separator for list values and range bounds in URL text.
pub const SEPARATOR: char = ',';

const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Preprocessing: form payload / URL text -> RawInput
// ---------------------------------------------------------------------------

/// Single text value submitted under the field's own key.
pub fn text_from_form(field: &str, form: &FormPayload) -> RawInput {
    match form.get(field) {
        Some(v) => RawInput::Text(v.to_string()),
        None => RawInput::Missing,
    }
}

/// Every value submitted under `field` or `field[]`; comma-joined values are
/// split as well.
pub fn list_from_form(field: &str, form: &FormPayload) -> RawInput {
    let bracketed = format!("{field}[]");
    let mut values = form.get_all(field);
    values.extend(form.get_all(&bracketed));
    if values.is_empty() {
        return RawInput::Missing;
    }
    RawInput::List(values.iter().flat_map(|v| split_list(v)).collect())
}

/// Range bounds submitted as `{field}_{low}` / `{field}_{high}`, or as a
/// single `low,high` value under the field's own key.
pub fn range_from_form(
    field: &str,
    form: &FormPayload,
    low_suffix: &str,
    high_suffix: &str,
) -> RawInput {
    let low = form.get(&format!("{field}_{low_suffix}"));
    let high = form.get(&format!("{field}_{high_suffix}"));
    if low.is_none() && high.is_none() {
        return match form.get(field) {
            Some(joined) => range_from_url(joined),
            None => RawInput::Missing,
        };
    }
    RawInput::Range {
        low: low.unwrap_or_default().to_string(),
        high: high.unwrap_or_default().to_string(),
    }
}

pub fn text_from_url(text: &str) -> RawInput {
    RawInput::Text(text.to_string())
}

pub fn list_from_url(text: &str) -> RawInput {
    RawInput::List(split_list(text))
}

/// `"left,right"`; text without a separator is a lower bound only.
pub fn range_from_url(text: &str) -> RawInput {
    let (low, high) = text.split_once(SEPARATOR).unwrap_or((text, ""));
    RawInput::Range {
        low: low.to_string(),
        high: high.to_string(),
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Processing: RawInput -> FilterValue
// ---------------------------------------------------------------------------

fn first_text(raw: &RawInput) -> Option<&str> {
    let text = match raw {
        RawInput::Text(s) => s.as_str(),
        RawInput::List(items) => items.first()?.as_str(),
        RawInput::Missing | RawInput::Range { .. } => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then_some(text)
}

pub fn process_text(raw: &RawInput) -> Option<FilterValue> {
    first_text(raw).map(|s| FilterValue::Text(s.to_string()))
}

/// A single choice. When `allowed` is non-empty the choice must be one of them.
pub fn process_select(raw: &RawInput, allowed: &[String]) -> Option<FilterValue> {
    let choice = first_text(raw)?;
    if !allowed.is_empty() && !allowed.iter().any(|a| a == choice) {
        return None;
    }
    Some(FilterValue::SingleSelect(choice.to_string()))
}

/// Several choices, de-duplicated in submission order. Disallowed choices
/// are dropped individually.
pub fn process_multi_select(raw: &RawInput, allowed: &[String]) -> Option<FilterValue> {
    let items: Vec<String> = match raw {
        RawInput::List(items) => items.clone(),
        RawInput::Text(text) => split_list(text),
        RawInput::Missing | RawInput::Range { .. } => return None,
    };

    let mut chosen: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() || chosen.iter().any(|c| c == item) {
            continue;
        }
        if !allowed.is_empty() && !allowed.iter().any(|a| a == item) {
            continue;
        }
        chosen.push(item.to_string());
    }

    (!chosen.is_empty()).then_some(FilterValue::MultiSelect(chosen))
}

/// Lenient boolean parsing for form and URL text.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Tri-state boolean: blank, "any" or unparseable text means no filter.
pub fn process_boolean(raw: &RawInput) -> Option<FilterValue> {
    first_text(raw)
        .and_then(parse_bool)
        .map(|b| FilterValue::Boolean(Some(b)))
}

/// Checkbox: only a checked box filters; unchecked means no filter.
pub fn process_checkbox(raw: &RawInput) -> Option<FilterValue> {
    match first_text(raw).and_then(parse_bool) {
        Some(true) => Some(FilterValue::Boolean(Some(true))),
        _ => None,
    }
}

fn range_bounds(raw: &RawInput) -> Option<(&str, &str)> {
    match raw {
        RawInput::Range { low, high } => Some((low.trim(), high.trim())),
        _ => None,
    }
}

fn number_bound(text: &str) -> String {
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => text.to_string(),
        _ => String::new(),
    }
}

fn date_bound(text: &str) -> String {
    match NaiveDate::parse_from_str(text, DATE_FORMAT) {
        Ok(_) => text.to_string(),
        Err(_) => String::new(),
    }
}

/// Number range; a non-numeric bound is blanked, both blank means no filter.
pub fn process_number_range(raw: &RawInput) -> Option<FilterValue> {
    let (low, high) = range_bounds(raw)?;
    let (min, max) = (number_bound(low), number_bound(high));
    if min.is_empty() && max.is_empty() {
        return None;
    }
    Some(FilterValue::NumberRange { min, max })
}

/// Date range in `YYYY-MM-DD`; an invalid date is blanked.
pub fn process_date_range(raw: &RawInput) -> Option<FilterValue> {
    let (low, high) = range_bounds(raw)?;
    let (from, to) = (date_bound(low), date_bound(high));
    if from.is_empty() && to.is_empty() {
        return None;
    }
    Some(FilterValue::DateRange { from, to })
}

// ---------------------------------------------------------------------------
// Emptiness, validation, URL encoding
// ---------------------------------------------------------------------------

pub fn is_empty(value: &FilterValue) -> bool {
    match value {
        FilterValue::Text(s) | FilterValue::SingleSelect(s) => s.trim().is_empty(),
        FilterValue::MultiSelect(items) => items.iter().all(|s| s.trim().is_empty()),
        FilterValue::Boolean(b) => b.is_none(),
        FilterValue::DateRange { from: a, to: b } | FilterValue::NumberRange { min: a, max: b } => {
            a.trim().is_empty() && b.trim().is_empty()
        }
    }
}

/// Sanity check before a value is turned into a predicate.
pub fn validate(value: &FilterValue) -> bool {
    if is_empty(value) {
        return false;
    }
    match value {
        FilterValue::NumberRange { min, max } => {
            match (min.parse::<f64>().ok(), max.parse::<f64>().ok()) {
                (Some(lo), Some(hi)) => lo <= hi,
                (None, None) => false,
                _ => true,
            }
        }
        FilterValue::DateRange { from, to } => {
            let lo = NaiveDate::parse_from_str(from, DATE_FORMAT).ok();
            let hi = NaiveDate::parse_from_str(to, DATE_FORMAT).ok();
            match (lo, hi) {
                (Some(lo), Some(hi)) => lo <= hi,
                (None, None) => false,
                _ => true,
            }
        }
        _ => true,
    }
}

/// URL text for a value; `None` for an empty value.
pub fn encode(value: &FilterValue) -> Option<String> {
    if is_empty(value) {
        return None;
    }
    Some(match value {
        FilterValue::Text(s) | FilterValue::SingleSelect(s) => s.clone(),
        FilterValue::MultiSelect(items) => items.join(&SEPARATOR.to_string()),
        FilterValue::Boolean(b) => b.unwrap_or_default().to_string(),
        FilterValue::DateRange { from: a, to: b } | FilterValue::NumberRange { min: a, max: b } => {
            format!("{a}{SEPARATOR}{b}")
        }
    })
}
