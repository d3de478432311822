use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a remote record. The schema is not fixed: the same logical
/// column may appear under different names depending on the table or view,
/// so all access goes through [`FieldSpec`].
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

// ---------------------------------------------------------------------------
// Field fallback resolution
// ---------------------------------------------------------------------------

/// Declarative accessor for a field that may live under several names.
/// The preferred key wins; fallbacks are tried in order.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    preferred: &'static str,
    fallbacks: &'static [&'static str],
}

impl FieldSpec {
    pub const fn new(preferred: &'static str, fallbacks: &'static [&'static str]) -> Self {
        Self { preferred, fallbacks }
    }

    /// First key present in the map, preferred key first. Presence is key
    /// existence: the value may still be null, callers check for that.
    pub fn resolve<'a>(&self, fields: &'a Fields) -> Option<&'a Value> {
        if let Some(value) = fields.get(self.preferred) {
            return Some(value);
        }
        self.fallbacks.iter().find_map(|key| fields.get(*key))
    }
}

// ---------------------------------------------------------------------------
// Value normalization
// ---------------------------------------------------------------------------

/// Normalize an enumeration-like field value for comparison: single-select
/// objects contribute their `name`, lists recurse into their first element,
/// everything else is stringified, then trimmed and lowercased.
pub fn normalize_enum_text(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_lowercase(),
        Value::Object(map) => match map.get("name") {
            Some(Value::String(name)) => name.trim().to_lowercase(),
            _ => value.to_string().trim().to_lowercase(),
        },
        Value::Array(items) => match items.first() {
            Some(first) => normalize_enum_text(Some(first)),
            None => String::new(),
        },
        other => other.to_string().trim().to_lowercase(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Expand a category field into individual labels. Lists contribute each
/// non-blank element, plain strings count as one entry; every entry is then
/// split on commas. Blanks are dropped and the result is deduplicated while
/// preserving first-seen order.
pub fn extract_categories(value: Option<&Value>) -> Vec<String> {
    let entries: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(value_text)
            .filter(|text| !text.trim().is_empty())
            .collect(),
        Some(Value::String(text)) => vec![text.clone()],
        _ => return Vec::new(),
    };

    let mut results: Vec<String> = Vec::new();
    for entry in &entries {
        for part in entry.split(',') {
            let label = part.trim();
            if label.is_empty() || results.iter().any(|seen| seen == label) {
                continue;
            }
            results.push(label.to_string());
        }
    }
    results
}

/// Lenient numeric read: numbers pass through, strings are trimmed and
/// comma-stripped before parsing. Anything else is unparseable.
pub fn to_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            text.replace(',', "").parse().ok()
        }
        _ => None,
    }
}
