use harvest_core::error::Result;
use harvest_core::record::FieldMap;
use serde_json::Value;
use url::Url;

use crate::parsed::ParsedContent;

/// A capability to recognise one kind of page and pull structured data out
/// of it.
///
/// Extractors are synchronous: they work on an already parsed document and
/// must never perform I/O.
pub trait Extractor: Send + Sync + 'static {
    /// Unique name, used for `--extractor` and in output records
    fn name(&self) -> &str;

    /// Field names every record from this extractor carries. Fields the
    /// extractor cannot determine are filled with the unknown marker.
    fn fields(&self) -> &[&'static str];

    /// Cheap check whether this extractor understands the page
    fn can_extract(&self, content: &ParsedContent, url: &Url) -> bool;

    /// Extract fields from the page
    fn extract(&self, content: &ParsedContent, url: &Url) -> Result<FieldMap>;
}

/// Insert a field only when it has a value.
///
/// Empty strings, empty arrays and empty objects count as no value.
pub(crate) fn put(fields: &mut FieldMap, name: &str, value: impl Into<Value>) {
    let value = value.into();
    let empty = match &value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if !empty {
        fields.insert(name.to_string(), value);
    }
}

/// Insert a field unless an earlier source already provided it
pub(crate) fn put_missing(fields: &mut FieldMap, name: &str, value: impl Into<Value>) {
    if !fields.contains_key(name) {
        put(fields, name, value);
    }
}

/// A JSON-LD value as text, accepting strings and numbers
pub(crate) fn ld_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The `name` of a JSON-LD value that may be a plain string or an object
pub(crate) fn ld_name(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(map) => ld_text(map.get("name")),
        other => ld_text(Some(other)),
    }
}

/// A JSON-LD value that may be a single item or a list, as a list
pub(crate) fn ld_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

/// The URL of a JSON-LD image, which may be a string or an `ImageObject`
pub(crate) fn ld_image(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ld_text(map.get("url")),
        _ => None,
    }
}
