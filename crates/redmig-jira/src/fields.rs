//! Issue field payloads and custom field mapping.

use std::collections::BTreeMap;

use redmig_config::{FieldKind, FieldMapping};
use redmig_source::CustomFields;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

/// Field values of an issue, keyed by Jira field id.
///
/// Serializes as the `{"fields": {...}}` body of the create call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssueFields {
    fields: BTreeMap<String, Value>,
}

impl IssueFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field_id: impl Into<String>, value: Value) {
        self.fields.insert(field_id.into(), value);
    }

    #[must_use]
    pub fn get(&self, field_id: &str) -> Option<&Value> {
        self.fields.get(field_id)
    }

    /// Copy with a different description.
    #[must_use]
    pub fn with_description(&self, description: Value) -> Self {
        let mut copy = self.clone();
        copy.insert("description", description);
        copy
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A mapped value waiting for its field id.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedField {
    /// Jira field name.
    pub target: String,
    pub value: Value,
}

/// Apply field mappings to the custom fields of one issue.
///
/// The first source field with a usable value wins; otherwise the mapping's
/// default is used. A mapping with neither is skipped, or returned as `Err`
/// with the target name when it is required.
pub fn map_fields(
    mappings: &[FieldMapping],
    custom: &CustomFields,
) -> Result<Vec<MappedField>, String> {
    let mut out = Vec::new();
    for mapping in mappings {
        let from_source = mapping
            .source
            .iter()
            .filter_map(|name| custom.get(name))
            .find_map(|text| field_value(mapping.kind, text));
        let value = from_source.or_else(|| {
            mapping
                .default
                .as_deref()
                .and_then(|text| field_value(mapping.kind, text))
        });
        match value {
            Some(value) => out.push(MappedField {
                target: mapping.target.clone(),
                value,
            }),
            None if mapping.required => return Err(mapping.target.clone()),
            None => {}
        }
    }
    Ok(out)
}

/// JSON value of `text` in the shape `kind` expects.
fn field_value(kind: FieldKind, text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match kind {
        FieldKind::Text => Some(Value::String(text.to_owned())),
        FieldKind::Option => Some(json!({ "value": text })),
        FieldKind::Names => Some(Value::Array(
            text.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| json!({ "name": name }))
                .collect(),
        )),
        FieldKind::Number => match text.parse::<f64>() {
            Ok(number) => serde_json::Number::from_f64(number).map(Value::Number),
            Err(_) => {
                warn!("Ignoring non-numeric value '{}'", text);
                None
            }
        },
    }
}

/// Field value from a configured transition field.
///
/// Valid JSON is sent as is; anything else as a string.
#[must_use]
pub fn literal_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn mapping(source: &[&str], target: &str, kind: FieldKind) -> FieldMapping {
        FieldMapping {
            source: source.iter().map(|s| (*s).to_owned()).collect(),
            target: target.to_owned(),
            kind,
            default: None,
            required: false,
        }
    }

    fn custom(json: &str) -> CustomFields {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_first_source_with_value_wins() {
        let mappings = vec![mapping(
            &["Customer Ticket", "CC Ticket"],
            "External Ticket",
            FieldKind::Text,
        )];
        let fields = custom(r#"{"Customer Ticket": "", "CC Ticket": "CC-17"}"#);
        assert_eq!(
            map_fields(&mappings, &fields).unwrap(),
            vec![MappedField {
                target: "External Ticket".to_owned(),
                value: json!("CC-17"),
            }]
        );
    }

    #[test]
    fn test_value_shapes() {
        let mappings = vec![
            mapping(&["Component"], "Components", FieldKind::Names),
            mapping(&["Env"], "Environment", FieldKind::Option),
            mapping(&["Points"], "Story Points", FieldKind::Number),
            mapping(&["Size"], "Size", FieldKind::Number),
        ];
        let fields = custom(
            r#"{"Component": "Storage, Cron", "Env": "prod", "Points": "3", "Size": "big"}"#,
        );
        let mapped = map_fields(&mappings, &fields).unwrap();
        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0].value, json!([{"name": "Storage"}, {"name": "Cron"}]));
        assert_eq!(mapped[1].value, json!({"value": "prod"}));
        assert_eq!(mapped[2].value, json!(3.0));
    }

    #[test]
    fn test_default_fill_and_required() {
        let mut with_default = mapping(&["Severity"], "Severity", FieldKind::Option);
        with_default.default = Some("Minor".to_owned());
        let mut required = mapping(&["Server"], "Server", FieldKind::Text);
        required.required = true;
        let fields = custom("{}");

        let mapped = map_fields(std::slice::from_ref(&with_default), &fields).unwrap();
        assert_eq!(mapped[0].value, json!({"value": "Minor"}));

        assert_eq!(
            map_fields(&[with_default, required], &fields),
            Err("Server".to_owned())
        );
    }

    #[test]
    fn test_issue_fields_payload() {
        let mut fields = IssueFields::new();
        fields.insert("summary", json!("Crash"));
        fields.insert("customfield_10050", json!("42"));
        let replaced = fields.with_description(json!({"type": "doc"}));
        assert_eq!(fields.get("description"), None);
        assert_eq!(
            serde_json::to_value(&replaced).unwrap(),
            json!({"fields": {
                "customfield_10050": "42",
                "description": {"type": "doc"},
                "summary": "Crash"
            }})
        );
    }

    #[test]
    fn test_literal_value() {
        assert_eq!(literal_value(r#"{"name": "Done"}"#), json!({"name": "Done"}));
        assert_eq!(literal_value("Fixed in 2.1"), json!("Fixed in 2.1"));
    }
}
