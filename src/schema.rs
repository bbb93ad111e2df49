//! Structural validation of the published document.
//!
//! Supports the subset of JSON Schema the document contract needs: `type`
//! (one name or a list), `required`, `properties`, `additionalProperties`
//! (boolean), `items`, `minItems`, `maxItems`, `minLength` and `pattern`.
//! Other keywords (`$schema`, `title`, ...) are accepted and ignored.
//!
//! A schema is compiled once into a [`Schema`] tree; validation walks the
//! document and collects every violation instead of stopping at the first one.

use crate::error::{SchemaError, ValidationError, Violation};
use crate::models::FormattedDocument;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, instrument};

/// Schema for the canonical document, compiled into the binary.
pub const BUILTIN_SCHEMA: &str = include_str!("../schema/substitution.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "object" => JsonType::Object,
            "array" => JsonType::Array,
            "string" => JsonType::String,
            "integer" => JsonType::Integer,
            "number" => JsonType::Number,
            "boolean" => JsonType::Boolean,
            "null" => JsonType::Null,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::String => "string",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (JsonType::Object, Value::Object(_)) => true,
            (JsonType::Array, Value::Array(_)) => true,
            (JsonType::String, Value::String(_)) => true,
            (JsonType::Number, Value::Number(_)) => true,
            (JsonType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (JsonType::Boolean, Value::Bool(_)) => true,
            (JsonType::Null, Value::Null) => true,
            _ => false,
        }
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

#[derive(Debug, Default)]
struct Node {
    types: Option<Vec<JsonType>>,
    required: Vec<String>,
    properties: BTreeMap<String, Node>,
    additional_properties: bool,
    items: Option<Box<Node>>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    min_length: Option<usize>,
    pattern: Option<Regex>,
}

/// A compiled schema.
#[derive(Debug)]
pub struct Schema {
    root: Node,
}

impl Schema {
    /// The schema compiled into the binary.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::parse(BUILTIN_SCHEMA)
    }

    /// Load and compile a schema file.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// `path` if given, the built-in schema otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, SchemaError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        Ok(Self {
            root: compile(value, "")?,
        })
    }

    /// Every violation of `value` against this schema, in document order.
    pub fn violations(&self, value: &Value) -> Vec<Violation> {
        let mut out = Vec::new();
        self.root.check(value, "", &mut out);
        out
    }

    /// Check an arbitrary JSON value.
    pub fn validate_value(&self, value: &Value) -> Result<(), ValidationError> {
        let violations = self.violations(value);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

/// Validate the canonical document against `schema`, logging each violation.
#[instrument(level = "info", skip_all, fields(course = %document.course))]
pub fn validate(document: &FormattedDocument, schema: &Schema) -> Result<(), ValidationError> {
    let value = match serde_json::to_value(document) {
        Ok(value) => value,
        Err(e) => {
            return Err(ValidationError {
                violations: vec![Violation {
                    path: String::new(),
                    constraint: "serialize",
                    message: e.to_string(),
                }],
            });
        }
    };

    match schema.validate_value(&value) {
        Ok(()) => {
            info!("Document is valid");
            Ok(())
        }
        Err(err) => {
            for v in &err.violations {
                error!(path = %v.path, constraint = v.constraint, message = %v.message, "Schema violation");
            }
            Err(err)
        }
    }
}

fn invalid(path: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::Invalid {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        message: message.into(),
    }
}

fn compile(value: &Value, path: &str) -> Result<Node, SchemaError> {
    let obj = match value {
        Value::Bool(true) => {
            return Ok(Node {
                additional_properties: true,
                ..Node::default()
            });
        }
        Value::Object(obj) => obj,
        other => return Err(invalid(path, format!("expected a schema object, found {}", type_of(other)))),
    };

    let mut node = Node {
        additional_properties: true,
        ..Node::default()
    };

    if let Some(t) = obj.get("type") {
        node.types = Some(compile_types(t, path)?);
    }

    if let Some(req) = obj.get("required") {
        let list = req
            .as_array()
            .ok_or_else(|| invalid(path, "`required` must be an array"))?;
        for name in list {
            let name = name
                .as_str()
                .ok_or_else(|| invalid(path, "`required` entries must be strings"))?;
            node.required.push(name.to_string());
        }
    }

    if let Some(props) = obj.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| invalid(path, "`properties` must be an object"))?;
        for (name, sub) in props {
            let sub_path = format!("{path}/properties/{}", escape(name));
            node.properties.insert(name.clone(), compile(sub, &sub_path)?);
        }
    }

    if let Some(additional) = obj.get("additionalProperties") {
        node.additional_properties = additional
            .as_bool()
            .ok_or_else(|| invalid(path, "only boolean `additionalProperties` is supported"))?;
    }

    if let Some(items) = obj.get("items") {
        node.items = Some(Box::new(compile(items, &format!("{path}/items"))?));
    }

    node.min_items = count(obj, "minItems", path)?;
    node.max_items = count(obj, "maxItems", path)?;
    node.min_length = count(obj, "minLength", path)?;

    if let Some(pattern) = obj.get("pattern") {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| invalid(path, "`pattern` must be a string"))?;
        let regex = Regex::new(pattern).map_err(|e| invalid(path, format!("bad pattern: {e}")))?;
        node.pattern = Some(regex);
    }

    Ok(node)
}

fn compile_types(value: &Value, path: &str) -> Result<Vec<JsonType>, SchemaError> {
    let names: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(list) => list
            .iter()
            .map(|v| v.as_str().ok_or_else(|| invalid(path, "`type` entries must be strings")))
            .collect::<Result<_, _>>()?,
        _ => return Err(invalid(path, "`type` must be a string or an array")),
    };
    names
        .into_iter()
        .map(|n| JsonType::parse(n).ok_or_else(|| invalid(path, format!("unknown type {n:?}"))))
        .collect()
}

fn count(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<usize>, SchemaError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| invalid(path, format!("`{key}` must be a non-negative integer"))),
    }
}

/// JSON-pointer escaping of one path segment.
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

impl Node {
    fn check(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        if let Some(types) = &self.types {
            if !types.iter().any(|t| t.matches(value)) {
                let expected = types.iter().map(|t| t.name()).collect::<Vec<_>>().join(" or ");
                out.push(Violation {
                    path: path.to_string(),
                    constraint: "type",
                    message: format!("expected {expected}, found {}", type_of(value)),
                });
                return;
            }
        }

        match value {
            Value::Object(map) => self.check_object(map, path, out),
            Value::Array(items) => self.check_array(items, path, out),
            Value::String(s) => self.check_string(s, path, out),
            _ => {}
        }
    }

    fn check_object(&self, map: &Map<String, Value>, path: &str, out: &mut Vec<Violation>) {
        for name in &self.required {
            if !map.contains_key(name) {
                out.push(Violation {
                    path: format!("{path}/{}", escape(name)),
                    constraint: "required",
                    message: format!("missing required property {name:?}"),
                });
            }
        }

        for (name, child) in map {
            let child_path = format!("{path}/{}", escape(name));
            match self.properties.get(name) {
                Some(node) => node.check(child, &child_path, out),
                None if !self.additional_properties => out.push(Violation {
                    path: child_path,
                    constraint: "additionalProperties",
                    message: format!("unexpected property {name:?}"),
                }),
                None => {}
            }
        }
    }

    fn check_array(&self, items: &[Value], path: &str, out: &mut Vec<Violation>) {
        if let Some(min) = self.min_items {
            if items.len() < min {
                out.push(Violation {
                    path: path.to_string(),
                    constraint: "minItems",
                    message: format!("expected at least {min} items, found {}", items.len()),
                });
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                out.push(Violation {
                    path: path.to_string(),
                    constraint: "maxItems",
                    message: format!("expected at most {max} items, found {}", items.len()),
                });
            }
        }
        if let Some(node) = &self.items {
            for (i, item) in items.iter().enumerate() {
                node.check(item, &format!("{path}/{i}"), out);
            }
        }
    }

    fn check_string(&self, s: &str, path: &str, out: &mut Vec<Violation>) {
        if let Some(min) = self.min_length {
            let len = s.chars().count();
            if len < min {
                out.push(Violation {
                    path: path.to_string(),
                    constraint: "minLength",
                    message: format!("expected at least {min} characters, found {len}"),
                });
            }
        }
        if let Some(re) = &self.pattern {
            if !re.is_match(s) {
                out.push(Violation {
                    path: path.to_string(),
                    constraint: "pattern",
                    message: format!("{s:?} does not match {:?}", re.as_str()),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentItem, SubstitutionEntry, WeekDay};
    use serde_json::json;

    fn document() -> FormattedDocument {
        FormattedDocument {
            created_at: "2024-09-02T07:30:00.000000".to_string(),
            course: "MSS12".to_string(),
            substitution: vec![SubstitutionEntry {
                id: "1".to_string(),
                date: "02.09.2024".to_string(),
                week_day: WeekDay::from_name("Montag"),
                content: vec![ContentItem {
                    position: "3".to_string(),
                    teacher: "Mül".to_string(),
                    subject: "M".to_string(),
                    room: "204".to_string(),
                    topic: String::new(),
                    info: "Raumänderung".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn test_builtin_schema_compiles() {
        assert!(Schema::builtin().is_ok());
    }

    #[test]
    fn test_valid_document_passes() {
        let schema = Schema::builtin().unwrap();
        assert!(validate(&document(), &schema).is_ok());
    }

    #[test]
    fn test_empty_substitution_list_is_valid() {
        let schema = Schema::builtin().unwrap();
        let mut doc = document();
        doc.substitution.clear();
        assert!(validate(&doc, &schema).is_ok());
    }

    #[test]
    fn test_missing_date_is_reported_with_path() {
        let schema = Schema::builtin().unwrap();
        let mut value = serde_json::to_value(document()).unwrap();
        value["substitution"][0].as_object_mut().unwrap().remove("date");

        let err = schema.validate_value(&value).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].path, "/substitution/0/date");
        assert_eq!(err.violations[0].constraint, "required");
        assert!(err.violations[0].message.contains("date"));
    }

    #[test]
    fn test_collects_all_violations() {
        let schema = Schema::builtin().unwrap();
        let value = json!({
            "createdAt": "",
            "class": 12,
            "substitution": [
                {"id": "0", "date": "x", "weekDay": ["1"], "content": [], "extra": true}
            ]
        });
        let err = schema.validate_value(&value).unwrap_err();
        let found: Vec<_> = err
            .violations
            .iter()
            .map(|v| (v.path.as_str(), v.constraint))
            .collect();

        assert!(found.contains(&("/createdAt", "minLength")));
        assert!(found.contains(&("/class", "type")));
        assert!(found.contains(&("/substitution/0/id", "pattern")));
        assert!(found.contains(&("/substitution/0/weekDay", "minItems")));
        assert!(found.contains(&("/substitution/0/extra", "additionalProperties")));
    }

    #[test]
    fn test_type_list_and_integer() {
        let schema = Schema::from_value(&json!({"type": ["integer", "null"]})).unwrap();
        assert!(schema.validate_value(&json!(3)).is_ok());
        assert!(schema.validate_value(&json!(null)).is_ok());
        let err = schema.validate_value(&json!(3.5)).unwrap_err();
        assert_eq!(err.violations[0].message, "expected integer or null, found number");
    }

    #[test]
    fn test_unknown_keywords_are_ignored() {
        let schema = Schema::from_value(&json!({"title": "x", "format": "date"})).unwrap();
        assert!(schema.validate_value(&json!("anything")).is_ok());
    }

    #[test]
    fn test_invalid_schemas_are_rejected() {
        assert!(matches!(
            Schema::from_value(&json!({"type": "text"})),
            Err(SchemaError::Invalid { .. })
        ));
        assert!(matches!(
            Schema::from_value(&json!({"properties": {"a": {"pattern": "("}}})),
            Err(SchemaError::Invalid { .. })
        ));
        assert!(matches!(Schema::parse("{"), Err(SchemaError::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, r#"{"type": "object", "required": ["class"]}"#).unwrap();

        let schema = Schema::load(Some(&path)).unwrap();
        assert!(validate(&document(), &schema).is_ok());

        let missing = Schema::load(Some(&dir.path().join("nope.json")));
        assert!(matches!(missing, Err(SchemaError::Io { .. })));
    }
}
