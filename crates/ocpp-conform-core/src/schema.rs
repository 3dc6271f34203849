//! Declarative message schemas and the validator that checks responses against them
//!
//! A [`Schema`] describes a closed JSON object: which fields exist, whether
//! they are required, their primitive type and any format constraints.
//! Validation compiles the schema's draft-04 document with `jsonschema` and
//! is total: every violated rule is reported in one pass.

use std::fmt;
use std::sync::{Arc, OnceLock};

use jsonschema::{draft4, error::ValidationErrorKind, Validator};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

/// Field name used for violations that apply to the value as a whole
pub const ROOT_FIELD: &str = "$";

const DRAFT_04: &str = "http://json-schema.org/draft-04/schema#";

// =============================================================================
// Schema definition
// =============================================================================

/// Format constraint for string fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    /// RFC 3339 / ISO-8601 timestamp (JSON Schema `date-time`)
    DateTime,
}

impl StringFormat {
    fn as_str(self) -> &'static str {
        match self {
            StringFormat::DateTime => "date-time",
        }
    }
}

/// Primitive type of a field plus its constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// JSON string, optionally length-limited and formatted
    String {
        max_length: Option<usize>,
        format: Option<StringFormat>,
    },
    /// JSON integer (a number without fractional representation)
    Integer,
    /// Any JSON number
    Number,
    /// JSON boolean
    Boolean,
    /// String restricted to an enumerated set
    Enum(Vec<String>),
}

impl FieldType {
    /// Unconstrained string
    pub fn string() -> Self {
        Self::String {
            max_length: None,
            format: None,
        }
    }

    /// String of at most `max_length` characters
    pub fn string_max(max_length: usize) -> Self {
        Self::String {
            max_length: Some(max_length),
            format: None,
        }
    }

    /// RFC 3339 timestamp string
    pub fn date_time() -> Self {
        Self::String {
            max_length: None,
            format: Some(StringFormat::DateTime),
        }
    }

    /// String enumeration
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// JSON type name a value of this field must have
    fn json_type(&self) -> &'static str {
        match self {
            FieldType::String { .. } | FieldType::Enum(_) => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            FieldType::String { max_length, format } => {
                let mut property = Map::new();
                property.insert("type".into(), json!("string"));
                if let Some(max) = max_length {
                    property.insert("maxLength".into(), json!(max));
                }
                if let Some(format) = format {
                    property.insert("format".into(), json!(format.as_str()));
                }
                Value::Object(property)
            }
            FieldType::Integer => json!({ "type": "integer" }),
            FieldType::Number => json!({ "type": "number" }),
            FieldType::Boolean => json!({ "type": "boolean" }),
            FieldType::Enum(values) => json!({ "type": "string", "enum": values }),
        }
    }
}

/// Validator compiled from a schema's document, shared between clones
#[derive(Clone, Default)]
struct Compiled(Arc<OnceLock<Result<Validator, String>>>);

impl Compiled {
    fn get_or_compile(&self, document: impl FnOnce() -> Value) -> Result<&Validator, &str> {
        self.0
            .get_or_init(|| {
                draft4::options()
                    .should_validate_formats(true)
                    .build(&document())
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(String::as_str)
    }
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.get().is_some() { "compiled" } else { "pending" })
    }
}

// The compiled form is derived from the declaration, so it never decides equality
impl PartialEq for Compiled {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for Compiled {}

/// A single declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub ty: FieldType,
}

/// Declarative schema for a JSON object
///
/// Schemas are closed by default: fields that are not declared are a
/// violation (`additionalProperties: false`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    title: String,
    fields: Vec<FieldSpec>,
    closed: bool,
    compiled: Compiled,
}

impl Schema {
    /// Start a closed object schema with no fields
    pub fn object(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
            closed: true,
            compiled: Compiled::default(),
        }
    }

    /// Declare a required field
    pub fn required(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.with_field(name.into(), true, ty)
    }

    /// Declare an optional field
    pub fn optional(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.with_field(name.into(), false, ty)
    }

    /// Allow fields that are not declared
    pub fn open(mut self) -> Self {
        self.closed = false;
        self.compiled = Compiled::default();
        self
    }

    fn with_field(mut self, name: String, required: bool, ty: FieldType) -> Self {
        // Redeclaring a field replaces it so lookups stay unambiguous
        self.fields.retain(|field| field.name != name);
        self.fields.push(FieldSpec { name, required, ty });
        self.compiled = Compiled::default();
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Look up a declared field by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Validate a value against this schema
    ///
    /// The draft-04 document from [`Schema::to_json_schema`] is compiled on
    /// first use and every error it reports becomes one [`Violation`].
    pub fn validate(&self, value: &Value) -> ValidationResult {
        let validator = match self.compiled.get_or_compile(|| self.to_json_schema()) {
            Ok(validator) => validator,
            Err(reason) => {
                error!(schema = %self.title, %reason, "Schema does not compile");
                return ValidationResult::Invalid(vec![Violation::new(
                    ROOT_FIELD,
                    Rule::Type,
                    format!("{} does not compile: {}", self.title, reason),
                )]);
            }
        };

        let mut violations = Vec::new();
        for error in validator.iter_errors(value) {
            let path = error.instance_path.to_string();
            self.push_violations(value, &path, &error.kind, &mut violations);
        }
        self.push_strict_integer_violations(value, &mut violations);
        self.normalize(&mut violations);

        if violations.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(violations)
        }
    }

    fn push_violations(
        &self,
        value: &Value,
        instance_path: &str,
        kind: &ValidationErrorKind,
        violations: &mut Vec<Violation>,
    ) {
        let field = field_from_pointer(instance_path);
        let instance = if field == ROOT_FIELD {
            Some(value)
        } else {
            value.get(&field)
        };

        match kind {
            ValidationErrorKind::Required { property } => {
                let name = property
                    .as_str()
                    .map_or_else(|| property.to_string(), str::to_string);
                violations.push(Violation::new(name, Rule::Required, "required field missing"));
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for name in unexpected {
                    violations.push(Violation::new(
                        name,
                        Rule::AdditionalProperties,
                        format!("field is not declared by {}", self.title),
                    ));
                }
            }
            ValidationErrorKind::Type { .. } => {
                let expected = if field == ROOT_FIELD {
                    "object"
                } else {
                    self.field(&field).map_or("declared type", |spec| spec.ty.json_type())
                };
                let got = instance.map_or("nothing", type_name);
                violations.push(Violation::new(
                    field,
                    Rule::Type,
                    format!("expected {expected}, got {got}"),
                ));
            }
            ValidationErrorKind::MaxLength { limit } => {
                let length = instance
                    .and_then(Value::as_str)
                    .map_or(0, |text| text.chars().count());
                violations.push(Violation::new(
                    field,
                    Rule::MaxLength,
                    format!("length {length} exceeds maximum {limit}"),
                ));
            }
            ValidationErrorKind::Format { format } => {
                let text = instance.and_then(Value::as_str).unwrap_or_default();
                violations.push(Violation::new(
                    field,
                    Rule::Format,
                    format!("`{text}` is not a valid {format}"),
                ));
            }
            ValidationErrorKind::Enum { .. } => {
                let text = instance.and_then(Value::as_str).unwrap_or_default();
                let allowed = match self.field(&field).map(|spec| &spec.ty) {
                    Some(FieldType::Enum(values)) => values.join(", "),
                    _ => String::new(),
                };
                violations.push(Violation::new(
                    field,
                    Rule::Enum,
                    format!("`{text}` is not one of {allowed}"),
                ));
            }
            other => {
                debug!(schema = %self.title, field = %field, ?other, "Unmapped schema error");
                violations.push(Violation::new(field, Rule::Type, format!("{other:?}")));
            }
        }
    }

    /// Draft-04 integers have no fractional representation, so `300.0` is a number
    fn push_strict_integer_violations(&self, value: &Value, violations: &mut Vec<Violation>) {
        let Some(object) = value.as_object() else {
            return;
        };
        for field in self.fields.iter().filter(|field| field.ty == FieldType::Integer) {
            let Some(Value::Number(number)) = object.get(&field.name) else {
                continue;
            };
            let flagged = violations
                .iter()
                .any(|v| v.field == field.name && v.rule == Rule::Type);
            if !(number.is_i64() || number.is_u64()) && !flagged {
                violations.push(Violation::new(
                    &field.name,
                    Rule::Type,
                    "expected integer, got number",
                ));
            }
        }
    }

    /// Declared fields first in declaration order, then undeclared ones by name.
    /// A field with the wrong type reports only that.
    fn normalize(&self, violations: &mut Vec<Violation>) {
        let mistyped: Vec<String> = violations
            .iter()
            .filter(|v| v.rule == Rule::Type)
            .map(|v| v.field.clone())
            .collect();
        violations.retain(|v| v.rule == Rule::Type || !mistyped.contains(&v.field));

        let position = |name: &str| {
            self.fields
                .iter()
                .position(|field| field.name == name)
                .unwrap_or(self.fields.len())
        };
        violations.sort_by(|a, b| {
            (position(&a.field), a.field.as_str(), a.rule.rank())
                .cmp(&(position(&b.field), b.field.as_str(), b.rule.rank()))
        });
        violations.dedup();
    }

    /// Render as a draft-04 JSON Schema document
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.ty.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name.as_str())
            .collect();

        let mut document = json!({
            "$schema": DRAFT_04,
            "title": self.title,
            "type": "object",
            "properties": properties,
            "additionalProperties": !self.closed,
        });
        if !required.is_empty() {
            document["required"] = json!(required);
        }
        document
    }
}

/// Validate `value` against `schema`
pub fn validate(value: &Value, schema: &Schema) -> ValidationResult {
    schema.validate(value)
}

/// First segment of a JSON pointer, unescaped; the empty pointer is the root
fn field_from_pointer(pointer: &str) -> String {
    match pointer.strip_prefix('/') {
        Some(rest) => rest
            .split('/')
            .next()
            .unwrap_or_default()
            .replace("~1", "/")
            .replace("~0", "~"),
        None => ROOT_FIELD.to_string(),
    }
}

/// JSON type name of a value, distinguishing integers from other numbers
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Validation results
// =============================================================================

/// The schema rule a violation broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    Type,
    Required,
    Format,
    Enum,
    MaxLength,
    AdditionalProperties,
}

impl Rule {
    fn rank(self) -> u8 {
        match self {
            Rule::Type => 0,
            Rule::Required => 1,
            Rule::Enum => 2,
            Rule::MaxLength => 3,
            Rule::Format => 4,
            Rule::AdditionalProperties => 5,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::Type => "type",
            Rule::Required => "required",
            Rule::Format => "format",
            Rule::Enum => "enum",
            Rule::MaxLength => "maxLength",
            Rule::AdditionalProperties => "additionalProperties",
        };
        f.write_str(name)
    }
}

/// One violated rule on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub rule: Rule,
    pub detail: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, rule: Rule, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.detail, self.rule)
    }
}

/// Outcome of validating a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    /// Violations in deterministic order: declared fields first, then undeclared ones
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(violations) => violations,
        }
    }

    pub fn first(&self) -> Option<&Violation> {
        self.violations().first()
    }
}
