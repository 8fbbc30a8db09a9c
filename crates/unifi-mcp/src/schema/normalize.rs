//! Raw field definition → normalized attribute descriptor.

use super::{RawField, RawResource};
use serde::{Deserialize, Serialize};

/// Identifier field; handled out-of-band as the `id` argument.
pub const ID_FIELD: &str = "_id";

/// "Empty allowed" sentinel; carries no constraint.
const EMPTY_PATTERN: &str = "^$";

/// Semantic type of an attribute, as exposed in tool input schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl AttributeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKind::String => "string",
            AttributeKind::Integer => "integer",
            AttributeKind::Number => "number",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Array => "array",
            AttributeKind::Object => "object",
        }
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON shape a payload value must have to bind to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindShape {
    pub kind: AttributeKind,
    pub item_kind: Option<AttributeKind>,
}

/// One normalized field of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Wire key.
    pub name: String,
    /// In-memory field identifier.
    pub bound_name: String,
    pub kind: AttributeKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_kind: Option<AttributeKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Binding shape when it differs from the schema kinds (pointer types).
    #[serde(skip)]
    pub binding: Option<BindShape>,
}

impl AttributeDescriptor {
    /// Shape accepted when binding a payload value.
    pub fn bind_shape(&self) -> BindShape {
        self.binding.unwrap_or(BindShape {
            kind: self.kind,
            item_kind: self.item_kind,
        })
    }
}

/// Normalize one raw field, or `None` for internal and identifier fields.
pub fn normalize(field: &RawField) -> Option<AttributeDescriptor> {
    // Spacer fields carry a leading space.
    if field.json_name.is_empty() || field.json_name.starts_with(' ') {
        return None;
    }
    if field.json_name == ID_FIELD {
        return None;
    }

    let (kind, item_kind) = map_type(&field.field_type, field.is_array);
    let bind = bind_shape(&field.field_type, field.is_array);
    let mut attribute = AttributeDescriptor {
        name: field.json_name.clone(),
        bound_name: field.field_name.clone(),
        kind,
        required: !field.omit_empty,
        item_kind,
        enum_values: Vec::new(),
        pattern: None,
        description: None,
        binding: (bind.kind != kind || bind.item_kind != item_kind).then_some(bind),
    };

    let raw = field.validation.as_str();
    if is_enum_pattern(raw) {
        attribute.enum_values = parse_enum_values(raw);
        attribute.description = Some(format!("One of: {}", raw));
    } else if !raw.is_empty() && raw != EMPTY_PATTERN {
        attribute.pattern = Some(raw.to_string());
    }

    Some(attribute)
}

/// Normalized attributes of a resource, sorted by wire key.
pub fn extract_field_schemas(resource: &RawResource) -> Vec<AttributeDescriptor> {
    let mut attributes: Vec<AttributeDescriptor> =
        resource.fields().iter().filter_map(normalize).collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    attributes
}

/// Map a declared type to its schema kind and, for arrays, the item kind.
pub fn map_type(declared: &str, is_array: bool) -> (AttributeKind, Option<AttributeKind>) {
    if is_array {
        let element = declared.strip_prefix("[]").unwrap_or(declared);
        let (item, _) = map_type(element, false);
        return (AttributeKind::Array, Some(item));
    }

    let kind = match declared {
        "string" | "String" | "&str" => AttributeKind::String,
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16"
        | "uint32" | "uint64" | "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16"
        | "u32" | "u64" | "usize" => AttributeKind::Integer,
        "float32" | "float64" | "f32" | "f64" => AttributeKind::Number,
        "bool" => AttributeKind::Boolean,
        // Structs, pointers and maps
        _ => AttributeKind::Object,
    };
    (kind, None)
}

/// Shape a declared type binds to. Pointers (`*int`) bind as their target.
pub fn bind_shape(declared: &str, is_array: bool) -> BindShape {
    if is_array {
        let element = declared.strip_prefix("[]").unwrap_or(declared);
        return BindShape {
            kind: AttributeKind::Array,
            item_kind: Some(bind_shape(element, false).kind),
        };
    }
    let (kind, _) = map_type(declared.trim_start_matches('*'), false);
    BindShape {
        kind,
        item_kind: None,
    }
}

/// Whether a raw validation pattern is a plain alternation such as `tcp|udp`.
///
/// `.` is not treated as a metacharacter so values like `802.1x` survive,
/// which also means `a.b|c.d` classifies as an enum.
pub fn is_enum_pattern(pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern.starts_with('^') || pattern.ends_with('$') {
        return false;
    }
    if pattern
        .chars()
        .any(|c| matches!(c, '*' | '+' | '?' | '[' | ']' | '(' | ')' | '{' | '}' | '\\'))
    {
        return false;
    }
    pattern.contains('|')
}

/// Split an alternation into its values, dropping empty segments.
pub fn parse_enum_values(pattern: &str) -> Vec<String> {
    pattern
        .split('|')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(json_name: &str, field_type: &str) -> RawField {
        RawField {
            json_name: json_name.to_string(),
            field_name: String::new(),
            field_type: field_type.to_string(),
            is_array: false,
            omit_empty: false,
            validation: String::new(),
        }
    }

    #[test]
    fn test_map_type_scalars() {
        assert_eq!(map_type("string", false), (AttributeKind::String, None));
        assert_eq!(map_type("int", false), (AttributeKind::Integer, None));
        assert_eq!(map_type("uint64", false), (AttributeKind::Integer, None));
        assert_eq!(map_type("i32", false), (AttributeKind::Integer, None));
        assert_eq!(map_type("float64", false), (AttributeKind::Number, None));
        assert_eq!(map_type("f32", false), (AttributeKind::Number, None));
        assert_eq!(map_type("bool", false), (AttributeKind::Boolean, None));
    }

    #[test]
    fn test_map_type_complex_is_object() {
        assert_eq!(map_type("DeviceConfigNetwork", false).0, AttributeKind::Object);
        assert_eq!(map_type("*int", false).0, AttributeKind::Object);
        assert_eq!(map_type("map[string]string", false).0, AttributeKind::Object);
    }

    #[test]
    fn test_map_type_arrays() {
        assert_eq!(
            map_type("[]string", true),
            (AttributeKind::Array, Some(AttributeKind::String))
        );
        assert_eq!(
            map_type("[]int", true),
            (AttributeKind::Array, Some(AttributeKind::Integer))
        );
        assert_eq!(
            map_type("[]DevicePortOverrides", true),
            (AttributeKind::Array, Some(AttributeKind::Object))
        );
        // Element type given without the slice prefix
        assert_eq!(
            map_type("bool", true),
            (AttributeKind::Array, Some(AttributeKind::Boolean))
        );
    }

    #[test]
    fn test_is_enum_pattern() {
        assert!(is_enum_pattern("tcp|udp"));
        assert!(is_enum_pattern("vpn|802.1x|custom"));
        assert!(is_enum_pattern("a.b|c.d"));
        assert!(is_enum_pattern("||"));
        assert!(!is_enum_pattern(""));
        assert!(!is_enum_pattern("tcp"));
        assert!(!is_enum_pattern("^tcp|udp"));
        assert!(!is_enum_pattern("tcp|udp$"));
        assert!(!is_enum_pattern("[0-9]+|auto"));
        assert!(!is_enum_pattern("(a|b)"));
        assert!(!is_enum_pattern("a?|b"));
        assert!(!is_enum_pattern("\\d|x"));
        assert!(!is_enum_pattern("^$"));
    }

    #[test]
    fn test_parse_enum_values() {
        assert_eq!(parse_enum_values("a|b|c"), vec!["a", "b", "c"]);
        assert_eq!(parse_enum_values("a||b"), vec!["a", "b"]);
        assert_eq!(parse_enum_values("|a|b"), vec!["a", "b"]);
        assert_eq!(parse_enum_values("a|b|"), vec!["a", "b"]);
        assert!(parse_enum_values("||").is_empty());
        assert_eq!(parse_enum_values("802.1x|vpn"), vec!["802.1x", "vpn"]);
    }

    #[test]
    fn test_normalize_enum_field() {
        let mut raw = field("proto", "string");
        raw.validation = "tcp_udp|tcp|udp".to_string();
        raw.omit_empty = true;
        let attr = normalize(&raw).unwrap();
        assert_eq!(attr.enum_values, vec!["tcp_udp", "tcp", "udp"]);
        assert_eq!(attr.pattern, None);
        assert_eq!(attr.description.as_deref(), Some("One of: tcp_udp|tcp|udp"));
        assert!(!attr.required);
    }

    #[test]
    fn test_normalize_pattern_field() {
        let mut raw = field("mac", "string");
        raw.validation = "^([0-9A-Fa-f]{2}:){5}([0-9A-Fa-f]{2})$".to_string();
        let attr = normalize(&raw).unwrap();
        assert!(attr.enum_values.is_empty());
        assert_eq!(attr.pattern.as_deref(), Some(raw.validation.as_str()));
        assert!(attr.required);
    }

    #[test]
    fn test_normalize_empty_sentinel_has_no_constraint() {
        let mut raw = field("dhcpd_start", "string");
        raw.validation = "^$".to_string();
        let attr = normalize(&raw).unwrap();
        assert!(attr.enum_values.is_empty());
        assert!(attr.pattern.is_none());
    }

    #[test]
    fn test_normalize_empty_enum_sets_neither() {
        let mut raw = field("odd", "string");
        raw.validation = "||".to_string();
        let attr = normalize(&raw).unwrap();
        assert!(attr.enum_values.is_empty());
        assert!(attr.pattern.is_none());
    }

    #[test]
    fn test_normalize_skips_internal_and_id() {
        assert!(normalize(&field("", "string")).is_none());
        assert!(normalize(&field(" spacer", "string")).is_none());
        assert!(normalize(&field("_id", "string")).is_none());
        assert!(normalize(&field("site_id", "string")).is_some());
    }

    #[test]
    fn test_normalize_array_field() {
        let mut raw = field("dhcpd_dns", "[]string");
        raw.is_array = true;
        raw.field_name = "DHCPDDNS".to_string();
        let attr = normalize(&raw).unwrap();
        assert_eq!(attr.kind, AttributeKind::Array);
        assert_eq!(attr.item_kind, Some(AttributeKind::String));
        assert_eq!(attr.bound_name, "DHCPDDNS");
        assert_eq!(attr.binding, None);
        assert_eq!(attr.bind_shape().item_kind, Some(AttributeKind::String));
    }

    #[test]
    fn test_pointer_fields_bind_as_target() {
        let attr = normalize(&field("limit", "*int")).unwrap();
        assert_eq!(attr.kind, AttributeKind::Object);
        assert_eq!(
            attr.bind_shape(),
            BindShape {
                kind: AttributeKind::Integer,
                item_kind: None,
            }
        );

        let mut raw = field("ports", "[]*int");
        raw.is_array = true;
        let attr = normalize(&raw).unwrap();
        assert_eq!(attr.item_kind, Some(AttributeKind::Object));
        assert_eq!(attr.bind_shape().item_kind, Some(AttributeKind::Integer));

        assert_eq!(bind_shape("*Settings", false).kind, AttributeKind::Object);
    }

    #[test]
    fn test_extract_field_schemas_sorted_and_filtered() {
        let resource = RawResource {
            name: "Network".to_string(),
            endpoint: "networkconf".to_string(),
            is_setting: false,
            api: Default::default(),
            excluded: false,
            operations: None,
            fields: Some(vec![
                field("vlan", "int"),
                field("_id", "string"),
                field(" ", "string"),
                field("enabled", "bool"),
                field("", "string"),
                field("name", "string"),
            ]),
        };
        let names: Vec<String> = extract_field_schemas(&resource)
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["enabled", "name", "vlan"]);
    }

    #[test]
    fn test_enum_and_pattern_are_exclusive_in_builtin_catalog() {
        let catalog = crate::schema::ResourceCatalog::builtin().unwrap();
        for resource in &catalog.resources {
            for attr in extract_field_schemas(resource) {
                assert!(
                    attr.enum_values.is_empty() || attr.pattern.is_none(),
                    "{}.{} has both enum and pattern",
                    resource.name,
                    attr.name
                );
                assert_ne!(attr.name, "_id");
                assert!(!attr.name.starts_with(' '));
            }
        }
    }
}
