//! Field type strings: primitives, `array[T]`, `map[T]`, `reference[T]`, or a schema id.

pub const PRIMITIVE_TYPES: &[&str] = &[
    "string", "int", "boolean", "float", "date", "enum", "password", "json", "dnsLabel",
    "hostname", "base64",
];

pub fn is_array_type(field_type: &str) -> bool {
    field_type.starts_with("array[")
}

pub fn is_map_type(field_type: &str) -> bool {
    field_type.starts_with("map[")
}

pub fn is_reference_type(field_type: &str) -> bool {
    field_type.starts_with("reference[")
}

pub fn is_primitive_type(field_type: &str) -> bool {
    PRIMITIVE_TYPES.contains(&field_type)
}

/// Inner type of a composite type, or the type itself when not composite.
pub fn sub_type(field_type: &str) -> &str {
    match (field_type.find('['), field_type.rfind(']')) {
        (Some(start), Some(end)) if start < end => &field_type[start + 1..end],
        _ => field_type,
    }
}

/// The schema id a type ultimately points at, if any.
pub fn referenced_schema(field_type: &str) -> Option<&str> {
    let mut current = field_type;
    while is_array_type(current) || is_map_type(current) || is_reference_type(current) {
        current = sub_type(current);
    }
    if is_primitive_type(current) {
        None
    } else {
        Some(current)
    }
}

/// English plural guess used when a schema omits its plural name.
pub fn guess_plural_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if name.ends_with('s') || name.ends_with("ch") || name.ends_with('x') || name.ends_with("sh")
    {
        return format!("{}es", name);
    }
    if let Some(stem) = name.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", name)
}
