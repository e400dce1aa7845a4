/// Replace any character CloudFormation does not allow in a logical id
/// with its uppercase-alpha counterpart
///
/// Logical ids are alphanumeric only.
pub fn escape_resource_name(name: &str) -> String {
    name.replace('@', "AT")
        .replace('.', "DOT")
        .replace('-', "HYPHEN")
        .replace('_', "UNDRSC")
        .replace('/', "SLASH")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Upper camel case logical id from a dotted service name, e.g. "ecr.api" -> "EcrDOTapi"
pub fn logical_id(prefix: &str, name: &str) -> String {
    let escaped = escape_resource_name(name);
    let mut chars = escaped.chars();

    match chars.next() {
        Some(first) => format!("{prefix}{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}
