/// Replace any character not allowed in a CloudFormation logical ID
/// with its uppercase-alpha counterpart
pub fn escape_resource_name(name: &str) -> String {
    name.replace("@", "AT")
        .replace(".", "DOT")
        .replace("-", "HYPHEN")
        .replace("_", "UNDRSC")
}

/// Logical ID of a resource: kind prefix followed by the escaped name
pub fn logical_id(kind: &str, name: &str) -> String {
    format!("{kind}{}", escape_resource_name(name))
}
