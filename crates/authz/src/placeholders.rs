use thiserror::Error;

const ENTRY_LABEL: &str = "policy-entry:label";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("unknown placeholder '{0}'")]
    Unknown(String),
    #[error("unterminated placeholder in '{0}'")]
    Unterminated(String),
    #[error("template resolved to a blank subject")]
    Blank,
}

/// Substitutes every `{{ policy-entry:label }}` in `template` with `label`.
pub fn resolve_entry_label(template: &str, label: &str) -> Result<String, PlaceholderError> {
    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        resolved.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| PlaceholderError::Unterminated(template.to_string()))?;
        let name = after[..end].trim();
        if name != ENTRY_LABEL {
            return Err(PlaceholderError::Unknown(name.to_string()));
        }
        resolved.push_str(label);
        rest = &after[end + 2..];
    }
    resolved.push_str(rest);
    if resolved.trim().is_empty() {
        return Err(PlaceholderError::Blank);
    }
    Ok(resolved)
}
