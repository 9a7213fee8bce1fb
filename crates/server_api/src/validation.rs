use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRules {
    /// When set, every field must be present. Present fields must never be blank.
    pub required: bool,
}

impl FieldRules {
    pub const REQUIRED: Self = Self { required: true };
    pub const OPTIONAL: Self = Self { required: false };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0} must not be empty")]
    Blank(&'static str),
}

/// Checks `fields` in order and reports the first one that breaks `rules`.
pub fn validate_fields(
    fields: &[(&'static str, Option<&str>)],
    rules: FieldRules,
) -> Result<(), ValidationError> {
    for &(name, value) in fields {
        match value {
            None if rules.required => return Err(ValidationError::Missing(name)),
            None => {}
            Some(value) if value.trim().is_empty() => {
                return Err(if rules.required {
                    ValidationError::Missing(name)
                } else {
                    ValidationError::Blank(name)
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}
