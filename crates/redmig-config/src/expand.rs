//! `${VAR}` and `${VAR:-default}` expansion for configuration values.
//!
//! Credentials usually live in the environment rather than in `redmig.toml`,
//! so every string field that can carry a secret or a host goes through here.

use crate::ConfigError;

/// Unresolved variable reported by the lookup closure.
struct MissingVar {
    name: String,
}

/// Expand environment references in `value`.
///
/// Bare `$VAR` is left alone so URLs and tokens containing a dollar sign
/// survive untouched.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| -> Result<Option<String>, MissingVar> {
        std::env::var(name).map(Some).map_err(|_| MissingVar {
            name: name.to_owned(),
        })
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.name),
    })
}

/// Expand an optional value in place.
pub(crate) fn expand_opt(value: &mut Option<String>, field: &str) -> Result<(), ConfigError> {
    if let Some(inner) = value.as_deref() {
        *value = Some(expand_env(inner, field)?);
    }
    Ok(())
}

/// Expand a required value in place.
pub(crate) fn expand_in_place(value: &mut String, field: &str) -> Result<(), ConfigError> {
    *value = expand_env(value, field)?;
    Ok(())
}
