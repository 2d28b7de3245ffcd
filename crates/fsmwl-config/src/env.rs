use regex::{Captures, Regex};
use std::env;

use crate::ConfigError;

/// Interpolate `${VAR_NAME}` references with values from the environment.
///
/// `${VAR_NAME:-fallback}` uses `fallback` when the variable is unset or
/// empty. Every missing variable without a fallback is reported at once
/// rather than failing on the first.
pub fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

    let mut missing = Vec::new();
    let result = re.replace_all(input, |cap: &Captures<'_>| {
        let name = &cap[1];
        let fallback = cap.get(2).map(|m| m.as_str());
        match (env::var(name), fallback) {
            (Ok(value), Some(fallback)) if value.is_empty() => fallback.to_string(),
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.to_string(),
            (Err(_), None) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvVars(missing));
    }

    Ok(result.into_owned())
}
