use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("token pattern is valid"))
}

/// Replace `${key}` tokens with values from the context.
///
/// Unknown keys are left as written.
pub fn replace_values(template: &str, context: &HashMap<String, String>) -> String {
    token_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            context
                .get(caps[1].trim())
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
