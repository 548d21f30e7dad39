use std::sync::OnceLock;

use regex::Regex;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `{{ env.VAR }}` with an optional `| default("fallback")` clause
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*env\.([A-Za-z0-9_]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("must be valid regex")
    })
}

/// Expand `{{ env.VAR }}` placeholders in a raw TOML string
///
/// Operates on the raw text before deserialization so config structs use
/// plain String/SecretString. Comment lines are passed through unchanged.
/// A placeholder for an unset variable is an error unless it carries a
/// `default("...")` clause.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut output = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut last_end = 0;
        for captures in placeholder_re().captures_iter(line) {
            let overall = captures.get(0).expect("capture 0 always present");
            let var_name = captures.get(1).expect("var name group").as_str();
            let fallback = captures.get(2).map(|m| m.as_str());

            output.push_str(&line[last_end..overall.start()]);

            match (std::env::var(var_name), fallback) {
                (Ok(value), _) => output.push_str(&value),
                (Err(_), Some(default)) => output.push_str(default),
                (Err(_), None) => {
                    return Err(format!("environment variable not found: `{var_name}`"));
                }
            }

            last_end = overall.end();
        }
        output.push_str(&line[last_end..]);
    }

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_without_placeholders() {
        let input = "key = \"value\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_set_variable() {
        temp_env::with_var("RELAY_TEST_KEY", Some("sk-123"), || {
            let result = expand_env("api_key = \"{{ env.RELAY_TEST_KEY }}\"").unwrap();
            assert_eq!(result, "api_key = \"sk-123\"");
        });
    }

    #[test]
    fn missing_variable_errors() {
        temp_env::with_var_unset("RELAY_MISSING", || {
            let err = expand_env("key = \"{{ env.RELAY_MISSING }}\"").unwrap_err();
            assert!(err.contains("RELAY_MISSING"));
        });
    }

    #[test]
    fn default_applies_when_unset() {
        temp_env::with_var_unset("RELAY_OPTIONAL", || {
            let result = expand_env("key = \"{{ env.RELAY_OPTIONAL | default(\"none\") }}\"").unwrap();
            assert_eq!(result, "key = \"none\"");
        });
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_var_unset("RELAY_MISSING", || {
            let input = "# key = \"{{ env.RELAY_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
