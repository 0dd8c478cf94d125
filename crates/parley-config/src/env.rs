use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("valid placeholder regex")
    })
}

/// Expand environment placeholders in raw config text
///
/// Comment lines are copied through untouched so a commented-out secret
/// never has to exist in the environment.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.split('\n') {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    Ok(lines.join("\n"))
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |caps: &Captures<'_>| {
        match resolve(&caps[1], caps.get(2).map(|m| m.as_str())) {
            Ok(value) => value,
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve(key: &str, default: Option<&str>) -> Result<String, String> {
    let Some(var) = key.strip_prefix("env.").filter(|v| !v.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[chat]\nhard_append = true\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_api_key() {
        temp_env::with_var("PARLEY_TEST_GEMINI", Some("g-123"), || {
            let result = expand_env("api_key = \"{{ env.PARLEY_TEST_GEMINI }}\"").unwrap();
            assert_eq!(result, "api_key = \"g-123\"");
        });
    }

    #[test]
    fn expands_several_on_one_line() {
        let vars = [("PARLEY_A", Some("a")), ("PARLEY_B", Some("b"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("x = \"{{ env.PARLEY_A }}-{{env.PARLEY_B}}\"").unwrap();
            assert_eq!(result, "x = \"a-b\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("PARLEY_MISSING", || {
            let err = expand_env("api_key = \"{{ env.PARLEY_MISSING }}\"").unwrap_err();
            assert!(err.contains("PARLEY_MISSING"));
        });
    }

    #[test]
    fn default_fills_missing_variable() {
        temp_env::with_var_unset("PARLEY_OPTIONAL", || {
            let result = expand_env("model = \"{{ env.PARLEY_OPTIONAL | default(\"gemini-1.5-flash\") }}\"").unwrap();
            assert_eq!(result, "model = \"gemini-1.5-flash\"");
        });
    }

    #[test]
    fn present_variable_beats_default() {
        temp_env::with_var("PARLEY_OPTIONAL", Some("set"), || {
            let result = expand_env("v = \"{{ env.PARLEY_OPTIONAL | default(\"unset\") }}\"").unwrap();
            assert_eq!(result, "v = \"set\"");
        });
    }

    #[test]
    fn other_scopes_rejected() {
        let err = expand_env("v = \"{{ secrets.KEY }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_var_unset("PARLEY_MISSING", || {
            let input = "  # api_key = \"{{ env.PARLEY_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
