use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"\{\{(!)?([A-Za-z0-9_]+)\}\}").expect("placeholder regex must compile")
    })
}

/// A named substitution slot found in a command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// Values for sensitive placeholders are never persisted.
    pub sensitive: bool,
}

/// Returns every distinct placeholder in first-occurrence order.
///
/// `{{name}}` is a regular placeholder, `{{!name}}` a sensitive one. A name
/// that appears in both forms is sensitive.
pub fn extract_placeholders(template: &str) -> Vec<Placeholder> {
    let mut placeholders: Vec<Placeholder> = Vec::new();
    for captures in placeholder_regex().captures_iter(template) {
        let sensitive = captures.get(1).is_some();
        let name = &captures[2];
        match placeholders.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.sensitive |= sensitive,
            None => placeholders.push(Placeholder {
                name: name.to_string(),
                sensitive,
            }),
        }
    }
    placeholders
}

/// Replaces `{{name}}` and `{{!name}}` for every supplied value in one pass.
///
/// Placeholders without a value are left as they are. Inserted values are
/// not scanned again.
pub fn substitute(template: &str, values: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(template, |captures: &Captures<'_>| {
            values
                .get(&captures[2])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

/// Parses an inline `name=value name2=value2` line.
pub fn parse_param_line(line: &str) -> HashMap<String, String> {
    line.split_whitespace()
        .filter_map(|token| token.split_once('='))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Builds the editable parameter line, seeded with the last values of
/// non-sensitive placeholders.
pub fn format_param_line(
    placeholders: &[Placeholder],
    last_params: &HashMap<String, String>,
) -> String {
    placeholders
        .iter()
        .map(|placeholder| {
            let value = if placeholder.sensitive {
                ""
            } else {
                last_params
                    .get(&placeholder.name)
                    .map(String::as_str)
                    .unwrap_or_default()
            };
            format!("{}={value}", placeholder.name)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Names of required placeholders that have no entry in `values`.
pub fn missing_names<'a>(
    placeholders: &'a [Placeholder],
    values: &HashMap<String, String>,
) -> Vec<&'a str> {
    placeholders
        .iter()
        .filter(|placeholder| !values.contains_key(&placeholder.name))
        .map(|placeholder| placeholder.name.as_str())
        .collect()
}

/// The subset of `values` that may be persisted for next time.
pub fn persistable_values(
    placeholders: &[Placeholder],
    values: &HashMap<String, String>,
) -> HashMap<String, String> {
    placeholders
        .iter()
        .filter(|placeholder| !placeholder.sensitive)
        .filter_map(|placeholder| {
            values
                .get(&placeholder.name)
                .map(|value| (placeholder.name.clone(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder(name: &str, sensitive: bool) -> Placeholder {
        Placeholder {
            name: name.to_string(),
            sensitive,
        }
    }

    #[test]
    fn extracts_distinct_names_in_first_seen_order() {
        assert_eq!(
            extract_placeholders("cp {{src}} {{dst}} {{src}}"),
            vec![placeholder("src", false), placeholder("dst", false)]
        );
    }

    #[test]
    fn sensitivity_sticks_to_the_name() {
        assert_eq!(
            extract_placeholders("login {{user}} {{!user}}"),
            vec![placeholder("user", true)]
        );
        assert_eq!(
            extract_placeholders("login {{!token}} {{token}}"),
            vec![placeholder("token", true)]
        );
    }

    #[test]
    fn ignores_malformed_delimiters() {
        assert!(extract_placeholders("echo {{}} {{ spaced }} {single} {{a-b}}").is_empty());
        assert!(extract_placeholders("ls -la").is_empty());
    }

    #[test]
    fn substitutes_both_forms() {
        let mut values = HashMap::new();
        values.insert("user".to_string(), "alice".to_string());
        values.insert("pass".to_string(), "s3cret".to_string());
        values.insert("unused".to_string(), "x".to_string());

        let rendered = substitute("login {{user}} {{!pass}} again {{user}}", &values);
        assert_eq!(rendered, "login alice s3cret again alice");
    }

    #[test]
    fn leaves_missing_placeholders_verbatim() {
        let mut values = HashMap::new();
        values.insert("user".to_string(), "alice".to_string());
        assert_eq!(
            substitute("ssh {{user}}@{{host}}", &values),
            "ssh alice@{{host}}"
        );
    }

    #[test]
    fn fully_populated_mapping_leaves_no_tokens() {
        let template = "rsync {{!key}} {{src}} {{dst}}/{{src}} --key={{key}}";
        let values: HashMap<String, String> = extract_placeholders(template)
            .into_iter()
            .map(|p| (p.name.clone(), format!("v-{}", p.name)))
            .collect();
        let rendered = substitute(template, &values);
        assert!(extract_placeholders(&rendered).is_empty());
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn values_are_inserted_literally() {
        let mut values = HashMap::new();
        values.insert("a".to_string(), "{{b}}".to_string());
        values.insert("b".to_string(), "x".to_string());
        values.insert("c".to_string(), "$HOME \\1 ${0}".to_string());

        assert_eq!(
            substitute("echo {{a}} {{b}} {{!c}}", &values),
            "echo {{b}} x $HOME \\1 ${0}"
        );
    }

    #[test]
    fn parses_inline_params_on_first_equals() {
        let parsed = parse_param_line("  user=alice  query=a=b empty= noequals =orphan ");
        assert_eq!(parsed.get("user").map(String::as_str), Some("alice"));
        assert_eq!(parsed.get("query").map(String::as_str), Some("a=b"));
        assert_eq!(parsed.get("empty").map(String::as_str), Some(""));
        assert!(!parsed.contains_key("noequals"));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn param_line_hides_sensitive_last_values() {
        let placeholders = vec![placeholder("user", false), placeholder("token", true)];
        let mut last = HashMap::new();
        last.insert("user".to_string(), "alice".to_string());
        last.insert("token".to_string(), "leaked".to_string());
        assert_eq!(format_param_line(&placeholders, &last), "user=alice token=");
    }

    #[test]
    fn persistable_values_skip_sensitive_names() {
        let placeholders = vec![placeholder("user", false), placeholder("token", true)];
        let mut values = HashMap::new();
        values.insert("user".to_string(), "alice".to_string());
        values.insert("token".to_string(), "secret".to_string());
        values.insert("extra".to_string(), "ignored".to_string());

        let saved = persistable_values(&placeholders, &values);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved.get("user").map(String::as_str), Some("alice"));
    }

    #[test]
    fn reports_missing_names_in_template_order() {
        let placeholders = vec![placeholder("user", false), placeholder("host", false)];
        let values = parse_param_line("user=alice");
        assert_eq!(missing_names(&placeholders, &values), vec!["host"]);
    }
}
