//! `{{ name }}` placeholder rendering for action parameters.
//!
//! Names resolve against the execution variables (event payload plus the
//! processor's injected fields). Dotted names walk nested objects and arrays:
//! `{{ user.email }}`, `{{ items.0 }}`. `\{{` emits a literal `{{`.
//! A placeholder that does not resolve is an error, never left in the output.

use herald_common::Payload;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Template variable not found: {{{{ {0} }}}}")]
    MissingVariable(String),

    #[error("Unclosed template variable: {{{{{0}")]
    Unclosed(String),

    #[error("Empty template placeholder")]
    EmptyPlaceholder,
}

/// Fill every placeholder in `template` from `vars`.
pub fn render(template: &str, vars: &Payload) -> Result<String, TemplateError> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            // Escaped \{{ -> literal {{
            if chars.peek() == Some(&'{') {
                chars.next();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    result.push_str("{{");
                } else {
                    result.push('\\');
                    result.push('{');
                }
                continue;
            }
            result.push(c);
        } else if c == '{' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_name = String::new();
            loop {
                match chars.next() {
                    Some('}') if chars.peek() == Some(&'}') => {
                        chars.next();
                        break;
                    }
                    Some(ch) => var_name.push(ch),
                    None => return Err(TemplateError::Unclosed(var_name)),
                }
            }

            let var_name = var_name.trim();
            if var_name.is_empty() {
                return Err(TemplateError::EmptyPlaceholder);
            }

            let value = lookup_path(vars, var_name)
                .ok_or_else(|| TemplateError::MissingVariable(var_name.to_string()))?;
            push_value(&mut result, value);
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

/// Render an optional template; `None` stays `None`.
pub fn render_opt(template: Option<&str>, vars: &Payload) -> Result<Option<String>, TemplateError> {
    template.map(|t| render(t, vars)).transpose()
}

fn lookup_path<'a>(vars: &'a Payload, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').map(str::trim);
    let mut current = vars.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Null => {}
        other => out.push_str(&other.to_string()),
    }
}
