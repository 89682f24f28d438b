//! Free-text query tokenizer.
//!
//! Tokens are whitespace separated, except that `"quoted phrases"` and
//! `(parenthesised groups)` stay atomic. Tokens keep their original text,
//! quotes included, so they can be displayed and re-joined verbatim.
//!
//! Inside quotes a backslash escapes the next character; this is the only
//! escaping the language has, and `quote_value` is its inverse.

/// Split a query string into tokens. Never yields empty or whitespace-only tokens.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth = 0usize;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if in_quotes {
            current.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => flush(&mut tokens, &mut current),
            c => current.push(c),
        }
    }
    flush(&mut tokens, &mut current);
    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        tokens.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Whether a value has to be quoted to survive tokenization as one token.
pub fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '(' | ')'))
}

/// Render a value so `parse_fragment` returns it unchanged.
pub fn quote_value(value: &str) -> String {
    if !needs_quoting(value) {
        return value.to_string();
    }
    quote_phrase(value)
}

/// Always wrap `value` in quotes, escaping embedded quotes and backslashes.
pub fn quote_phrase(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Build a `field:value` fragment, quoting the value when required.
pub fn fragment(field: &str, value: &str) -> String {
    format!("{field}:{}", quote_value(value))
}

/// A token split into its optional field and its unquoted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub field: Option<String>,
    pub value: String,
}

/// Parse one token back into `{field, value}`.
pub fn parse_fragment(token: &str) -> Fragment {
    let token = token.trim();
    let (field, raw) = match token.split_once(':') {
        Some((field, rest))
            if !field.is_empty()
                && !field
                    .chars()
                    .any(|c| c.is_whitespace() || matches!(c, '"' | '(' | ')')) =>
        {
            (Some(field.to_string()), rest)
        }
        _ => (None, token),
    };
    Fragment {
        field,
        value: unquote(raw),
    }
}

pub(crate) fn unquote(raw: &str) -> String {
    let Some(body) = raw.strip_prefix('"') else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' => break,
            c => out.push(c),
        }
    }
    out
}
