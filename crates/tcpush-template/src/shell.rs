//! Quoting text as a single shell word.

const SPECIAL: &[char] = &[
    '#', '!', '"', '$', '&', '\'', '(', ')', '*', ',', ':', ';', '<', '=', '>', '?', '@', '[',
    '\\', ']', '^', '`', '{', '|', '}', '~',
];

/// Quote `text` so a POSIX shell reads it back as exactly one word.
///
/// Text containing whitespace or double quotes but no single quote is
/// wrapped in single quotes. Text containing a single quote is wrapped in
/// double quotes, escaping the characters still special inside them.
/// Anything else has its special characters backslash-escaped. The result
/// carries its own quotes.
pub fn quote(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }

    let has_space = text.chars().any(char::is_whitespace);
    let has_double = text.contains('"');
    let has_single = text.contains('\'');

    if (has_space || has_double) && !has_single {
        return format!("'{}'", text);
    }

    if has_space || has_double || has_single {
        let mut out = String::with_capacity(text.len() + 2);
        out.push('"');
        for c in text.chars() {
            if matches!(c, '"' | '\\' | '$' | '`' | '!') {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
        return out;
    }

    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
