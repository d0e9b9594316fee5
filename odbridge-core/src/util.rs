use std::fmt::{self, Display, Write};

/// Text shortened to a readable length for errors and logs.
pub struct Truncated<'a>(&'a str);

impl<'a> Truncated<'a> {
    pub const LIMIT: usize = 497;

    pub fn new(text: &'a str) -> Self {
        Self(text)
    }
}

impl Display for Truncated<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= Self::LIMIT {
            return f.write_str(self.0.trim_end());
        }
        let mut end = Self::LIMIT;
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        write!(f, "{}...", self.0[..end].trim_end())
    }
}

#[macro_export]
macro_rules! truncate_long {
    ($text:expr) => {
        $crate::Truncated::new(::std::convert::AsRef::<str>::as_ref(&$text))
    };
}

/// Writes `value` as a connection string attribute value, wrapping it in
/// braces when it contains characters with a meaning in connection strings.
pub fn escape_attribute_value(out: &mut String, value: &str) {
    let needs_braces = value.starts_with('{')
        || value.starts_with(' ')
        || value.ends_with(' ')
        || value.contains([';', '}', '=', '[', ']', '(', ')', ',', '?', '*', '!', '@']);
    if needs_braces {
        out.push('{');
        for c in value.chars() {
            if c == '}' {
                out.push_str("}}");
            } else {
                out.push(c);
            }
        }
        out.push('}');
    } else {
        out.push_str(value);
    }
}

/// Appends `key=value;` to a connection string, adding the separator the
/// string might be missing.
pub fn append_attribute(out: &mut String, key: &str, value: &str) {
    if !out.is_empty() && !out.trim_end().ends_with(';') {
        out.push(';');
    }
    let _ = write!(out, "{}=", key);
    escape_attribute_value(out, value);
    out.push(';');
}

/// Splits a connection string into `(key, value)` pairs, removing braces from
/// the values. Keys keep their case.
pub fn parse_connection_string(input: &str) -> Vec<(String, String)> {
    let mut result = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches([';', ' ']);
        if rest.is_empty() {
            break;
        }
        let Some(eq) = rest.find('=') else {
            result.push((rest.trim().to_string(), String::new()));
            break;
        };
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();
        let mut value = String::new();
        if let Some(braced) = rest.strip_prefix('{') {
            let mut chars = braced.char_indices().peekable();
            let mut consumed = braced.len();
            while let Some((i, c)) = chars.next() {
                if c == '}' {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        value.push('}');
                        continue;
                    }
                    consumed = i + 1;
                    break;
                }
                value.push(c);
            }
            rest = &braced[consumed..];
            rest = match rest.find(';') {
                Some(i) => &rest[i..],
                None => "",
            };
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            value.push_str(rest[..end].trim_end());
            rest = &rest[end..];
        }
        result.push((key, value));
    }
    result
}

/// The connection string with passwords masked, for logs and error context.
pub fn redact_connection_string(input: &str) -> String {
    let mut out = String::new();
    for (key, value) in parse_connection_string(input) {
        if key.eq_ignore_ascii_case("PWD") || key.eq_ignore_ascii_case("PASSWORD") {
            append_attribute(&mut out, &key, "<redacted>");
        } else {
            append_attribute(&mut out, &key, &value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate() {
        assert_eq!(truncate_long!("short  ").to_string(), "short");
        let long = "é".repeat(400);
        let truncated = truncate_long!(long).to_string();
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= Truncated::LIMIT + 3);
    }

    #[test]
    fn append_credentials() {
        let mut out = "DSN=sales".to_string();
        append_attribute(&mut out, "UID", "admin");
        append_attribute(&mut out, "PWD", "p;a}ss");
        assert_eq!(out, "DSN=sales;UID=admin;PWD={p;a}}ss};");
        assert_eq!(
            parse_connection_string(&out),
            vec![
                ("DSN".to_string(), "sales".to_string()),
                ("UID".to_string(), "admin".to_string()),
                ("PWD".to_string(), "p;a}ss".to_string()),
            ]
        );
    }

    #[test]
    fn redact() {
        assert_eq!(
            redact_connection_string("DSN=sales;UID=admin;PWD={p;a}}ss}"),
            "DSN=sales;UID=admin;PWD=<redacted>;"
        );
    }

    #[test]
    fn parse_loose() {
        assert_eq!(
            parse_connection_string(" Driver = {Echo Driver} ;DATABASE=main;;flag"),
            vec![
                ("Driver".to_string(), "Echo Driver".to_string()),
                ("DATABASE".to_string(), "main".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
        assert!(parse_connection_string("").is_empty());
    }
}
