//! PII redaction for `key=value` log messages.
//!
//! Given `name=bob;email=a@b.com;password=x;` and the fields
//! `email`, `password`, the values are masked in place:
//! `name=bob;email=***;password=***;`.
//!
//! A field only matches on a name boundary (start of message, right after a
//! separator, or after whitespace), so `name` never rewrites `username=`.

use anyhow::{Result, bail};
use regex::Regex;

/// Default mask replacement string.
pub const DEFAULT_MASK: &str = "***";

/// Default separator between `key=value` pairs.
pub const DEFAULT_SEPARATOR: &str = ";";

/// Fields treated as personal or secret data in log output.
pub const PII_FIELDS: &[&str] = &[
    "name",
    "email",
    "phone",
    "ssn",
    "password",
    "hashed_password",
    "session_id",
    "reset_token",
];

/// Precompiled redactor for a fixed field list.
#[derive(Debug, Clone)]
pub struct PiiRedactor {
    fields: Vec<String>,
    patterns: Vec<Regex>,
    mask: String,
}

impl PiiRedactor {
    /// Build a redactor. Fields are applied in the order given.
    pub fn new<S: AsRef<str>>(fields: &[S], mask: &str, separator: &str) -> Result<Self> {
        if separator.is_empty() {
            bail!("Redaction separator cannot be empty");
        }

        let sep = regex::escape(separator);
        let patterns = fields
            .iter()
            .map(|field| {
                let pattern = format!(
                    r"(?:^|{sep}|\s){field}=(?P<value>.*?){sep}",
                    sep = sep,
                    field = regex::escape(field.as_ref()),
                );
                Regex::new(&pattern)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            patterns,
            mask: mask.to_string(),
        })
    }

    /// Redactor over [`PII_FIELDS`] with the default mask and separator.
    pub fn pii() -> Result<Self> {
        Self::new(PII_FIELDS, DEFAULT_MASK, DEFAULT_SEPARATOR)
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Whether a structured field called `name` must be masked.
    pub fn masks_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field == name)
    }

    /// Mask every listed field in `message`.
    pub fn redact(&self, message: &str) -> String {
        let mut current = message.to_string();
        for pattern in &self.patterns {
            current = mask_values(pattern, &self.mask, &current);
        }
        current
    }
}

/// Replace each `value` capture of `pattern` with `mask`.
///
/// Scanning resumes at the trailing separator of the previous match so that
/// separator can open the next `field=` occurrence.
fn mask_values(pattern: &Regex, mask: &str, message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = pattern.captures_at(message, pos) {
        let Some(value) = caps.name("value") else {
            break;
        };
        out.push_str(&message[copied..value.start()]);
        out.push_str(mask);
        copied = value.end();
        pos = value.end();
    }

    out.push_str(&message[copied..]);
    out
}

/// Mask the values of `fields` in `message`.
///
/// If the redactor cannot be built (for example an empty separator), the
/// whole message is replaced by `mask` rather than returned unredacted.
pub fn redact<S: AsRef<str>>(fields: &[S], mask: &str, message: &str, separator: &str) -> String {
    match PiiRedactor::new(fields, mask, separator) {
        Ok(redactor) => redactor.redact(message),
        Err(_) => mask.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_listed_fields() {
        let out = redact(
            &["email", "password"],
            "***",
            "name=bob;email=a@b.com;password=x;",
            ";",
        );
        assert_eq!(out, "name=bob;email=***;password=***;");
    }

    #[test]
    fn test_custom_mask_and_separator() {
        let out = redact(
            &["password", "date_of_birth"],
            "xxx",
            "name=egg|email=eggmin@eggsample.com|password=eggcellent|date_of_birth=12/12/1986|",
            "|",
        );
        assert_eq!(
            out,
            "name=egg|email=eggmin@eggsample.com|password=xxx|date_of_birth=xxx|"
        );
    }

    #[test]
    fn test_name_boundary() {
        let out = redact(&["name"], "***", "username=root;name=bob;", ";");
        assert_eq!(out, "username=root;name=***;");
    }

    #[test]
    fn test_whitespace_is_a_boundary() {
        let out = redact(&["email", "ssn"], "***", "name=bob; email=a@b.com; ssn=123;", ";");
        assert_eq!(out, "name=bob; email=***; ssn=***;");
    }

    #[test]
    fn test_repeated_field_adjacent() {
        let out = redact(&["email"], "***", "email=a@b.com;email=c@d.com;", ";");
        assert_eq!(out, "email=***;email=***;");
    }

    #[test]
    fn test_value_without_trailing_separator_is_kept() {
        let out = redact(&["email"], "***", "email=a@b.com", ";");
        assert_eq!(out, "email=a@b.com");
    }

    #[test]
    fn test_empty_value_is_masked() {
        let out = redact(&["password"], "***", "password=;", ";");
        assert_eq!(out, "password=***;");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let out = redact(&["a.b"], "***", "axb=1;a.b=2;", ";");
        assert_eq!(out, "axb=1;a.b=***;");

        // a `$` in the mask is not a capture reference
        let out = redact(&["k"], "$1", "k=v;", ";");
        assert_eq!(out, "k=$1;");
    }

    #[test]
    fn test_multi_char_separator() {
        let out = redact(&["ssn"], "***", "ssn=123-45-6789, phone=555, ", ", ");
        assert_eq!(out, "ssn=***, phone=555, ");
    }

    #[test]
    fn test_empty_separator_fails_closed() {
        assert!(PiiRedactor::new(&["email"], "***", "").is_err());
        assert_eq!(redact(&["email"], "***", "email=a@b.com", ""), "***");
    }

    #[test]
    fn test_default_pii_redactor() {
        let redactor = PiiRedactor::pii().unwrap();
        let out = redactor.redact("user_id=7; email=bob@dylan.com; hashed_password=$argon2id$v=19$x; session_id=abc;");
        assert_eq!(out, "user_id=7; email=***; hashed_password=***; session_id=***;");
        assert_eq!(redactor.mask(), DEFAULT_MASK);
    }

    #[test]
    fn test_masks_field_by_exact_name() {
        let redactor = PiiRedactor::new(&["email", "ssn"], "***", ";").unwrap();
        assert!(redactor.masks_field("email"));
        assert!(redactor.masks_field("ssn"));
        assert!(!redactor.masks_field("user_id"));
        assert!(!redactor.masks_field("mail"));
    }
}
