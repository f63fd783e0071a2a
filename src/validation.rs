//! Contact form fields and their validation rules.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_PERSON_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z\s'-]+$").unwrap());
static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// The submitted contact form, with wire field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

/// A form field that carries a validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Email,
    Subject,
    Message,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Name, Field::Email, Field::Subject, Field::Message];

    /// Wire name, used to key field-level errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Subject => "subject",
            Field::Message => "message",
        }
    }

    pub fn rule(&self) -> FieldRule {
        match self {
            Field::Name => FieldRule {
                min_chars: Some(2),
                max_chars: Some(50),
                pattern: Some(Pattern::PersonName),
                error: "Please enter a valid name (2-50 characters, letters only)",
            },
            Field::Email => FieldRule {
                min_chars: None,
                max_chars: None,
                pattern: Some(Pattern::Email),
                error: "Please enter a valid email address",
            },
            Field::Subject => FieldRule {
                min_chars: Some(3),
                max_chars: Some(100),
                pattern: None,
                error: "Subject must be between 3-100 characters",
            },
            Field::Message => FieldRule {
                min_chars: Some(10),
                max_chars: Some(1000),
                pattern: None,
                error: "Message must be between 10-1000 characters",
            },
        }
    }

    fn value<'a>(&self, form: &'a ContactForm) -> &'a str {
        match self {
            Field::Name => &form.name,
            Field::Email => &form.email,
            Field::Subject => &form.subject,
            Field::Message => &form.message,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Character patterns a field value must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// ASCII letters, whitespace, apostrophes and hyphens
    PersonName,
    /// `local@domain.tld`, case-insensitive
    Email,
}

impl Pattern {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::PersonName => RE_PERSON_NAME.is_match(value),
            Pattern::Email => is_email(value),
        }
    }
}

/// Length and pattern constraints for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub min_chars: Option<usize>,
    pub max_chars: Option<usize>,
    pub pattern: Option<Pattern>,
    pub error: &'static str,
}

pub const REQUIRED_MESSAGE: &str = "This field is required";

impl FieldRule {
    /// Check a trimmed value. Pattern first, then length.
    pub fn check(&self, value: &str) -> Result<(), &'static str> {
        if value.is_empty() {
            return Err(REQUIRED_MESSAGE);
        }
        if let Some(pattern) = self.pattern {
            if !pattern.matches(value) {
                return Err(self.error);
            }
        }

        let chars = value.chars().count();
        if self.min_chars.is_some_and(|min| chars < min) {
            return Err(self.error);
        }
        if self.max_chars.is_some_and(|max| chars > max) {
            return Err(self.error);
        }
        Ok(())
    }
}

/// Field-level validation failures, keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<Field, &'static str>);

impl FieldErrors {
    pub fn get(&self, field: Field) -> Option<&'static str> {
        self.0.get(&field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &'static str)> + '_ {
        self.0.iter().map(|(field, msg)| (*field, *msg))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First failing field in form order, for focusing.
    pub fn first(&self) -> Option<Field> {
        self.0.keys().next().copied()
    }
}

/// Form values after trimming, all rules satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedForm {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// Validate every field of `form`, reporting all failures at once.
pub fn validate(form: &ContactForm) -> Result<ValidatedForm, FieldErrors> {
    let mut errors = FieldErrors::default();

    for field in Field::ALL {
        if let Err(msg) = field.rule().check(field.value(form).trim()) {
            errors.0.insert(field, msg);
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidatedForm {
        name: form.name.trim().to_string(),
        email: form.email.trim().to_string(),
        subject: form.subject.trim().to_string(),
        message: form.message.trim().to_string(),
    })
}

/// `local@domain.tld`, letters compared case-insensitively.
pub fn is_email(value: &str) -> bool {
    RE_EMAIL.is_match(value)
}
