//! Declarative per-field validation. Each field reports the message of its
//! first failing rule; passing fields have no entry.

use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;
use shared::domain::UserFields;

pub type FormValues = BTreeMap<String, String>;
pub type FieldErrors = BTreeMap<String, String>;

pub const FIRST_NAME: &str = "firstName";
pub const LAST_NAME: &str = "lastName";
pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";

const NAME_MIN_CHARS: usize = 3;
const NAME_MAX_CHARS: usize = 100;
const PHONE_CHARS: usize = 10;
const PHONE_PATTERN: &str = r"^[6-9][0-9]{9}$";
const EMAIL_PATTERN: &str =
    r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$";

#[derive(Debug, Clone)]
enum Check {
    NonEmpty,
    MinChars(usize),
    MaxChars(usize),
    ExactChars(usize),
    Pattern(Regex),
    Email,
}

#[derive(Debug, Clone)]
pub struct Rule {
    check: Check,
    message: String,
}

impl Rule {
    pub fn non_empty(message: impl Into<String>) -> Self {
        Self::with(Check::NonEmpty, message)
    }

    pub fn min_length(chars: usize, message: impl Into<String>) -> Self {
        Self::with(Check::MinChars(chars), message)
    }

    pub fn max_length(chars: usize, message: impl Into<String>) -> Self {
        Self::with(Check::MaxChars(chars), message)
    }

    pub fn exact_length(chars: usize, message: impl Into<String>) -> Self {
        Self::with(Check::ExactChars(chars), message)
    }

    pub fn pattern(regex: Regex, message: impl Into<String>) -> Self {
        Self::with(Check::Pattern(regex), message)
    }

    pub fn email(message: impl Into<String>) -> Self {
        Self::with(Check::Email, message)
    }

    fn with(check: Check, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn passes(&self, value: &str) -> bool {
        match &self.check {
            Check::NonEmpty => !value.is_empty(),
            Check::MinChars(min) => value.chars().count() >= *min,
            Check::MaxChars(max) => value.chars().count() <= *max,
            Check::ExactChars(len) => value.chars().count() == *len,
            Check::Pattern(regex) => regex.is_match(value),
            Check::Email => is_email(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    name: String,
    rules: Vec<Rule>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_failure(&self, value: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| !rule.passes(value))
            .map(Rule::message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldSchema::name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }

    pub fn default_values(&self) -> FormValues {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), String::new()))
            .collect()
    }

    /// Absent values are validated as empty strings.
    pub fn validate(&self, values: &FormValues) -> FieldErrors {
        self.fields
            .iter()
            .filter_map(|field| {
                let value = values.get(&field.name).map(String::as_str).unwrap_or("");
                field
                    .first_failure(value)
                    .map(|message| (field.name.clone(), message.to_string()))
            })
            .collect()
    }

    pub fn validate_field(&self, name: &str, value: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .and_then(|field| field.first_failure(value))
            .map(str::to_string)
    }
}

fn is_email(value: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let email_regex =
        EMAIL_REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"));

    !value.starts_with('.') && !value.contains("..") && email_regex.is_match(value)
}

pub fn user_schema() -> &'static Schema {
    static USER_SCHEMA: OnceLock<Schema> = OnceLock::new();
    USER_SCHEMA.get_or_init(|| {
        let phone_regex = Regex::new(PHONE_PATTERN).expect("phone pattern compiles");
        Schema::new()
            .field(
                FieldSchema::new(FIRST_NAME)
                    .rule(Rule::min_length(
                        NAME_MIN_CHARS,
                        "First name must be at least 3 characters!",
                    ))
                    .rule(Rule::max_length(
                        NAME_MAX_CHARS,
                        "First name can be at max 100 characters!",
                    )),
            )
            .field(
                FieldSchema::new(LAST_NAME)
                    .rule(Rule::min_length(
                        NAME_MIN_CHARS,
                        "Last name must be at least 3 characters!",
                    ))
                    .rule(Rule::max_length(
                        NAME_MAX_CHARS,
                        "Last name can be at max 100 characters!",
                    )),
            )
            .field(
                FieldSchema::new(EMAIL)
                    .rule(Rule::non_empty("Email is required!"))
                    .rule(Rule::email("This is not a valid email!")),
            )
            .field(
                FieldSchema::new(PHONE)
                    .rule(Rule::exact_length(
                        PHONE_CHARS,
                        "Phone number must be exactly 10 characters!",
                    ))
                    .rule(Rule::pattern(
                        phone_regex,
                        "This is not a valid phone number!",
                    )),
            )
    })
}

pub fn user_values(fields: &UserFields) -> FormValues {
    FormValues::from([
        (FIRST_NAME.to_string(), fields.first_name.clone()),
        (LAST_NAME.to_string(), fields.last_name.clone()),
        (EMAIL.to_string(), fields.email.clone()),
        (PHONE.to_string(), fields.phone.clone()),
    ])
}

/// User fields that passed [`user_schema`]. Mutations only accept this type,
/// so an unvalidated record cannot reach the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidUser(UserFields);

impl ValidUser {
    pub fn parse(values: &FormValues) -> Result<Self, FieldErrors> {
        let errors = user_schema().validate(values);
        if !errors.is_empty() {
            return Err(errors);
        }
        let value = |name: &str| values.get(name).cloned().unwrap_or_default();
        Ok(Self(UserFields {
            first_name: value(FIRST_NAME),
            last_name: value(LAST_NAME),
            email: value(EMAIL),
            phone: value(PHONE),
        }))
    }

    pub fn from_fields(fields: UserFields) -> Result<Self, FieldErrors> {
        Self::parse(&user_values(&fields))
    }

    pub fn fields(&self) -> &UserFields {
        &self.0
    }

    pub fn into_inner(self) -> UserFields {
        self.0
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
