//! Schema-driven form validation.
//!
//! A [`Schema`] is an ordered table of fields, each with an ordered list of
//! [`Rule`]s. Validating a set of values yields, for every field that fails, the
//! message of its *first* failing rule; valid fields are absent from the map.
//!
//! [`Form`] is the editable state a page keeps around a schema: current values,
//! which fields the user has touched, which one has focus, and the errors from
//! the last validation. Errors are recomputed on every edit and on every submit
//! attempt, and [`Form::submit`] only hands out values when there are none.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use tracing::debug;
use url::Url;

/// Field values keyed by field name.
pub type FormValues = BTreeMap<&'static str, String>;

/// First failing message per invalid field.
pub type FieldErrors = BTreeMap<&'static str, &'static str>;

/// A predicate over one field value.
#[derive(Debug, Clone)]
pub enum Check {
    /// Not empty.
    Required,
    /// At least this many characters.
    MinLength(usize),
    /// The whole value matches the pattern.
    Matches(Regex),
    /// A syntactically valid URL. Empty values pass; pair with `Required`.
    Url,
}

impl Check {
    pub fn passes(&self, value: &str) -> bool {
        match self {
            Self::Required => !value.is_empty(),
            Self::MinLength(min) => value.chars().count() >= *min,
            Self::Matches(pattern) => pattern.is_match(value),
            Self::Url => value.is_empty() || is_valid_url(value),
        }
    }
}

fn is_valid_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https" | "ftp")
            && url.host_str().is_some_and(|host| !host.is_empty())
    })
}

/// A check and the message shown when it fails.
#[derive(Debug, Clone)]
pub struct Rule {
    check: Check,
    message: &'static str,
}

impl Rule {
    pub const fn new(check: Check, message: &'static str) -> Self {
        Self { check, message }
    }

    pub const fn required(message: &'static str) -> Self {
        Self::new(Check::Required, message)
    }

    pub const fn min_length(min: usize, message: &'static str) -> Self {
        Self::new(Check::MinLength(min), message)
    }

    pub fn matches(pattern: Regex, message: &'static str) -> Self {
        Self::new(Check::Matches(pattern), message)
    }

    pub const fn url(message: &'static str) -> Self {
        Self::new(Check::Url, message)
    }

    pub const fn message(&self) -> &'static str {
        self.message
    }
}

/// One input of a form.
#[derive(Debug, Clone)]
pub struct Field {
    name: &'static str,
    label: &'static str,
    secret: bool,
    rules: Vec<Rule>,
}

impl Field {
    pub const fn new(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            secret: false,
            rules: Vec::new(),
        }
    }

    /// Masks the value when rendered.
    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn label(&self) -> &'static str {
        self.label
    }

    pub const fn is_secret(&self) -> bool {
        self.secret
    }

    /// The message of the first rule `value` fails, in declaration order.
    pub fn first_error(&self, value: &str) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|rule| !rule.check.passes(value))
            .map(Rule::message)
    }
}

/// The ordered field table of a form.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validates `values`. A field missing from `values` is validated as empty.
    pub fn validate(&self, values: &FormValues) -> FieldErrors {
        self.fields
            .iter()
            .filter_map(|field| {
                let value = values.get(field.name).map_or("", String::as_str);
                field.first_error(value).map(|message| (field.name, message))
            })
            .collect()
    }
}

/// When a submitted form is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// As soon as a valid submission is handed out, before the request settles.
    #[default]
    OnSubmit,
    /// Only once the request triggered by the submission succeeds.
    OnSuccess,
}

/// Editable state of one form.
#[derive(Debug, Clone)]
pub struct Form {
    schema: Schema,
    values: FormValues,
    errors: FieldErrors,
    touched: BTreeSet<&'static str>,
    focus: usize,
    reset_policy: ResetPolicy,
}

impl Form {
    pub fn new(schema: Schema, reset_policy: ResetPolicy) -> Self {
        let values = Self::empty_values(&schema);
        let errors = schema.validate(&values);
        Self {
            schema,
            values,
            errors,
            touched: BTreeSet::new(),
            focus: 0,
            reset_policy,
        }
    }

    fn empty_values(schema: &Schema) -> FormValues {
        schema
            .fields()
            .iter()
            .map(|field| (field.name(), String::new()))
            .collect()
    }

    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    pub const fn reset_policy(&self) -> ResetPolicy {
        self.reset_policy
    }

    pub const fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map_or("", String::as_str)
    }

    pub const fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The error to display for `name`: only fields the user has touched show
    /// one.
    pub fn visible_error(&self, name: &str) -> Option<&'static str> {
        if self.touched.contains(name) {
            self.errors.get(name).copied()
        } else {
            None
        }
    }

    /// Replaces a field value, marks it touched and revalidates. Unknown names
    /// are ignored.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) {
        let Some(field) = self.schema.fields().iter().find(|f| f.name() == name) else {
            debug!(field = name, "ignoring value for unknown form field");
            return;
        };
        let name = field.name();
        self.values.insert(name, value.into());
        self.touched.insert(name);
        self.revalidate();
    }

    fn revalidate(&mut self) {
        self.errors = self.schema.validate(&self.values);
    }

    pub fn focused(&self) -> Option<&Field> {
        self.schema.fields().get(self.focus)
    }

    pub const fn focus_index(&self) -> usize {
        self.focus
    }

    pub fn is_first_focused(&self) -> bool {
        self.focus == 0
    }

    pub fn is_last_focused(&self) -> bool {
        self.focus + 1 >= self.schema.fields().len()
    }

    pub fn focus_first(&mut self) {
        self.focus = 0;
    }

    pub fn focus_last(&mut self) {
        self.focus = self.schema.fields().len().saturating_sub(1);
    }

    /// Moves focus to the next field, wrapping around.
    pub fn focus_next(&mut self) {
        let len = self.schema.fields().len();
        if len > 0 {
            self.focus = (self.focus + 1) % len;
        }
    }

    /// Moves focus to the previous field, wrapping around.
    pub fn focus_prev(&mut self) {
        let len = self.schema.fields().len();
        if len > 0 {
            self.focus = (self.focus + len - 1) % len;
        }
    }

    /// Appends a character to the focused field.
    pub fn input(&mut self, c: char) {
        if let Some(name) = self.focused().map(Field::name) {
            let mut value = self.value(name).to_string();
            value.push(c);
            self.set_value(name, value);
        }
    }

    /// Deletes the last character of the focused field.
    pub fn backspace(&mut self) {
        if let Some(name) = self.focused().map(Field::name) {
            let mut value = self.value(name).to_string();
            value.pop();
            self.set_value(name, value);
        }
    }

    /// Attempts a submission.
    ///
    /// Every field becomes touched so all errors show. Returns the values only
    /// when the form is valid; with [`ResetPolicy::OnSubmit`] the form is
    /// cleared at the same time.
    pub fn submit(&mut self) -> Option<FormValues> {
        self.touched
            .extend(self.schema.fields().iter().map(Field::name));
        self.revalidate();

        if !self.is_valid() {
            debug!(errors = self.errors.len(), "form submission blocked");
            return None;
        }

        let values = self.values.clone();
        if self.reset_policy == ResetPolicy::OnSubmit {
            self.reset();
        }
        Some(values)
    }

    /// Tells the form how the request behind its last submission ended.
    pub fn on_settled(&mut self, success: bool) {
        if success && self.reset_policy == ResetPolicy::OnSuccess {
            self.reset();
        }
    }

    /// Empties every field and forgets what was touched.
    pub fn reset(&mut self) {
        self.values = Self::empty_values(&self.schema);
        self.touched.clear();
        self.focus = 0;
        self.revalidate();
    }
}
