use crate::domain::render::extract_variables_from;
use crate::domain::{DomainError, TemplateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_BODY_LEN: usize = 10_000;

/// A named subject/body pair with `{name}` placeholders, bound to one channel type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub description: String,
    pub channel_type: String,
    pub subject: Option<String>,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub version: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl Template {
    #[must_use]
    pub fn new(
        id: TemplateId,
        name: impl Into<String>,
        channel_type: impl Into<String>,
        subject: Option<String>,
        body: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            channel_type: channel_type.into(),
            subject,
            body: body.into(),
            tags: BTreeSet::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Replaces subject and body and bumps the version.
    ///
    /// # Errors
    /// Returns `DomainError` and leaves the template untouched if the new
    /// content is invalid.
    pub fn update(&mut self, subject: Option<String>, body: String, now: i64) -> Result<(), DomainError> {
        validate_subject(subject.as_deref())?;
        validate_body(&body)?;
        self.subject = subject;
        self.body = body;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: i64) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
            self.updated_at = now;
            self.version += 1;
        }
    }

    /// Variables referenced by subject and body, first-seen order.
    #[must_use]
    pub fn required_variables(&self) -> Vec<String> {
        extract_variables_from(&[self.subject.as_deref().unwrap_or_default(), &self.body])
    }

    /// # Errors
    /// Returns the first violated field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::new("name", "must not be empty"));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::new("name", format!("must be at most {MAX_NAME_LEN} characters")));
        }
        if self.version == 0 {
            return Err(DomainError::new("version", "must be at least 1"));
        }
        validate_subject(self.subject.as_deref())?;
        validate_body(&self.body)
    }
}

fn validate_subject(subject: Option<&str>) -> Result<(), DomainError> {
    match subject {
        Some(s) if s.chars().count() > MAX_SUBJECT_LEN => {
            Err(DomainError::new("subject", format!("must be at most {MAX_SUBJECT_LEN} characters")))
        }
        _ => Ok(()),
    }
}

/// Template bodies hold 1 to 10000 characters.
///
/// # Errors
/// Returns `DomainError` when the body is empty or too long.
pub fn validate_body(body: &str) -> Result<(), DomainError> {
    let len = body.chars().count();
    if len == 0 {
        return Err(DomainError::new("body", "must not be empty"));
    }
    if len > MAX_BODY_LEN {
        return Err(DomainError::new("body", format!("must be at most {MAX_BODY_LEN} characters")));
    }
    Ok(())
}
