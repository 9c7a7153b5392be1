//! Contact form.

use crate::assertion::{expect, Expectation};
use crate::driver::SelectOption;
use crate::locator::{AriaRole, Locator};
use crate::page::Page;
use crate::page_object::PageObject;
use crate::result::HarnessResult;
use crate::wait::WaitState;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// Fields of the contact form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactField {
    /// "First name"
    FirstName,
    /// "Last name"
    LastName,
    /// "Email address"
    Email,
    /// "Subject" dropdown
    Subject,
    /// "Message"
    Message,
    /// File attachment
    Attachment,
}

impl ContactField {
    /// Mandatory fields, in form order
    pub const REQUIRED: [Self; 4] = [Self::FirstName, Self::LastName, Self::Email, Self::Message];

    /// Name used in labels and validation messages
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::FirstName => "First name",
            Self::LastName => "Last name",
            Self::Email => "Email",
            Self::Subject => "Subject",
            Self::Message => "Message",
            Self::Attachment => "Attachment",
        }
    }

    /// Validation message shown when the field is left empty
    #[must_use]
    pub fn required_message(&self) -> String {
        format!("{} is required", self.label())
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Values for a complete submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactFormFields {
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// E-mail address
    pub email: String,
    /// Subject choice
    pub subject: Option<SelectOption>,
    /// Message body (the site requires at least 50 characters)
    pub message: String,
    /// File to attach
    pub attachment: Option<PathBuf>,
}

impl ContactFormFields {
    /// Mandatory values only
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            subject: None,
            message: message.into(),
            attachment: None,
        }
    }

    /// Choose a subject
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<SelectOption>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a file
    #[must_use]
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }
}

/// `/contact`
#[derive(Debug, Clone)]
pub struct ContactForm {
    page: Page,
}

impl ContactForm {
    /// Page object on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    fn field(&self, field: ContactField) -> Locator {
        self.page.get_by_label(field.label())
    }

    fn alerts(&self) -> Locator {
        self.page.get_by_role(AriaRole::Alert)
    }

    /// Type into a text field
    pub async fn fill(&self, field: ContactField, value: &str) -> HarnessResult<()> {
        self.field(field).fill(value).await
    }

    /// Empty a text field
    pub async fn clear(&self, field: ContactField) -> HarnessResult<()> {
        self.field(field).clear().await
    }

    /// Choose a subject; returns the selected value
    pub async fn select_subject(&self, subject: impl Into<SelectOption>) -> HarnessResult<String> {
        self.field(ContactField::Subject).select_option(subject).await
    }

    /// Attach a file
    pub async fn attach(&self, path: impl Into<PathBuf>) -> HarnessResult<()> {
        let path: PathBuf = path.into();
        self.field(ContactField::Attachment)
            .set_input_files(&[path])
            .await
    }

    /// Fill every provided field
    pub async fn complete(&self, fields: &ContactFormFields) -> HarnessResult<()> {
        self.fill(ContactField::FirstName, &fields.first_name).await?;
        self.fill(ContactField::LastName, &fields.last_name).await?;
        self.fill(ContactField::Email, &fields.email).await?;
        if let Some(subject) = &fields.subject {
            self.select_subject(subject.clone()).await?;
        }
        self.fill(ContactField::Message, &fields.message).await?;
        if let Some(path) = &fields.attachment {
            self.attach(path.clone()).await?;
        }
        info!(email = %fields.email, "contact form completed");
        Ok(())
    }

    /// Press "Send"
    pub async fn submit(&self) -> HarnessResult<()> {
        self.page.get_by_role_named(AriaRole::Button, "Send").click().await
    }

    /// Current value of a field
    pub async fn value_of(&self, field: ContactField) -> HarnessResult<String> {
        self.field(field).input_value().await
    }

    /// Assertable value of a field
    #[must_use]
    pub fn field_value(&self, field: ContactField) -> Expectation {
        expect(&self.field(field))
    }

    /// File name shown by the attachment input
    pub async fn attachment_name(&self) -> HarnessResult<String> {
        let value = self.value_of(ContactField::Attachment).await?;
        Ok(value.rsplit(['\\', '/']).next().unwrap_or_default().to_string())
    }

    /// Validation error for a left-empty mandatory field
    #[must_use]
    pub fn field_error(&self, field: ContactField) -> Expectation {
        expect(&self.alerts().get_by_text(field.required_message()))
    }

    /// Every visible "... is required" message
    pub async fn required_errors(&self) -> HarnessResult<Vec<String>> {
        Ok(self
            .alerts()
            .all_inner_texts()
            .await?
            .into_iter()
            .filter(|text| text.ends_with("is required"))
            .collect())
    }

    /// Confirmation shown after a successful submission
    #[must_use]
    pub fn confirmation(&self) -> Expectation {
        expect(&self.alerts().get_by_text("Thanks for your message"))
    }
}

#[async_trait]
impl PageObject for ContactForm {
    fn page(&self) -> &Page {
        &self.page
    }

    fn route(&self) -> &str {
        "/contact"
    }

    async fn wait_until_loaded(&self) -> HarnessResult<()> {
        self.field(ContactField::FirstName)
            .wait_for(WaitState::Visible)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod field_tests {
        use super::*;

        #[test]
        fn test_required_messages() {
            let messages: Vec<String> = ContactField::REQUIRED
                .iter()
                .map(ContactField::required_message)
                .collect();
            assert_eq!(
                messages,
                vec![
                    "First name is required",
                    "Last name is required",
                    "Email is required",
                    "Message is required"
                ]
            );
        }

        #[test]
        fn test_fields_builder() {
            let fields = ContactFormFields::new("Gracie", "Gross", "gracie@example.test", "Hello")
                .with_subject("warranty")
                .with_attachment("tests/fixtures/data/test-data.txt");
            assert_eq!(fields.subject, Some(SelectOption::ByLabelOrValue("warranty".to_string())));
            assert!(fields.attachment.is_some());
        }
    }
}
