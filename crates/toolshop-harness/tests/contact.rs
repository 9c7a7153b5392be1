//! Contact form: completion, attachments and mandatory-field validation.

mod support;

use test_case::test_case;
use toolshop_harness::fixture::CONTACT_ATTACHMENT;
use toolshop_harness::prelude::*;

const MESSAGE: &str = "Hello, I would like to know whether the bolt cutters come with a warranty.";

/// Contact form of one case
struct ContactScenario {
    context: BrowsingContext,
    form: ContactForm,
}

impl ContactScenario {
    async fn open(session: &Session) -> Self {
        let (context, page) = support::home(session).await;
        let shop = Storefront::new(page);
        shop.navbar().open_contact().await.unwrap();
        let form = shop.contact();
        form.wait_until_loaded().await.unwrap();
        assert!(form.is_current().await.unwrap());
        Self { context, form }
    }

    async fn close(self) {
        self.context.close().await.unwrap();
    }
}

fn valid_fields() -> ContactFormFields {
    ContactFormFields::new("Sarah-Jane", "Smith", "sarah@example.com", MESSAGE)
}

#[tokio::test]
async fn complete_the_form() {
    let (session, _launcher) = support::session().await;
    let scenario = ContactScenario::open(&session).await;
    let form = &scenario.form;
    let attachment = FixtureFiles::from_manifest_dir().path(CONTACT_ATTACHMENT).unwrap();

    form.complete(
        &valid_fields()
            .with_subject("warranty")
            .with_attachment(attachment),
    )
    .await
    .unwrap();

    form.field_value(ContactField::FirstName).to_have_value("Sarah-Jane").await.unwrap();
    form.field_value(ContactField::LastName).to_have_value("Smith").await.unwrap();
    form.field_value(ContactField::Email).to_have_value("sarah@example.com").await.unwrap();
    form.field_value(ContactField::Message).to_have_value(MESSAGE).await.unwrap();
    assert_eq!(form.value_of(ContactField::Subject).await.unwrap(), "warranty");
    assert_eq!(form.attachment_name().await.unwrap(), "test-data.txt");
    assert!(form.value_of(ContactField::Attachment).await.unwrap().ends_with("test-data.txt"));
    scenario.close().await;
}

#[tokio::test]
async fn subject_can_be_chosen_by_text_index_or_value() {
    let (session, _launcher) = support::session().await;
    let scenario = ContactScenario::open(&session).await;
    let form = &scenario.form;

    assert_eq!(
        form.select_subject(SelectOption::ByText("Customer service".to_string())).await.unwrap(),
        "customer-service"
    );
    assert_eq!(form.select_subject(SelectOption::ByIndex(2)).await.unwrap(), "webmaster");
    assert_eq!(
        form.select_subject(SelectOption::ByValue("return".to_string())).await.unwrap(),
        "return"
    );
    assert!(form
        .select_subject(SelectOption::ByValue("complaints".to_string()))
        .await
        .is_err());
    scenario.close().await;
}

#[tokio::test]
async fn valid_submission_is_confirmed() {
    let (session, _launcher) = support::session().await;
    let scenario = ContactScenario::open(&session).await;
    let form = &scenario.form;
    form.complete(&valid_fields().with_subject("payments")).await.unwrap();
    form.submit().await.unwrap();
    form.confirmation().to_be_visible().await.unwrap();
    assert!(form.required_errors().await.unwrap().is_empty());
    scenario.close().await;
}

#[test_case(ContactField::FirstName ; "first name")]
#[test_case(ContactField::LastName ; "last name")]
#[test_case(ContactField::Email ; "email")]
#[test_case(ContactField::Message ; "message")]
#[tokio::test]
async fn mandatory_field_left_empty(field: ContactField) {
    let (session, _launcher) = support::session().await;
    let scenario = ContactScenario::open(&session).await;
    let form = &scenario.form;

    form.complete(&valid_fields()).await.unwrap();
    form.clear(field).await.unwrap();
    form.submit().await.unwrap();

    form.field_error(field).to_be_visible().await.unwrap();
    assert_eq!(form.required_errors().await.unwrap(), vec![field.required_message()]);
    scenario.close().await;
}

#[tokio::test]
async fn empty_form_reports_every_mandatory_field() {
    let (session, _launcher) = support::session().await;
    let scenario = ContactScenario::open(&session).await;
    scenario.form.submit().await.unwrap();

    let mut soft = SoftAssertions::new();
    for field in ContactField::REQUIRED {
        soft.check(
            scenario.form.field_error(field).to_be_visible().await,
            &field.required_message(),
        );
    }
    soft.assert_eq(
        &scenario.form.required_errors().await.unwrap().len(),
        &ContactField::REQUIRED.len(),
        "one error per mandatory field",
    );
    soft.verify().unwrap();
    scenario.close().await;
}

#[tokio::test]
async fn missing_attachment_is_a_fixture_error() {
    let (session, _launcher) = support::session().await;
    let scenario = ContactScenario::open(&session).await;
    let err = scenario.form.attach("tests/fixtures/data/missing.txt").await.unwrap_err();
    assert!(matches!(err, HarnessError::Fixture { .. }));
    scenario.close().await;
}
