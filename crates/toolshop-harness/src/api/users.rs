//! Customer accounts: generated users, registration and login.

use super::client::{str_field, ApiClient};
use crate::result::{HarnessError, HarnessResult};
use chrono::{Duration as Days, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const FIRST_NAMES: [&str; 8] = ["Sarah", "Ahmed", "Mei", "Lucas", "Amara", "Jonas", "Priya", "Tomas"];
const LAST_NAMES: [&str; 8] = ["Okafor", "Lindqvist", "Moreau", "Tanaka", "Silva", "Novak", "Hughes", "Park"];
const STREETS: [&str; 5] = ["Main Street", "Harbour Road", "Station Lane", "Mill Way", "Park Avenue"];
const CITIES: [(&str, &str, &str); 4] = [
    ("Utrecht", "Utrecht", "NL"),
    ("Leeds", "West Yorkshire", "GB"),
    ("Austin", "Texas", "US"),
    ("Lyon", "Auvergne-Rhone-Alpes", "FR"),
];

/// Postal address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Street and number
    pub street: String,
    /// City
    pub city: String,
    /// State or region
    pub state: String,
    /// ISO country code
    pub country: String,
    /// Postal code
    pub postal_code: String,
}

/// Registration payload; the API never returns the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Postal address
    pub address: Address,
    /// Phone number
    pub phone: String,
    /// Date of birth (`YYYY-MM-DD`)
    pub dob: String,
    /// Unique e-mail address
    pub email: String,
    /// Plain-text password, absent in API responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl User {
    /// Plausible adult customer with a unique e-mail and a strong password
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Sarah");
        let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Okafor");
        let street = STREETS.choose(&mut rng).copied().unwrap_or("Main Street");
        let (city, state, country) = CITIES.choose(&mut rng).copied().unwrap_or(CITIES[0]);
        let tag = Uuid::new_v4().simple().to_string();
        let age_days = rng.gen_range(18 * 365..80 * 365);
        let dob = (Utc::now().date_naive() - Days::days(age_days)).format("%Y-%m-%d");
        Self {
            first_name: first.to_string(),
            last_name: last.to_string(),
            address: Address {
                street: format!("{} {street}", rng.gen_range(1..400)),
                city: city.to_string(),
                state: state.to_string(),
                country: country.to_string(),
                postal_code: format!("{:05}", rng.gen_range(1000..99_999)),
            },
            phone: format!("06{:08}", rng.gen_range(0..100_000_000)),
            dob: dob.to_string(),
            email: format!(
                "{}.{}.{}@example.test",
                first.to_lowercase(),
                last.to_lowercase(),
                &tag[..12]
            ),
            password: Some(format!("Tl-{}!9a", &tag[12..24])),
        }
    }

    /// Same user with a different password (or none)
    #[must_use]
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }
}

/// Result of `POST /users/register`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    /// Identifier assigned by the API
    pub id: String,
    /// HTTP status of the registration
    pub status: u16,
    /// User as echoed back by the API
    pub user: User,
}

/// `/users` endpoints
#[derive(Debug, Clone)]
pub struct UsersApi {
    client: ApiClient,
}

impl UsersApi {
    /// Endpoints on `client`
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `POST /users/register`
    pub async fn register(&self, user: &User) -> HarnessResult<RegisteredUser> {
        let document = self.client.post_json("/users/register", user).await?;
        let id = id_of(&document.body).map_err(|e| relabel(e, &document.url))?;
        info!(%id, email = %user.email, "registered user");
        Ok(RegisteredUser {
            id,
            status: document.status,
            user: document.deserialize()?,
        })
    }

    /// `POST /users/login`; returns the access token
    pub async fn login(&self, email: &str, password: &str) -> HarnessResult<String> {
        let body = serde_json::json!({ "email": email, "password": password });
        let document = self.client.post_json("/users/login", &body).await?;
        str_field(&document.body, "access_token")
            .map(str::to_string)
            .map_err(|e| relabel(e, &document.url))
    }

    /// `GET /users/{id}` with a bearer token
    pub async fn fetch(&self, id: &str, token: &str) -> HarnessResult<User> {
        let document = self
            .client
            .fetch_json_authorized(&format!("/users/{id}"), token)
            .await?;
        document.deserialize()
    }
}

fn id_of(body: &serde_json::Value) -> HarnessResult<String> {
    match body.get("id") {
        Some(serde_json::Value::String(id)) => Ok(id.clone()),
        Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
        _ => Err(HarnessError::parse("", "missing field 'id'")),
    }
}

fn relabel(error: HarnessError, url: &str) -> HarnessError {
    match error {
        HarnessError::ParseFailure { message, .. } => HarnessError::parse(url, message),
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    mod user_tests {
        use super::*;

        #[test]
        fn test_random_users_are_unique_and_complete() {
            let a = User::random();
            let b = User::random();
            assert_ne!(a.email, b.email);
            assert!(a.email.ends_with("@example.test"));
            assert_eq!(a.dob.len(), 10);
            assert_eq!(a.address.postal_code.len(), 5);
            assert!(a.password.as_deref().is_some_and(|p| p.len() >= 8));
        }

        #[test]
        fn test_password_is_not_serialized_when_absent() {
            let user = User::random().with_password(None);
            let value = serde_json::to_value(&user).unwrap();
            assert!(value.get("password").is_none());
            assert_eq!(value["address"]["country"], json!(user.address.country));
        }

        #[test]
        fn test_response_with_extra_fields_parses() {
            let user = User::random();
            let mut value = serde_json::to_value(user.clone().with_password(None)).unwrap();
            value["id"] = json!("01JABC");
            value["created_at"] = json!("2026-10-16 10:00:00");
            let parsed: User = serde_json::from_value(value.clone()).unwrap();
            assert_eq!(parsed, user.with_password(None));
            assert_eq!(id_of(&value).unwrap(), "01JABC");
        }
    }
}
