use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::instrument;

use crate::users::{
    dto::{Registration, RegistrationRequest},
    repo::{RepoResult, UserRepository},
};

pub const USERNAME_EMPTY: &str = "Username cannot be empty";
pub const USERNAME_SIZE: &str = "Must be between 4 and 20 characters";
pub const EMAIL_EMPTY: &str = "Email cannot be empty";
pub const EMAIL_INVALID: &str = "Email is not valid";
pub const EMAIL_IN_USE: &str = "Email in use";
pub const PASSWORD_EMPTY: &str = "Password cannot be empty";
pub const PASSWORD_SIZE: &str = "Password must be at least 6 characters";
pub const PASSWORD_PATTERN: &str =
    "Password must have at least 1 uppercase, 1 lowercase letter and 1 number";

const USERNAME_MIN: usize = 4;
const USERNAME_MAX: usize = 20;
const PASSWORD_MIN: usize = 6;

/// Field name to the first rule that field failed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, &'static str>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field` unless the field already has an error.
    pub fn add(&mut self, field: &'static str, message: &'static str) {
        self.0.entry(field).or_insert(message);
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        // Dot-separated local part; domain labels are non-empty, alphanumeric at
        // both ends, and the name ends in an alphabetic TLD.
        static ref EMAIL_RE: Regex = Regex::new(
            r"(?i)^[^@\s.]+(?:\.[^@\s.]+)*@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$"
        )
        .unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn sanitize(value: Option<String>) -> String {
    value.map(|v| v.trim().to_lowercase()).unwrap_or_default()
}

fn check_username(username: &str) -> Option<&'static str> {
    let len = username.chars().count();
    if username.is_empty() {
        Some(USERNAME_EMPTY)
    } else if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        Some(USERNAME_SIZE)
    } else {
        None
    }
}

fn check_email(email: &str) -> Option<&'static str> {
    if email.is_empty() {
        Some(EMAIL_EMPTY)
    } else if !is_valid_email(email) {
        Some(EMAIL_INVALID)
    } else {
        None
    }
}

fn check_password(password: &str) -> Option<&'static str> {
    if password.is_empty() {
        return Some(PASSWORD_EMPTY);
    }
    if password.chars().count() < PASSWORD_MIN {
        return Some(PASSWORD_SIZE);
    }
    let lower = password.chars().any(|c| c.is_lowercase());
    let upper = password.chars().any(|c| c.is_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if lower && upper && digit {
        None
    } else {
        Some(PASSWORD_PATTERN)
    }
}

/// Trims and lower-cases username and email. Missing fields become empty strings.
pub fn normalize(req: RegistrationRequest) -> Registration {
    Registration {
        username: sanitize(req.username),
        email: sanitize(req.email),
        password: req.password.unwrap_or_default(),
    }
}

/// Applies every rule that needs no storage lookup, one message per failing field.
pub fn check_fields(reg: &Registration) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if let Some(msg) = check_username(&reg.username) {
        errors.add("username", msg);
    }
    if let Some(msg) = check_email(&reg.email) {
        errors.add("email", msg);
    }
    if let Some(msg) = check_password(&reg.password) {
        errors.add("password", msg);
    }
    errors
}

/// Adds `Email in use` when `email` already belongs to a stored user.
///
/// Skipped when the email already failed a structural rule, so the first
/// failing rule is the one reported.
#[instrument(skip(repo, errors))]
pub async fn check_email_available(
    repo: &dyn UserRepository,
    errors: &mut ValidationErrors,
    email: &str,
) -> RepoResult<()> {
    if errors.get("email").is_some() {
        return Ok(());
    }
    if repo.find_by_email(email).await?.is_some() {
        errors.add("email", EMAIL_IN_USE);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{repo::InMemoryUserRepository, repo_types::NewUser};

    fn request(
        username: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> RegistrationRequest {
        RegistrationRequest {
            username: username.map(String::from),
            email: email.map(String::from),
            password: password.map(String::from),
        }
    }

    fn validate(req: RegistrationRequest) -> Result<Registration, ValidationErrors> {
        let reg = normalize(req);
        check_fields(&reg).into_result(reg)
    }

    fn valid() -> RegistrationRequest {
        request(Some("user1"), Some("user1@mail.com"), Some("P4ssword"))
    }

    #[test]
    fn accepts_valid_request() {
        let ok = validate(valid()).unwrap();
        assert_eq!(ok.username, "user1");
        assert_eq!(ok.email, "user1@mail.com");
        assert_eq!(ok.password, "P4ssword");
    }

    #[test]
    fn trims_and_lowercases_username_and_email_but_not_password() {
        let req = request(Some("  User1 "), Some(" USER1@Mail.com\n"), Some(" P4ssword"));
        let ok = validate(req).unwrap();
        assert_eq!(ok.username, "user1");
        assert_eq!(ok.email, "user1@mail.com");
        assert_eq!(ok.password, " P4ssword");
    }

    #[test]
    fn reports_every_empty_field() {
        let errors = validate(request(None, Some(""), None)).unwrap_err();
        assert_eq!(errors.get("username"), Some(USERNAME_EMPTY));
        assert_eq!(errors.get("email"), Some(EMAIL_EMPTY));
        assert_eq!(errors.get("password"), Some(PASSWORD_EMPTY));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn whitespace_only_username_is_empty() {
        let mut req = valid();
        req.username = Some("    ".into());
        let errors = validate(req).unwrap_err();
        assert_eq!(errors.get("username"), Some(USERNAME_EMPTY));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn username_length_bounds() {
        for (name, ok) in [
            ("usr".to_string(), false),
            ("user".to_string(), true),
            ("a".repeat(20), true),
            ("a".repeat(21), false),
        ] {
            let mut req = valid();
            req.username = Some(name.clone());
            let result = validate(req);
            assert_eq!(result.is_ok(), ok, "username {name:?}");
            if !ok {
                assert_eq!(result.unwrap_err().get("username"), Some(USERNAME_SIZE));
            }
        }
    }

    #[test]
    fn rejects_malformed_emails() {
        for email in [
            "user@mail",
            "user.mail.com",
            "user@@mail.com",
            "us er@mail.com",
            "@mail.com",
            "user@mail..com",
            "user@mail.com.",
            "user@.mail.com",
            "user@-mail.com",
            "user@mail-.com",
            "user@mail.c0m",
            ".user@mail.com",
            "user..name@mail.com",
        ] {
            let mut req = valid();
            req.email = Some(email.into());
            let errors = validate(req).unwrap_err();
            assert_eq!(errors.get("email"), Some(EMAIL_INVALID), "email {email:?}");
        }
    }

    #[test]
    fn accepts_common_email_shapes() {
        for email in [
            "user1@mail.com",
            "first.last+tag@sub.mail-host.co.uk",
            "a_b@x1.io",
        ] {
            assert!(is_valid_email(email), "email {email:?}");
        }
    }

    #[test]
    fn password_rules_in_order() {
        let cases = [
            ("hello", PASSWORD_SIZE),
            ("alllowercase", PASSWORD_PATTERN),
            ("ALLUPPERCASE", PASSWORD_PATTERN),
            ("1234567", PASSWORD_PATTERN),
            ("lowerandUPPER", PASSWORD_PATTERN),
            ("lowerand4667", PASSWORD_PATTERN),
            ("UPPER4667", PASSWORD_PATTERN),
        ];
        for (password, expected) in cases {
            let mut req = valid();
            req.password = Some(password.into());
            let errors = validate(req).unwrap_err();
            assert_eq!(errors.get("password"), Some(expected), "password {password:?}");
            assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["password"]);
        }
    }

    #[test]
    fn first_error_per_field_wins() {
        let mut errors = ValidationErrors::new();
        errors.add("email", EMAIL_INVALID);
        errors.add("email", EMAIL_IN_USE);
        assert_eq!(errors.get("email"), Some(EMAIL_INVALID));
    }

    #[test]
    fn serializes_as_field_map() {
        let errors = validate(request(None, Some("user1@mail.com"), Some("P4ssword"))).unwrap_err();
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "username": USERNAME_EMPTY }));
    }

    #[tokio::test]
    async fn flags_email_already_stored() {
        let repo = InMemoryUserRepository::new();
        let mut tx = repo.begin().await.unwrap();
        tx.insert(&NewUser {
            username: "user1".into(),
            email: "user1@mail.com".into(),
            password_hash: "hash".into(),
            activation_token: "token".into(),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut errors = ValidationErrors::new();
        check_email_available(&repo, &mut errors, "user1@mail.com").await.unwrap();
        assert_eq!(errors.get("email"), Some(EMAIL_IN_USE));

        let mut errors = ValidationErrors::new();
        check_email_available(&repo, &mut errors, "user2@mail.com").await.unwrap();
        assert!(errors.is_empty());
    }
}
