use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{NewUser, ProfileUpdate};

pub const HANDLE_MIN: usize = 3;
pub const HANDLE_MAX: usize = 20;
pub const NAME_MIN: usize = 3;
pub const NAME_MAX: usize = 50;
pub const MIN_AGE_YEARS: u32 = 16;

/// Taste tags offered at sign-up, as `(id, label)`.
pub const TASTES: [(&str, &str); 14] = [
    ("pasta", "Pasta"),
    ("pizza", "Pizza"),
    ("hamburger", "Hamburger"),
    ("sushi", "Sushi"),
    ("iceCream", "Ice cream"),
    ("coffee", "Coffee"),
    ("beer", "Beer"),
    ("glutenFree", "Gluten free"),
    ("bbq", "Barbecue"),
    ("vegan", "Vegan"),
    ("vegetarian", "Vegetarian"),
    ("fit", "Fit"),
    ("fastFood", "Fast food"),
    ("dessert", "Dessert"),
];

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]*$").expect("valid handle regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("user name may only contain letters, digits and underscores")]
    InvalidHandle,
    #[error("email address is not valid")]
    InvalidEmail,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("you must be at least 16 years old")]
    TooYoung,
    #[error("the terms of use must be accepted")]
    TermsNotAccepted,
    #[error("unknown taste: {0}")]
    UnknownTaste(String),
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(ValidationError::Required { field });
    }
    if len < min {
        return Err(ValidationError::TooShort { field, min });
    }
    if len > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn handle(value: &str) -> Result<(), ValidationError> {
    check_length("user name", value, HANDLE_MIN, HANDLE_MAX)?;
    if !HANDLE_RE.is_match(value) {
        return Err(ValidationError::InvalidHandle);
    }
    Ok(())
}

pub fn name(value: &str) -> Result<(), ValidationError> {
    check_length("name", value.trim(), NAME_MIN, NAME_MAX)
}

pub fn email(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field: "email" });
    }
    if !EMAIL_RE.is_match(value.trim()) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// Age in whole years on `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

pub fn profile_update(update: &ProfileUpdate) -> Result<(), ValidationError> {
    handle(&update.handle)?;
    name(&update.name)
}

/// Sign-up form as typed by the user, before it becomes a [`NewUser`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignUpForm {
    pub handle: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub birth_date: Option<NaiveDate>,
    pub accepted_terms: bool,
    pub tastes: Vec<String>,
}

impl SignUpForm {
    pub fn validate(&self, today: NaiveDate) -> Result<NewUser, ValidationError> {
        handle(&self.handle)?;
        name(&self.name)?;
        email(&self.email)?;
        if self.password.is_empty() {
            return Err(ValidationError::Required { field: "password" });
        }
        if self.password != self.password_confirmation {
            return Err(ValidationError::PasswordMismatch);
        }
        let birth_date = self.birth_date.ok_or(ValidationError::Required {
            field: "birth date",
        })?;
        if age_on(birth_date, today) < MIN_AGE_YEARS as i32 {
            return Err(ValidationError::TooYoung);
        }
        if !self.accepted_terms {
            return Err(ValidationError::TermsNotAccepted);
        }
        if let Some(unknown) = self
            .tastes
            .iter()
            .find(|taste| !TASTES.iter().any(|(id, _)| *id == taste.as_str()))
        {
            return Err(ValidationError::UnknownTaste(unknown.clone()));
        }

        Ok(NewUser {
            handle: self.handle.clone(),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            birth_date,
            accepted_terms: true,
            tastes: self.tastes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn form() -> SignUpForm {
        SignUpForm {
            handle: "chef_ana".into(),
            name: "Ana Souza".into(),
            email: "ana@example.com".into(),
            password: "secret".into(),
            password_confirmation: "secret".into(),
            birth_date: Some(date(2000, 6, 15)),
            accepted_terms: true,
            tastes: vec!["pasta".into(), "vegan".into()],
        }
    }

    #[test]
    fn handle_rules() {
        assert!(handle("ana_01").is_ok());
        assert_eq!(
            handle("ab"),
            Err(ValidationError::TooShort {
                field: "user name",
                min: 3
            })
        );
        assert_eq!(handle("ana souza"), Err(ValidationError::InvalidHandle));
        assert!(matches!(
            handle(&"x".repeat(21)),
            Err(ValidationError::TooLong { max: 20, .. })
        ));
        assert!(matches!(handle(""), Err(ValidationError::Required { .. })));
    }

    #[test]
    fn age_counts_whole_years() {
        assert_eq!(age_on(date(2008, 3, 10), date(2024, 3, 9)), 15);
        assert_eq!(age_on(date(2008, 3, 10), date(2024, 3, 10)), 16);
    }

    #[test]
    fn valid_form_builds_new_user() {
        let user = form().validate(date(2024, 1, 1)).unwrap();
        assert_eq!(user.handle, "chef_ana");
        assert!(user.accepted_terms);
        assert_eq!(user.tastes.len(), 2);
    }

    #[test]
    fn form_errors() {
        let today = date(2024, 1, 1);

        let mut f = form();
        f.password_confirmation = "other".into();
        assert_eq!(f.validate(today), Err(ValidationError::PasswordMismatch));

        let mut f = form();
        f.birth_date = Some(date(2010, 1, 1));
        assert_eq!(f.validate(today), Err(ValidationError::TooYoung));

        let mut f = form();
        f.accepted_terms = false;
        assert_eq!(f.validate(today), Err(ValidationError::TermsNotAccepted));

        let mut f = form();
        f.email = "not-an-email".into();
        assert_eq!(f.validate(today), Err(ValidationError::InvalidEmail));

        let mut f = form();
        f.tastes.push("caviar".into());
        assert_eq!(
            f.validate(today),
            Err(ValidationError::UnknownTaste("caviar".into()))
        );
    }
}
