use crate::error::{AppError, FieldError};

/// Collects field errors for a request body and turns them into one
/// `AppError::Validation`.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn required(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "is required")
    }

    pub fn email(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(is_valid_email(value), field, "must be a valid email address")
    }

    pub fn min_len(&mut self, value: &str, min: usize, field: &str) -> &mut Self {
        let ok = value.chars().count() >= min;
        if !ok {
            self.errors
                .push(FieldError::new(field, format!("must be at least {min} characters")));
        }
        self
    }

    pub fn non_negative(&mut self, value: i64, field: &str) -> &mut Self {
        self.check(value >= 0, field, "must not be negative")
    }

    pub fn positive(&mut self, value: i64, field: &str) -> &mut Self {
        self.check(value > 0, field, "must be greater than 0")
    }

    pub fn url(&mut self, value: &str, field: &str) -> &mut Self {
        let ok = value.starts_with("https://") || value.starts_with("http://");
        self.check(ok, field, "must be an http(s) URL")
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

/// Loose structural check: one `@`, non-empty local part, dotted domain, no spaces.
pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    if value.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// Trims and drops empty optional strings.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rules() {
        assert!(is_valid_email("coach@gym.example"));
        assert!(!is_valid_email("coach@gym"));
        assert!(!is_valid_email("coach@@gym.com"));
        assert!(!is_valid_email("@gym.com"));
        assert!(!is_valid_email("co ach@gym.com"));
    }

    #[test]
    fn collects_every_failing_field() {
        let err = Validator::new()
            .email("nope", "email")
            .min_len("short", 8, "password")
            .required("Sam", "full_name")
            .finish()
            .unwrap_err();
        match err {
            AppError::Validation(fields) => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["email", "password"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn clean_optional_drops_blanks() {
        assert_eq!(clean_optional(Some("  ".into())), None);
        assert_eq!(clean_optional(Some(" x ".into())), Some("x".into()));
    }
}
