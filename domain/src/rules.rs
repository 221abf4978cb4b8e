//! Form validation for the public attendance flow.
//!
//! The checks are a declarative list of `{field, predicate, message}` rules
//! evaluated in order; the first failing rule aborts the submission with its
//! message and no network call is made.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::AttendanceForm;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FormError {
    pub field: &'static str,
    pub message: &'static str,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static pattern"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{10}$").expect("static pattern"))
}

pub fn valid_email(value: &str) -> bool {
    email_re().is_match(value)
}

/// Exactly 10 ASCII digits, nothing else. Whitespace is not stripped: the
/// field is submitted as typed, so padding must fail here rather than reach
/// the server.
pub fn valid_phone(value: &str) -> bool {
    phone_re().is_match(value)
}

/// Everything the submitter needs to have in hand before any request fires.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionInput<'a> {
    pub form: &'a AttendanceForm,
    pub has_fix: bool,
    pub has_photo: bool,
    pub has_session: bool,
}

struct Rule {
    field: &'static str,
    message: &'static str,
    check: fn(&SubmissionInput) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        field: "name",
        message: "Please enter your name.",
        check: |i| !i.form.name.trim().is_empty(),
    },
    Rule {
        field: "email",
        message: "Please enter a valid email address.",
        check: |i| valid_email(&i.form.email),
    },
    Rule {
        field: "roll_no",
        message: "Please enter your roll number.",
        check: |i| !i.form.roll_no.trim().is_empty(),
    },
    Rule {
        field: "phone",
        message: "Phone number must be exactly 10 digits.",
        check: |i| valid_phone(&i.form.phone),
    },
    Rule {
        field: "branch",
        message: "Please enter your branch.",
        check: |i| !i.form.branch.trim().is_empty(),
    },
    Rule {
        field: "section",
        message: "Please enter your section.",
        check: |i| !i.form.section.trim().is_empty(),
    },
    Rule {
        field: "location",
        message: "Waiting for your location. Allow location access and try again.",
        check: |i| i.has_fix,
    },
    Rule {
        field: "selfie",
        message: "Please capture a selfie before submitting.",
        check: |i| i.has_photo,
    },
    Rule {
        field: "session",
        message: "Missing session. Scan the QR code again.",
        check: |i| i.has_session,
    },
];

/// Run the ordered rule list; the first failure wins.
pub fn validate_submission(input: &SubmissionInput) -> Result<(), FormError> {
    for rule in RULES {
        if !(rule.check)(input) {
            return Err(FormError {
                field: rule.field,
                message: rule.message,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> AttendanceForm {
        AttendanceForm {
            name: "Asha Rao".into(),
            email: "asha@example.edu".into(),
            roll_no: "21CS042".into(),
            phone: "9876543210".into(),
            branch: "CSE".into(),
            section: "B".into(),
        }
    }

    fn input(form: &AttendanceForm) -> SubmissionInput<'_> {
        SubmissionInput {
            form,
            has_fix: true,
            has_photo: true,
            has_session: true,
        }
    }

    #[test]
    fn accepts_ten_digit_phones() {
        assert!(valid_phone("9876543210"));
    }

    #[test]
    fn rejects_bad_phones() {
        assert!(!valid_phone("98765"));
        assert!(!valid_phone("98765432100"));
        assert!(!valid_phone("98765-4321"));
        assert!(!valid_phone(""));
    }

    #[test]
    fn rejects_padded_phone_and_email() {
        // whatever passes here is posted verbatim, so padding must fail
        assert!(!valid_phone(" 9876543210 "));
        assert!(!valid_phone("9876543210\n"));
        assert!(!valid_email(" asha@example.edu"));
    }

    #[test]
    fn accepts_plain_emails() {
        assert!(valid_email("user@domain.tld"));
        assert!(valid_email("a.b+c@uni.ac.in"));
    }

    #[test]
    fn rejects_bad_emails() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("user@domain"));
        assert!(!valid_email("@domain.tld"));
    }

    #[test]
    fn complete_input_passes() {
        let form = complete_form();
        assert!(validate_submission(&input(&form)).is_ok());
    }

    #[test]
    fn first_failure_wins() {
        let mut form = complete_form();
        form.name.clear();
        form.phone = "12".into();
        let err = validate_submission(&input(&form)).unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn missing_photo_is_reported() {
        let form = complete_form();
        let mut i = input(&form);
        i.has_photo = false;
        let err = validate_submission(&i).unwrap_err();
        assert_eq!(err.field, "selfie");
    }

    #[test]
    fn missing_session_is_reported_last() {
        let form = complete_form();
        let mut i = input(&form);
        i.has_session = false;
        let err = validate_submission(&i).unwrap_err();
        assert_eq!(err.field, "session");
    }
}
