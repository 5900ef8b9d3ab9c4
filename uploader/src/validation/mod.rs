//! Local (pre-network) validation of parsed rows.
//!
//! Checks are schema and format rules that need no server:
//!
//! ## Staff
//! - Required: `Title`, `First Name`, `Last Name`, `Email Address`, `Staff Type`
//! - `Email Address` must look like an email
//! - `Staff Type` is a comma-separated list of `admin`, `tut`, `sub`, `hoy`,
//!   `hod`, `gen`; each unknown token is its own error
//!
//! ## Student
//! - Required: `Lastname`, `Student Email`, `Group`, `Year Gp`, `Level`, `Tutor`
//! - `Level` must be exactly `Level 2` or `Level 3`
//!
//! Missing-field and invalid-value checks are independent, so one row can
//! produce several errors. Business rules (duplicates, tutor existence) are
//! left to the remote validator.
//!
//! # Example
//!
//! ```rust
//! use rosterload::models::{RowRecord, UploadType};
//! use rosterload::validation::validate_locally;
//!
//! let row: RowRecord = vec![("Lastname", "Lee"), ("Level", "Level 1")].into_iter().collect();
//! let result = validate_locally(&[row], UploadType::Student);
//! assert!(!result.is_valid());
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::models::{RowRecord, RowRef, UploadType, ValidationError, ValidationResult, ValidationSource};

/// Error type labels shared with the validation endpoint.
pub const MISSING_FIELD: &str = "Missing Field";
pub const INVALID_EMAIL: &str = "Invalid Email";
pub const INVALID_VALUE: &str = "Invalid Value";
pub const EMPTY_FILE: &str = "Empty File";
pub const DUPLICATE_EMAIL: &str = "Duplicate Email";

/// Accepted `Staff Type` tokens.
pub const STAFF_TYPES: &[&str] = &["admin", "tut", "sub", "hoy", "hod", "gen"];

/// Accepted student `Level` values.
pub const STUDENT_LEVELS: &[&str] = &["Level 2", "Level 3"];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));

// =============================================================================
// Column Policy
// =============================================================================

/// Column names that matter for one upload type.
#[derive(Debug, Clone, Copy)]
pub struct ColumnPolicy {
    /// Columns that must be non-empty in every row.
    pub required: &'static [&'static str],
    /// Column holding the account email.
    pub email: &'static str,
    /// Name columns; at least one must be filled to identify a row.
    pub names: &'static [&'static str],
    /// Type/level marker column.
    pub marker: &'static str,
    /// Full template header row.
    pub template: &'static [&'static str],
}

const STAFF_POLICY: ColumnPolicy = ColumnPolicy {
    required: &["Title", "First Name", "Last Name", "Email Address", "Staff Type"],
    email: "Email Address",
    names: &["First Name", "Last Name"],
    marker: "Staff Type",
    template: &[
        "Title",
        "First Name",
        "Last Name",
        "Email Address",
        "Staff Type",
        "Year Group",
        "Group",
        "Faculty/Dept",
        "Subject",
    ],
};

const STUDENT_POLICY: ColumnPolicy = ColumnPolicy {
    required: &["Lastname", "Student Email", "Group", "Year Gp", "Level", "Tutor"],
    email: "Student Email",
    names: &["Firstname", "Lastname"],
    marker: "Level",
    template: &[
        "Lastname",
        "Firstname",
        "Student Email",
        "Group",
        "Year Gp",
        "Level",
        "Tutor",
        "GCSE Prior Attainment",
        "sub1",
        "sub2",
        "sub3",
        "sub4",
        "sub5",
    ],
};

/// Columns for an upload type.
pub fn policy(upload_type: UploadType) -> &'static ColumnPolicy {
    match upload_type {
        UploadType::Staff => &STAFF_POLICY,
        UploadType::Student => &STUDENT_POLICY,
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate every row without touching the network.
///
/// Deterministic: the same rows always give the same result.
pub fn validate_locally(rows: &[RowRecord], upload_type: UploadType) -> ValidationResult {
    let mut errors = Vec::new();

    if rows.is_empty() {
        errors.push(ValidationError::new(
            RowRef::NotApplicable,
            EMPTY_FILE,
            "The file contains no data rows",
        ));
    }

    for (idx, row) in rows.iter().enumerate() {
        let row_ref = RowRef::Row(idx + 1);
        check_required(row, row_ref, policy(upload_type).required, &mut errors);
        match upload_type {
            UploadType::Staff => check_staff_row(row, row_ref, &mut errors),
            UploadType::Student => check_student_row(row, row_ref, &mut errors),
        }
    }

    if errors.is_empty() {
        log::info!("Local validation passed for {} {} rows", rows.len(), upload_type);
    } else {
        log::info!("Local validation found {} error(s) in {} rows", errors.len(), rows.len());
    }

    ValidationResult::new(errors, rows.to_vec(), ValidationSource::Local)
}

fn check_required(row: &RowRecord, row_ref: RowRef, required: &[&str], errors: &mut Vec<ValidationError>) {
    for field in required {
        if row.is_blank(field) {
            errors.push(
                ValidationError::new(row_ref, MISSING_FIELD, format!("Missing required field: {}", field))
                    .with_field(*field),
            );
        }
    }
}

fn check_staff_row(row: &RowRecord, row_ref: RowRef, errors: &mut Vec<ValidationError>) {
    let email = row.value("Email Address");
    if !email.is_empty() && !is_valid_email(email) {
        errors.push(
            ValidationError::new(row_ref, INVALID_EMAIL, "Invalid email format")
                .with_field("Email Address")
                .with_data(email),
        );
    }

    let staff_types = row.value("Staff Type");
    let tokens: Vec<&str> = staff_types.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();

    // Blank values are already reported as missing
    if tokens.is_empty() && !staff_types.trim().is_empty() {
        errors.push(
            ValidationError::new(
                row_ref,
                INVALID_VALUE,
                format!("Staff type has no values. Must be one of: {}", STAFF_TYPES.join(", ")),
            )
            .with_field("Staff Type")
            .with_data(staff_types),
        );
    }

    for token in tokens {
        if !STAFF_TYPES.contains(&token.to_lowercase().as_str()) {
            errors.push(
                ValidationError::new(
                    row_ref,
                    INVALID_VALUE,
                    format!("Invalid staff type '{}'. Must be one of: {}", token, STAFF_TYPES.join(", ")),
                )
                .with_field("Staff Type")
                .with_data(token),
            );
        }
    }
}

fn check_student_row(row: &RowRecord, row_ref: RowRef, errors: &mut Vec<ValidationError>) {
    let level = row.value("Level");
    if !level.is_empty() && !STUDENT_LEVELS.contains(&level) {
        errors.push(
            ValidationError::new(
                row_ref,
                INVALID_VALUE,
                format!("Invalid level '{}'. Must be 'Level 2' or 'Level 3'", level),
            )
            .with_field("Level")
            .with_data(level),
        );
    }
}

/// Email shape check: `something@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

// =============================================================================
// Identity and Duplicates
// =============================================================================

/// Whether a row carries enough to identify an account: an email, a first or
/// last name, and the type/level marker.
pub fn has_identity(row: &RowRecord, upload_type: UploadType) -> bool {
    let columns = policy(upload_type);
    !row.is_blank(columns.email)
        && columns.names.iter().any(|name| !row.is_blank(name))
        && !row.is_blank(columns.marker)
}

/// Canonical form of an email for duplicate detection.
///
/// Lowercases, drops `+tag` suffixes and folds Gmail dots.
pub fn normalize_email(email: &str) -> String {
    let e = email.trim().to_lowercase();
    let Some((local, domain)) = e.split_once('@') else {
        return e;
    };

    let mut local = local.trim().to_string();
    let mut domain = domain.trim().to_string();

    if let Some((base, _tag)) = local.split_once('+') {
        local = base.to_string();
    }
    if domain == "gmail.com" || domain == "googlemail.com" {
        local = local.replace('.', "");
        domain = "gmail.com".to_string();
    }

    format!("{}@{}", local, domain)
}

/// Report every row whose email already appeared earlier in the file.
pub fn find_duplicate_emails(rows: &[RowRecord], upload_type: UploadType) -> Vec<ValidationError> {
    let column = policy(upload_type).email;
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut errors = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let email = row.value(column);
        if email.is_empty() {
            continue;
        }

        let key = normalize_email(email);
        match first_seen.get(&key) {
            Some(first) => errors.push(
                ValidationError::new(
                    RowRef::Row(idx + 1),
                    DUPLICATE_EMAIL,
                    format!("Email also used in row {}", first),
                )
                .with_field(column)
                .with_data(email),
            ),
            None => {
                first_seen.insert(key, idx + 1);
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff_row(email: &str, staff_type: &str) -> RowRecord {
        vec![
            ("Title", "Ms"),
            ("First Name", "Ann"),
            ("Last Name", "Lee"),
            ("Email Address", email),
            ("Staff Type", staff_type),
        ]
        .into_iter()
        .collect()
    }

    fn student_row(level: &str) -> RowRecord {
        vec![
            ("Lastname", "Khan"),
            ("Firstname", "Ravi"),
            ("Student Email", "ravi@school.org"),
            ("Group", "12A"),
            ("Year Gp", "12"),
            ("Level", level),
            ("Tutor", "tutor@school.org"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_valid_staff_rows() {
        let rows = vec![staff_row("ann@school.org", "admin, tut"), staff_row("bo@school.org", "HOY")];
        let result = validate_locally(&rows, UploadType::Staff);

        assert!(result.is_valid());
        assert_eq!(result.total(), 2);
        assert_eq!(result.source(), ValidationSource::Local);
    }

    #[test]
    fn test_missing_email_is_single_error() {
        let rows = vec![staff_row("", "tut")];
        let result = validate_locally(&rows, UploadType::Staff);

        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 1);
        let err = &result.errors()[0];
        assert_eq!(err.kind, MISSING_FIELD);
        assert_eq!(err.field.as_deref(), Some("Email Address"));
        assert_eq!(err.row, RowRef::Row(1));
    }

    #[test]
    fn test_invalid_email_format() {
        let result = validate_locally(&[staff_row("ann at school", "tut")], UploadType::Staff);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].kind, INVALID_EMAIL);
        assert_eq!(result.errors()[0].data.as_deref(), Some("ann at school"));
    }

    #[test]
    fn test_one_error_per_unknown_staff_type() {
        let result = validate_locally(&[staff_row("ann@school.org", "tut, boss, ,chief")], UploadType::Staff);

        let tokens: Vec<_> = result.errors().iter().filter_map(|e| e.data.as_deref()).collect();
        assert_eq!(tokens, vec!["boss", "chief"]);
        assert!(result.errors().iter().all(|e| e.kind == INVALID_VALUE));
    }

    #[test]
    fn test_separator_only_staff_type_is_invalid() {
        for value in [",", " , ,"] {
            let result = validate_locally(&[staff_row("ann@school.org", value)], UploadType::Staff);

            assert!(!result.is_valid());
            assert_eq!(result.errors().len(), 1);
            assert_eq!(result.errors()[0].kind, INVALID_VALUE);
            assert_eq!(result.errors()[0].field.as_deref(), Some("Staff Type"));
        }
    }

    #[test]
    fn test_errors_are_cumulative_per_row() {
        let mut row = staff_row("not-an-email", "wizard");
        row.insert("Title", "");
        let result = validate_locally(&[row], UploadType::Staff);

        let kinds: Vec<_> = result.errors().iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec![MISSING_FIELD, INVALID_EMAIL, INVALID_VALUE]);
    }

    #[test]
    fn test_student_levels() {
        let bad = validate_locally(&[student_row("Level 1")], UploadType::Student);
        assert_eq!(bad.errors().len(), 1);
        assert_eq!(bad.errors()[0].kind, INVALID_VALUE);
        assert_eq!(bad.errors()[0].field.as_deref(), Some("Level"));

        let good = validate_locally(&[student_row("Level 3")], UploadType::Student);
        assert!(good.errors().iter().all(|e| e.field.as_deref() != Some("Level")));
        assert!(good.is_valid());
    }

    #[test]
    fn test_student_missing_columns() {
        let row: RowRecord = vec![("Lastname", "Khan"), ("Level", "Level 2")].into_iter().collect();
        let result = validate_locally(&[row], UploadType::Student);

        let fields: Vec<_> = result.errors().iter().filter_map(|e| e.field.as_deref()).collect();
        assert_eq!(fields, vec!["Student Email", "Group", "Year Gp", "Tutor"]);
    }

    #[test]
    fn test_empty_row_set() {
        let result = validate_locally(&[], UploadType::Staff);
        assert!(!result.is_valid());
        assert_eq!(result.errors()[0].row, RowRef::NotApplicable);
        assert_eq!(result.errors()[0].kind, EMPTY_FILE);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let rows = vec![staff_row("ann@school.org", "tut"), staff_row("x", "nope")];
        let first = validate_locally(&rows, UploadType::Staff);
        let second = validate_locally(&rows, UploadType::Staff);
        assert_eq!(first, second);

        let valid = vec![student_row("Level 2")];
        assert_eq!(
            validate_locally(&valid, UploadType::Student),
            validate_locally(&valid, UploadType::Student)
        );
    }

    #[test]
    fn test_has_identity() {
        assert!(has_identity(&staff_row("ann@school.org", "tut"), UploadType::Staff));
        assert!(!has_identity(&staff_row("", "tut"), UploadType::Staff));

        let mut nameless = student_row("Level 2");
        nameless.insert("Lastname", "");
        assert!(has_identity(&nameless, UploadType::Student));
        nameless.insert("Firstname", " ");
        assert!(!has_identity(&nameless, UploadType::Student));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ann.Lee+year12@Gmail.com "), "annlee@gmail.com");
        assert_eq!(normalize_email("a.b@googlemail.com"), "ab@gmail.com");
        assert_eq!(normalize_email("A.B+x@School.org"), "a.b@school.org");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_duplicate_emails() {
        let rows = vec![
            staff_row("ann@school.org", "tut"),
            staff_row("bo@school.org", "tut"),
            staff_row("ANN+2@school.org", "tut"),
        ];
        let dups = find_duplicate_emails(&rows, UploadType::Staff);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].row, RowRef::Row(3));
        assert!(dups[0].message.contains("row 1"));
    }
}
