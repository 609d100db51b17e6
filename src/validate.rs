use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::{Field, NewOffering, OfferingType, RawRow, RowError};

pub const NAME_REQUIRED: &str = "Name is required.";
pub const INVALID_EMAIL: &str = "Invalid email address.";
pub const INVALID_AMOUNT: &str = "Amount must be a positive number.";
pub const INVALID_DATE: &str = "Invalid date format.";
pub const FIELD_REQUIRED: &str = "Required.";

/// Separator between field failures inside one row's message.
pub const FAILURE_SEPARATOR: &str = "; ";

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9_'+\-]+(\.[A-Za-z0-9_'+\-]+)*@[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
    .expect("email pattern compiles")
});

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y"];

/// Turns one decoded row into an offering or a single row error.
///
/// Implementations must be pure: the same row always yields the same
/// outcome, and a failure never affects other rows.
pub trait RowValidator: Send + Sync {
    fn validate(&self, row: &RawRow) -> Result<NewOffering, RowError>;
}

/// Fixed-schema validator for the offering columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl RowValidator for SchemaValidator {
    fn validate(&self, row: &RawRow) -> Result<NewOffering, RowError> {
        let mut failures: Vec<(Field, String)> = Vec::new();

        let name = row.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            failures.push((Field::Name, NAME_REQUIRED.to_string()));
        }

        let email = check(row, Field::Email, &mut failures, |v| {
            let v = v.trim();
            EMAIL
                .is_match(v)
                .then(|| v.to_string())
                .ok_or_else(|| INVALID_EMAIL.to_string())
        });
        let amount = check(row, Field::Amount, &mut failures, |v| {
            parse_amount(v).ok_or_else(|| INVALID_AMOUNT.to_string())
        });
        let occurred_on = check(row, Field::Date, &mut failures, |v| {
            parse_date(v).ok_or_else(|| INVALID_DATE.to_string())
        });
        let offering_type = check(row, Field::Type, &mut failures, |v| {
            v.parse::<OfferingType>().map_err(|got| enum_message(&got))
        });

        match (email, amount, occurred_on, offering_type) {
            (Some(contributor_email), Some(amount), Some(occurred_on), Some(offering_type))
                if failures.is_empty() =>
            {
                Ok(NewOffering {
                    contributor_name: name.to_string(),
                    contributor_email,
                    amount,
                    occurred_on,
                    offering_type,
                })
            }
            _ => Err(RowError::new(row.display_row(), join_failures(&failures))),
        }
    }
}

/// Runs `rule` on the cell for `field`, recording a failure instead of
/// returning early. An absent column is its own failure.
fn check<T>(
    row: &RawRow,
    field: Field,
    failures: &mut Vec<(Field, String)>,
    rule: impl FnOnce(&str) -> Result<T, String>,
) -> Option<T> {
    let Some(cell) = row.get(field) else {
        failures.push((field, FIELD_REQUIRED.to_string()));
        return None;
    };
    match rule(cell) {
        Ok(v) => Some(v),
        Err(msg) => {
            failures.push((field, msg));
            None
        }
    }
}

fn join_failures(failures: &[(Field, String)]) -> String {
    failures
        .iter()
        .map(|(field, msg)| format!("{field}: {msg}"))
        .collect::<Vec<_>>()
        .join(FAILURE_SEPARATOR)
}

fn enum_message(got: &str) -> String {
    let expected = OfferingType::ALL
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(" | ");
    format!("Invalid enum value. Expected {expected}, received '{got}'.")
}

pub fn parse_amount(raw: &str) -> Option<f64> {
    let v: f64 = raw.trim().parse().ok()?;
    (v.is_finite() && v > 0.0).then_some(v)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(d) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

/// Validates every row. Both outputs keep input order, so errors come out
/// by ascending row number.
pub fn validate_rows<V: RowValidator + ?Sized>(
    validator: &V,
    rows: &[RawRow],
) -> (Vec<NewOffering>, Vec<RowError>) {
    let mut valid = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    for row in rows {
        match validator.validate(row) {
            Ok(offering) => valid.push(offering),
            Err(e) => errors.push(e),
        }
    }
    (valid, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, email: &str, amount: &str, date: &str, kind: &str) -> RawRow {
        RawRow {
            index: 1,
            name: Some(name.into()),
            email: Some(email.into()),
            amount: Some(amount.into()),
            date: Some(date.into()),
            offering_type: Some(kind.into()),
        }
    }

    #[test]
    fn valid_row_is_coerced() {
        let o = SchemaValidator
            .validate(&row("  Jane Doe ", "jane@example.com", " 150.00", "2024-07-21", "Tithe"))
            .unwrap();
        assert_eq!(o.contributor_name, "Jane Doe");
        assert_eq!(o.amount, 150.0);
        assert_eq!(o.occurred_on, NaiveDate::from_ymd_opt(2024, 7, 21).unwrap());
        assert_eq!(o.offering_type, OfferingType::Tithe);
    }

    #[test]
    fn negative_amount() {
        let err = SchemaValidator
            .validate(&row("John", "john@x.com", "-5", "2024-01-01", "Tithe"))
            .unwrap_err();
        assert_eq!(err, RowError::new(2, "amount: Amount must be a positive number."));
    }

    #[test]
    fn every_failing_field_lands_in_one_error() {
        let err = SchemaValidator
            .validate(&row("", "not-an-email", "abc", "someday", "tithe"))
            .unwrap_err();
        assert_eq!(err.row, 2);
        assert_eq!(
            err.message,
            "name: Name is required.; email: Invalid email address.; \
             amount: Amount must be a positive number.; date: Invalid date format.; \
             type: Invalid enum value. \
             Expected 'Tithe' | 'Personal' | 'Building' | 'Special', received 'tithe'."
        );
    }

    #[test]
    fn absent_columns_are_required() {
        let mut r = row("Ann", "ann@example.org", "5", "2024-01-01", "Special");
        r.offering_type = None;
        r.email = None;
        let err = SchemaValidator.validate(&r).unwrap_err();
        assert_eq!(err.message, "email: Required.; type: Required.");
    }

    #[test]
    fn zero_and_non_finite_amounts_fail() {
        for bad in ["0", "0.00", "", "NaN", "inf", "1e400", "$5"] {
            assert_eq!(parse_amount(bad), None, "{bad}");
        }
        assert_eq!(parse_amount("0.01"), Some(0.01));
    }

    #[test]
    fn date_shapes() {
        let want = NaiveDate::from_ymd_opt(2024, 7, 21);
        for ok in [
            "2024-07-21",
            "2024/07/21",
            "07/21/2024",
            "July 21, 2024",
            "Jul 21, 2024",
            "2024-07-21T10:00:00Z",
            "2024-07-21T10:00:00",
        ] {
            assert_eq!(parse_date(ok), want, "{ok}");
        }
        for bad in ["", "2024-13-01", "2024-02-30", "yesterday", "21.07"] {
            assert_eq!(parse_date(bad), None, "{bad}");
        }
    }

    #[test]
    fn email_shapes() {
        for ok in ["a@b.co", "first.last+tag@sub.example.org", "o'neil@example.ie"] {
            assert!(EMAIL.is_match(ok), "{ok}");
        }
        for bad in [
            "not-an-email",
            "a@b",
            "a@@b.com",
            ".a@b.com",
            "a..b@c.com",
            "a b@c.com",
            "a@-b.com",
        ] {
            assert!(!EMAIL.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn validation_is_repeatable() {
        let r = row("X", "bad", "-1", "2024-01-01", "Building");
        assert_eq!(SchemaValidator.validate(&r), SchemaValidator.validate(&r));
    }

    #[test]
    fn rows_are_split_in_order() {
        let mut rows = vec![
            row("A", "a@b.co", "1", "2024-01-01", "Tithe"),
            row("B", "bad", "1", "2024-01-01", "Tithe"),
            row("C", "c@b.co", "2", "2024-01-01", "Personal"),
            row("D", "d@b.co", "0", "2024-01-01", "Tithe"),
        ];
        for (i, r) in rows.iter_mut().enumerate() {
            r.index = i + 1;
        }
        let (valid, errors) = validate_rows(&SchemaValidator, &rows);
        let names: Vec<_> = valid.iter().map(|o| o.contributor_name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![3, 5]);
    }
}
