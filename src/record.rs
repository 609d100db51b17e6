use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::{Document, StoreError, StoreResult};

/// The known CSV columns, in the order their failures are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Email,
    Amount,
    Date,
    Type,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Name,
        Field::Email,
        Field::Amount,
        Field::Date,
        Field::Type,
    ];

    /// Header text for this column (also the prefix used in row errors).
    pub fn header(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Amount => "amount",
            Field::Date => "date",
            Field::Type => "type",
        }
    }

    /// Header lookup: trimmed, BOM stripped, ASCII case-insensitive.
    pub fn from_header(raw: &str) -> Option<Field> {
        let h = raw.trim_start_matches('\u{feff}').trim();
        Field::ALL
            .into_iter()
            .find(|f| f.header().eq_ignore_ascii_case(h))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// One decoded data row. Cells are `None` when the file has no such column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based index among data rows (header and blank lines excluded).
    pub index: usize,
    pub name: Option<String>,
    pub email: Option<String>,
    pub amount: Option<String>,
    pub date: Option<String>,
    pub offering_type: Option<String>,
}

impl RawRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Row number as shown to the user: the header is row 1.
    pub fn display_row(&self) -> usize {
        self.index + 1
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => self.name.as_deref(),
            Field::Email => self.email.as_deref(),
            Field::Amount => self.amount.as_deref(),
            Field::Date => self.date.as_deref(),
            Field::Type => self.offering_type.as_deref(),
        }
    }

    pub fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Name => &mut self.name,
            Field::Email => &mut self.email,
            Field::Amount => &mut self.amount,
            Field::Date => &mut self.date,
            Field::Type => &mut self.offering_type,
        };
        *slot = Some(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferingType {
    Tithe,
    Personal,
    Building,
    Special,
}

impl OfferingType {
    pub const ALL: [OfferingType; 4] = [
        OfferingType::Tithe,
        OfferingType::Personal,
        OfferingType::Building,
        OfferingType::Special,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OfferingType::Tithe => "Tithe",
            OfferingType::Personal => "Personal",
            OfferingType::Building => "Building",
            OfferingType::Special => "Special",
        }
    }
}

impl fmt::Display for OfferingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-sensitive: `"tithe"` is rejected.
impl FromStr for OfferingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OfferingType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// A validated offering that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOffering {
    #[serde(rename = "name")]
    pub contributor_name: String,
    #[serde(rename = "email")]
    pub contributor_email: String,
    pub amount: f64,
    #[serde(rename = "date")]
    pub occurred_on: NaiveDate,
    #[serde(rename = "type")]
    pub offering_type: OfferingType,
}

impl NewOffering {
    pub fn to_fields(&self) -> StoreResult<serde_json::Value> {
        serde_json::to_value(self).map_err(StoreError::from)
    }
}

/// An offering as it exists in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingRecord {
    pub id: String,
    #[serde(flatten)]
    pub offering: NewOffering,
    pub created_at: DateTime<Utc>,
}

impl OfferingRecord {
    pub fn from_document(doc: Document) -> StoreResult<Self> {
        let offering: NewOffering = serde_json::from_value(doc.fields)?;
        Ok(Self {
            id: doc.id,
            offering,
            created_at: doc.created_at,
        })
    }
}

/// A structural or validation failure tied to a user-visible row number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_lenient_about_case_and_padding() {
        assert_eq!(Field::from_header(" Email "), Some(Field::Email));
        assert_eq!(Field::from_header("\u{feff}name"), Some(Field::Name));
        assert_eq!(Field::from_header("TYPE"), Some(Field::Type));
        assert_eq!(Field::from_header("memo"), None);
    }

    #[test]
    fn offering_type_is_case_sensitive() {
        assert_eq!("Tithe".parse::<OfferingType>(), Ok(OfferingType::Tithe));
        assert!("tithe".parse::<OfferingType>().is_err());
        assert!("Tithe ".parse::<OfferingType>().is_err());
    }

    #[test]
    fn stored_shape_uses_short_column_names() {
        let offering = NewOffering {
            contributor_name: "Jane Doe".into(),
            contributor_email: "jane@example.com".into(),
            amount: 150.0,
            occurred_on: NaiveDate::from_ymd_opt(2024, 7, 21).unwrap(),
            offering_type: OfferingType::Tithe,
        };
        let v = offering.to_fields().unwrap();
        assert_eq!(v["name"], "Jane Doe");
        assert_eq!(v["date"], "2024-07-21");
        assert_eq!(v["type"], "Tithe");
        assert_eq!(v["amount"], 150.0);
    }
}
