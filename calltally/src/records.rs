use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fixed header of the reconciled sheet and the CSV artifact.
pub const SHEET_HEADER: [&str; 6] = [
    "Date",
    "Code",
    "Name",
    "Inbound Total",
    "Outbound Total",
    "Grand Total",
];

/// One employee's call counts for one calendar day.
///
/// `(date, employee_code)` is the natural key: the durable sink holds at most
/// one row per pair. The grand total is always recomputed from the two parts,
/// never trusted from the source export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub employee_code: String,
    pub employee_name: String,
    pub inbound_total: u32,
    pub outbound_total: u32,
    pub grand_total: u32,
}

impl DayRecord {
    pub fn new(
        date: NaiveDate,
        employee_code: impl Into<String>,
        employee_name: impl Into<String>,
        inbound_total: u32,
        outbound_total: u32,
    ) -> Self {
        Self {
            date,
            employee_code: employee_code.into(),
            employee_name: employee_name.into(),
            inbound_total,
            outbound_total,
            grand_total: inbound_total + outbound_total,
        }
    }

    /// Natural key identifying this record in the sink.
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.date, self.employee_code.as_str())
    }

    /// Ordered six-column row matching [`SHEET_HEADER`].
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.to_string(),
            self.employee_code.clone(),
            self.employee_name.clone(),
            self.inbound_total.to_string(),
            self.outbound_total.to_string(),
            self.grand_total.to_string(),
        ]
    }
}
