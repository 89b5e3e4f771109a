//! Report identifiers addressing a table's column settings.

use serde::{Deserialize, Serialize};

/// The table whose column settings are being addressed.
///
/// # Examples
///
/// ```
/// # use column_settings::domain::ReportType;
/// let report: ReportType = "PRODUCTS_REPORT".parse().expect("known report");
///
/// assert_eq!(report, ReportType::ProductsReport);
/// assert_eq!(report.to_string(), "PRODUCTS_REPORT");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    /// The main sales report.
    MainReport,
    /// The product catalogue report.
    ProductsReport,
}

impl ReportType {
    /// Every report type, in declaration order.
    pub const ALL: [Self; 2] = [Self::MainReport, Self::ProductsReport];

    /// Returns the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainReport => "MAIN_REPORT",
            Self::ProductsReport => "PRODUCTS_REPORT",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown report type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown report type: {input}")]
pub struct ParseReportTypeError {
    /// The unrecognised input value.
    pub input: String,
}

impl std::str::FromStr for ReportType {
    type Err = ParseReportTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAIN_REPORT" => Ok(Self::MainReport),
            "PRODUCTS_REPORT" => Ok(Self::ProductsReport),
            _ => Err(ParseReportTypeError {
                input: s.to_owned(),
            }),
        }
    }
}
