//! Table column configuration and per-report default column sets.
//!
//! Stored column lists may be partial or carry gaps left by older clients.
//! [`merge_with_defaults`] turns any stored list into a complete, ordered
//! list ready for rendering: missing widths fall back to
//! [`DEFAULT_COLUMN_WIDTH`], missing visibility flags to `true`, duplicate ids
//! are dropped (first wins) and default columns absent from storage are
//! injected with their default width and position.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

use super::ReportType;

/// Pixel width applied when a column carries no usable width.
pub const DEFAULT_COLUMN_WIDTH: u32 = 100;

/// One table column's display settings.
///
/// # Examples
///
/// ```
/// # use column_settings::domain::ColumnConfig;
/// let column: ColumnConfig = serde_json::from_str(r#"{"id":"price","order":2}"#)
///     .expect("lenient column");
///
/// assert_eq!(column.width, 100);
/// assert!(column.visible);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    /// Stable column identifier, unique within a report's column set.
    pub id: String,
    /// Pixel width; always positive.
    #[serde(default = "default_width", deserialize_with = "lenient_width")]
    pub width: u32,
    /// Zero-based display position.
    #[serde(default)]
    pub order: u32,
    /// Whether the column is shown.
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl ColumnConfig {
    /// Build a visible column with the given width and position.
    pub fn new(id: impl Into<String>, width: u32, order: u32) -> Self {
        Self {
            id: id.into(),
            width: if width == 0 { DEFAULT_COLUMN_WIDTH } else { width },
            order,
            visible: true,
        }
    }

    /// Return a copy with the visibility flag replaced.
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

fn default_width() -> u32 {
    DEFAULT_COLUMN_WIDTH
}

fn default_visible() -> bool {
    true
}

// Widths written by browser clients arrive as arbitrary JSON numbers
// (fractional after a drag, occasionally zero or negative).
fn lenient_width<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(match raw {
        Some(width) if width.is_finite() && width >= 1.0 => {
            #[expect(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "value is finite, positive and clamped to u32 range"
            )]
            let rounded = width.round().min(f64::from(u32::MAX)) as u32;
            rounded
        }
        _ => DEFAULT_COLUMN_WIDTH,
    })
}

const MAIN_REPORT_COLUMNS: &[(&str, u32)] = &[
    ("date", 120),
    ("invoice", 110),
    ("customer", 180),
    ("items", 80),
    ("subtotal", 110),
    ("tax", 90),
    ("total", 110),
    ("paymentMethod", 140),
    ("status", 100),
    ("cashier", 140),
];

const PRODUCTS_REPORT_COLUMNS: &[(&str, u32)] = &[
    ("name", 200),
    ("sku", 120),
    ("category", 150),
    ("price", 100),
    ("cost", 100),
    ("stock", 90),
    ("supplier", 160),
    ("status", 100),
];

/// Hard-coded default column set for a report, in default display order.
pub fn default_columns(report: ReportType) -> Vec<ColumnConfig> {
    let table = match report {
        ReportType::MainReport => MAIN_REPORT_COLUMNS,
        ReportType::ProductsReport => PRODUCTS_REPORT_COLUMNS,
    };
    table
        .iter()
        .zip(0_u32..)
        .map(|((id, width), order)| ColumnConfig::new(*id, *width, order))
        .collect()
}

/// Merge stored columns with a report's default column set.
///
/// The result contains every default column exactly once plus any extra
/// stored columns, sorted by `order` with ties broken by default position.
///
/// # Examples
///
/// ```
/// # use column_settings::domain::{ColumnConfig, merge_with_defaults};
/// let defaults = vec![ColumnConfig::new("name", 200, 0), ColumnConfig::new("price", 100, 1)];
/// let stored = vec![ColumnConfig::new("price", 80, 0).with_visible(false)];
///
/// let merged = merge_with_defaults(&stored, &defaults);
/// let ids: Vec<_> = merged.iter().map(|c| c.id.as_str()).collect();
/// assert_eq!(ids, ["name", "price"]);
/// assert!(!merged[1].visible);
/// ```
pub fn merge_with_defaults(stored: &[ColumnConfig], defaults: &[ColumnConfig]) -> Vec<ColumnConfig> {
    let mut seen = HashSet::new();
    let mut merged: Vec<ColumnConfig> = stored
        .iter()
        .filter(|column| seen.insert(column.id.clone()))
        .map(|column| ColumnConfig {
            width: if column.width == 0 {
                DEFAULT_COLUMN_WIDTH
            } else {
                column.width
            },
            ..column.clone()
        })
        .collect();

    merged.extend(
        defaults
            .iter()
            .filter(|column| !seen.contains(&column.id))
            .map(|column| column.clone().with_visible(true)),
    );

    sort_by_order(&mut merged, defaults);
    merged
}

/// Rewrite `order` so listed ids come first, in the listed sequence.
///
/// Unknown ids are ignored; columns absent from `column_order` keep their
/// relative order after the listed ones. The slice is re-sorted by the new
/// positions.
pub fn apply_column_order(columns: &mut Vec<ColumnConfig>, column_order: &[String]) {
    let mut listed: HashMap<&str, usize> = HashMap::new();
    for id in column_order {
        if columns.iter().any(|column| column.id == *id) && !listed.contains_key(id.as_str()) {
            let next = listed.len();
            listed.insert(id.as_str(), next);
        }
    }

    columns.sort_by_key(|column| column.order);
    let listed_count = listed.len();
    let mut trailing = listed_count;
    let positions: Vec<usize> = columns
        .iter()
        .map(|column| match listed.get(column.id.as_str()) {
            Some(position) => *position,
            None => {
                let position = trailing;
                trailing += 1;
                position
            }
        })
        .collect();

    for (column, position) in columns.iter_mut().zip(positions) {
        column.order = u32::try_from(position).unwrap_or(u32::MAX);
    }
    columns.sort_by_key(|column| column.order);
}

fn sort_by_order(columns: &mut [ColumnConfig], defaults: &[ColumnConfig]) {
    let default_rank: HashMap<&str, usize> = defaults
        .iter()
        .enumerate()
        .map(|(index, column)| (column.id.as_str(), index))
        .collect();
    let fallback_rank = defaults.len();
    let ranks: HashMap<String, usize> = columns
        .iter()
        .map(|column| {
            let rank = default_rank
                .get(column.id.as_str())
                .copied()
                .unwrap_or(fallback_rank);
            (column.id.clone(), rank)
        })
        .collect();

    // Stable sort keeps stored sequence for extra columns sharing a rank.
    columns.sort_by_key(|column| {
        (
            column.order,
            ranks.get(&column.id).copied().unwrap_or(fallback_rank),
        )
    });
}

#[cfg(test)]
mod tests {
    //! Regression coverage for column merging and ordering.
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn ids(columns: &[ColumnConfig]) -> Vec<&str> {
        columns.iter().map(|column| column.id.as_str()).collect()
    }

    #[rstest]
    #[case::missing(json!({"id": "sku", "order": 1}))]
    #[case::null(json!({"id": "sku", "order": 1, "width": null}))]
    #[case::zero(json!({"id": "sku", "order": 1, "width": 0}))]
    #[case::negative(json!({"id": "sku", "order": 1, "width": -40}))]
    fn unusable_width_defaults_to_100(#[case] raw: serde_json::Value) {
        let column: ColumnConfig = serde_json::from_value(raw).expect("lenient column");
        assert_eq!(column.width, DEFAULT_COLUMN_WIDTH);
    }

    #[rstest]
    fn fractional_width_is_rounded() {
        let column: ColumnConfig =
            serde_json::from_value(json!({"id": "sku", "width": 149.6})).expect("column");
        assert_eq!(column.width, 150);
    }

    #[rstest]
    fn missing_visible_defaults_to_true() {
        let column: ColumnConfig =
            serde_json::from_value(json!({"id": "sku", "width": 90, "order": 0})).expect("column");
        assert!(column.visible);
    }

    #[rstest]
    fn default_sets_have_unique_ids_and_sequential_order() {
        for report in ReportType::ALL {
            let columns = default_columns(report);
            let unique: HashSet<_> = columns.iter().map(|c| c.id.clone()).collect();
            assert_eq!(unique.len(), columns.len(), "{report} has duplicate ids");
            for (index, column) in columns.iter().enumerate() {
                assert_eq!(column.order as usize, index);
                assert!(column.visible);
            }
        }
    }

    #[rstest]
    fn merge_injects_missing_defaults_as_visible() {
        let defaults = default_columns(ReportType::ProductsReport);
        let stored = vec![ColumnConfig::new("price", 80, 0).with_visible(false)];

        let merged = merge_with_defaults(&stored, &defaults);

        assert_eq!(merged.len(), defaults.len());
        let price = merged.iter().find(|c| c.id == "price").expect("price kept");
        assert!(!price.visible);
        assert_eq!(price.width, 80);
        let name = merged.iter().find(|c| c.id == "name").expect("name injected");
        assert!(name.visible);
        assert_eq!(name.width, 200);
    }

    #[rstest]
    fn merge_drops_duplicate_ids_keeping_first() {
        let defaults = vec![ColumnConfig::new("name", 200, 0)];
        let stored = vec![
            ColumnConfig::new("name", 150, 0),
            ColumnConfig::new("name", 90, 1),
        ];

        let merged = merge_with_defaults(&stored, &defaults);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].width, 150);
    }

    #[rstest]
    fn merge_breaks_order_ties_by_default_position() {
        let defaults = vec![
            ColumnConfig::new("a", 100, 0),
            ColumnConfig::new("b", 100, 1),
            ColumnConfig::new("c", 100, 2),
        ];
        let stored = vec![
            ColumnConfig::new("c", 100, 0),
            ColumnConfig::new("a", 100, 0),
            ColumnConfig::new("b", 100, 0),
        ];

        let merged = merge_with_defaults(&stored, &defaults);

        assert_eq!(ids(&merged), ["a", "b", "c"]);
    }

    #[rstest]
    fn merge_keeps_unknown_stored_columns_after_defaults_on_tie() {
        let defaults = vec![ColumnConfig::new("a", 100, 0)];
        let stored = vec![ColumnConfig::new("legacyNotes", 100, 0)];

        let merged = merge_with_defaults(&stored, &defaults);

        assert_eq!(ids(&merged), ["a", "legacyNotes"]);
    }

    #[rstest]
    fn apply_column_order_moves_listed_columns_first() {
        let mut columns = default_columns(ReportType::ProductsReport);
        let order = vec!["stock".to_owned(), "ghost".to_owned(), "name".to_owned()];

        apply_column_order(&mut columns, &order);

        assert_eq!(&ids(&columns)[..3], ["stock", "name", "sku"]);
        for (index, column) in columns.iter().enumerate() {
            assert_eq!(column.order as usize, index);
        }
    }
}
