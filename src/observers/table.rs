//! Table observer for printing counters.
//!
//! [`TableObserver`] renders counters as a text table with the `tabled`
//! crate, either one entry per row or as a compact `name: value` grid.
//! [`TableObserver::render_block`] prints a whole block one category at a
//! time with the slot offsets in the first column.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! mmsperf = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use mmsperf::block::PerfBlock;
//! use mmsperf::layout::{Category, CounterId};
//! use mmsperf::observers::table::{TableObserver, TableStyle};
//!
//! let block = PerfBlock::new();
//! block.add(CounterId::SeRetrysProcessed, 7).unwrap();
//!
//! let observer = TableObserver::new().with_style(TableStyle::Ascii);
//! let output = observer.render(block.category_observables(Category::SyncEngine).into_iter());
//! assert!(output.contains("MMSPERF_SE_RETRYS_PROCESSED"));
//! ```

use crate::block::PerfBlock;
use crate::counters::{Observable, ObservableEntry};
use crate::layout::{Category, CounterId};
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Available table styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// `+`, `-` and `|` only.
    Ascii,
    #[default]
    Rounded,
    Sharp,
    Modern,
    Extended,
    /// GitHub-flavored Markdown.
    Markdown,
    ReStructuredText,
    Dots,
    /// No borders, just spacing.
    Blank,
}

/// Separator between name and value in compact mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompactSeparator {
    /// `name: value`
    #[default]
    Colon,
    /// `name = value`
    Equals,
    /// `name → value`
    Arrow,
    /// `name | value`
    Pipe,
    /// `name value`
    Space,
}

impl CompactSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactSeparator::Colon => ": ",
            CompactSeparator::Equals => " = ",
            CompactSeparator::Arrow => " → ",
            CompactSeparator::Pipe => " | ",
            CompactSeparator::Space => " ",
        }
    }
}

/// Configuration for the table observer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub style: TableStyle,
    /// Show the header row (standard mode only).
    pub show_header: bool,
    /// Line printed above the table.
    pub title: Option<String>,
    /// Render `name: value` cells in a grid.
    pub compact: bool,
    /// Grid width in compact mode.
    pub columns: usize,
    pub separator: CompactSeparator,
    /// Filler for the last row of the grid.
    pub empty_cell: String,
    /// Leave out entries whose value is zero.
    pub hide_zero: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            compact: false,
            columns: 1,
            separator: CompactSeparator::default(),
            empty_cell: String::new(),
            hide_zero: false,
        }
    }
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Offset")]
    offset: u16,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn display_name(entry: &ObservableEntry) -> String {
    if entry.name.is_empty() {
        "(unnamed)".to_string()
    } else {
        entry.name.to_string()
    }
}

/// An observer that renders counters as a text table.
///
/// Compact mode with three columns:
///
/// ```rust
/// use mmsperf::counters::monotone::Monotone;
/// use mmsperf::counters::Observable;
/// use mmsperf::observers::table::{CompactSeparator, TableObserver};
///
/// let imported = Monotone::new().with_name("imported");
/// let exported = Monotone::new().with_name("exported");
/// imported.add(4);
///
/// let counters: Vec<&dyn Observable> = vec![&imported, &exported];
/// let output = TableObserver::new()
///     .compact(true)
///     .columns(3)
///     .separator(CompactSeparator::Equals)
///     .render(counters.into_iter());
///
/// assert!(output.contains("imported = 4"));
/// assert!(output.contains("exported = 0"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Rounded style, standard mode.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Only applies in standard mode.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn compact(mut self, enabled: bool) -> Self {
        self.config.compact = enabled;
        self
    }

    /// Values below 1 are treated as 1.
    pub fn columns(mut self, count: usize) -> Self {
        self.config.columns = count.max(1);
        self
    }

    pub fn separator(mut self, sep: CompactSeparator) -> Self {
        self.config.separator = sep;
        self
    }

    pub fn empty_cell(mut self, placeholder: impl Into<String>) -> Self {
        self.config.empty_cell = placeholder.into();
        self
    }

    pub fn hide_zero(mut self, enabled: bool) -> Self {
        self.config.hide_zero = enabled;
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Extended => {
                table.with(Style::extended());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::ReStructuredText => {
                table.with(Style::re_structured_text());
            }
            TableStyle::Dots => {
                table.with(Style::dots());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    fn finish(&self, mut table: Table, title: Option<&str>) -> String {
        self.apply_style(&mut table);
        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }
        match title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    fn visible(&self, entry: &ObservableEntry) -> bool {
        !(self.config.hide_zero && entry.value.is_zero())
    }

    fn render_compact(&self, entries: Vec<ObservableEntry>) -> String {
        let cells: Vec<String> = entries
            .iter()
            .map(|entry| {
                let name = if entry.labels.is_empty() {
                    display_name(entry)
                } else {
                    format!("{}{{{}}}", display_name(entry), entry.labels_string())
                };
                format!("{}{}{}", name, self.config.separator.as_str(), entry.value)
            })
            .collect();

        if cells.is_empty() {
            return String::new();
        }

        let cols = self.config.columns.max(1);
        let mut builder = Builder::default();
        for chunk in cells.chunks(cols) {
            let mut row: Vec<String> = chunk.to_vec();
            while row.len() < cols {
                row.push(self.config.empty_cell.clone());
            }
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        match &self.config.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    fn render_standard(&self, entries: Vec<ObservableEntry>) -> String {
        let rows: Vec<EntryRow> = entries
            .iter()
            .map(|entry| EntryRow {
                name: display_name(entry),
                labels: entry.labels_string(),
                value: entry.value.to_string(),
            })
            .collect();
        self.finish(Table::new(&rows), self.config.title.as_deref())
    }

    /// Renders the counters as a table.
    pub fn render<'a>(&self, counters: impl Iterator<Item = &'a dyn Observable>) -> String {
        let entries: Vec<ObservableEntry> = counters
            .flat_map(|c| c.expand())
            .filter(|e| self.visible(e))
            .collect();
        if self.config.compact {
            self.render_compact(entries)
        } else {
            self.render_standard(entries)
        }
    }

    /// Renders every live category of `block` as its own table, titled
    /// with the category and its base offset.
    pub fn render_block(&self, block: &PerfBlock) -> String {
        let mut sections = Vec::new();
        for category in Category::ALL {
            let rows: Vec<SlotRow> = category
                .counters()
                .filter_map(|id: CounterId| block.slot(id).map(|slot| (id, slot)))
                .flat_map(|(id, slot)| {
                    slot.expand()
                        .into_iter()
                        .map(move |entry| (id, entry))
                })
                .filter(|(_, entry)| self.visible(entry))
                .map(|(id, entry)| SlotRow {
                    offset: id.offset(),
                    name: display_name(&entry),
                    labels: entry.labels_string(),
                    value: entry.value.to_string(),
                })
                .collect();
            if rows.is_empty() {
                continue;
            }

            let title = format!(
                "{} ({} @ {})",
                category.title(),
                category.base().name(),
                category.base().offset()
            );
            sections.push(self.finish(Table::new(&rows), Some(&title)));
        }
        sections.join("\n\n")
    }
}
