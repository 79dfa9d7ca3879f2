//! Output formatting
//!
//! Line-oriented rendering of Identifiers, Attributes, and Snapshots using
//! colored output. Identifiers are prefixed `+ `, Attributes ` - `, absence
//! of data is the literal `[NO DATA]` marker, and historical Snapshots are
//! separated by a `==========` line.

use console::Style;

use crate::model::{Attribute, Snapshot};
use crate::registry::TypeRegistry;

/// Marker printed when a query produced nothing.
pub const NO_DATA: &str = "[NO DATA]";
/// Separator between historical Snapshots.
pub const SNAPSHOT_SEPARATOR: &str = "==========";

/// Formatter for console results.
pub struct OutputFormatter {
    green: Style,
    yellow: Style,
    red: Style,
    dim: Style,
    bold: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print one Identifier line.
    pub fn print_identifier(&self, id: &str) {
        println!("+ {}", self.green.apply_to(id));
    }

    /// Print one Attribute line beneath its Identifier.
    pub fn print_attribute(&self, attr: &Attribute, registry: &TypeRegistry) {
        println!(
            " - {} = {} {}",
            self.bold.apply_to(&attr.name),
            registry.render(&attr.name, &attr.payload),
            self.dim.apply_to(format!(
                "[{} by {}]",
                attr.created_display(),
                attr.origin
            )),
        );
    }

    /// Print a full Snapshot: each Identifier and its Attributes under it.
    pub fn print_snapshot(&self, snapshot: &Snapshot, registry: &TypeRegistry) {
        for (id, attrs) in &snapshot.entries {
            self.print_identifier(id);
            if attrs.is_empty() {
                println!(" {NO_DATA}");
                continue;
            }
            for attr in attrs {
                self.print_attribute(attr, registry);
            }
        }
    }

    /// Print the no-data marker.
    pub fn print_no_data(&self) {
        println!("{}", self.yellow.apply_to(NO_DATA));
    }

    /// Print the separator between historical Snapshots.
    pub fn print_snapshot_separator(&self) {
        println!("{SNAPSHOT_SEPARATOR}");
    }

    /// Print a one-line error report.
    pub fn print_error(&self, message: &str) {
        println!("{}", self.red.apply_to(message));
    }
}
