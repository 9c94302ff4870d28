//! Ordering of sibling nodes.

use std::cmp::Ordering;

use crate::fs::entry::NodeInfo;

/// The field by which entries are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Sort alphabetically by name (case-insensitive).
    Name,
    /// Sort by file size in bytes.
    Size,
    /// Sort by last-modified time.
    Date,
    /// Sort by file extension (case-insensitive).
    Type,
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest / earliest / A–Z first.
    Ascending,
    /// Largest / latest / Z–A first.
    Descending,
}

/// Column/order pair applied to every populated node of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
    /// Directories always precede files regardless of `field`.
    pub dirs_first: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::Name,
            direction: SortDirection::Ascending,
            dirs_first: true,
        }
    }
}

/// Compares two entries under `spec`.
///
/// Ties on the chosen field fall back to the name so the order is total.
pub fn compare(a: &NodeInfo, b: &NodeInfo, spec: SortSpec) -> Ordering {
    if spec.dirs_first {
        let dir_cmp = b.is_dir().cmp(&a.is_dir());
        if dir_cmp != Ordering::Equal {
            return dir_cmp;
        }
    }

    let ord = compare_by_field(a, b, spec.field).then_with(|| compare_names(a, b));

    match spec.direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    }
}

fn compare_by_field(a: &NodeInfo, b: &NodeInfo, field: SortField) -> Ordering {
    match field {
        SortField::Name => compare_names(a, b),
        SortField::Size => a.size().cmp(&b.size()),
        SortField::Date => a.modified().cmp(&b.modified()),
        SortField::Type => extension_lower(a).cmp(&extension_lower(b)),
    }
}

fn compare_names(a: &NodeInfo, b: &NodeInfo) -> Ordering {
    a.name().to_lowercase().cmp(&b.name().to_lowercase())
}

fn extension_lower(info: &NodeInfo) -> String {
    info.path()
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
