use serde::{Deserialize, Serialize};

use crate::dataset::{Configuration, RawDataset};

/// Which identifier scheme joins rows to regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Id,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierColumn {
    pub key: IdentifierKind,
    pub column: String,
}

/// Picks the identifier column for this dataset.
///
/// A configured candidate is present when its column exists and holds at
/// least one non-null value. `dma_id` always wins over `dma_name` when both
/// are present; `None` means neither is usable.
pub fn resolve_identifier(
    config: &Configuration,
    dataset: &RawDataset,
) -> Option<IdentifierColumn> {
    let candidates = [
        (IdentifierKind::Id, config.dma_id_column()),
        (IdentifierKind::Name, config.dma_name_column()),
    ];

    candidates.into_iter().find_map(|(key, column)| {
        let column = column?;
        is_present(dataset, column).then(|| IdentifierColumn {
            key,
            column: column.to_owned(),
        })
    })
}

fn is_present(dataset: &RawDataset, column: &str) -> bool {
    dataset
        .column(column)
        .is_some_and(|values| values.iter().any(Option::is_some))
}
