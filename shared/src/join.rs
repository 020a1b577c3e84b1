use serde::{Deserialize, Serialize};

use crate::dataset::{CellValue, RawDataset};

/// One input row projected onto its region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub region_key: Option<CellValue>,
    pub value: Option<f64>,
}

/// Projects the dataset into one record per row of the identifier column.
///
/// Rows are kept in input order with duplicates and nulls intact. Metric cells
/// that are missing or not numeric become `None`. Without a usable identifier
/// column the result is empty.
pub fn join_records(
    dataset: &RawDataset,
    id_column: Option<&str>,
    metric_column: Option<&str>,
) -> Vec<CanonicalRecord> {
    let Some(keys) = id_column.and_then(|column| dataset.column(column)) else {
        return Vec::new();
    };
    let metric = metric_column.and_then(|column| dataset.column(column));

    keys.iter()
        .enumerate()
        .map(|(row, key)| CanonicalRecord {
            region_key: key.clone(),
            value: metric
                .and_then(|values| values.get(row))
                .and_then(Option::as_ref)
                .and_then(CellValue::as_number),
        })
        .collect()
}
