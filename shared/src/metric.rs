use serde::{Deserialize, Serialize};

use crate::dataset::{CellValue, Configuration, RawDataset};

/// Observed range of the metric. `min <= max` always.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }
}

/// How the metric column was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// The `kpi` binding named a column present in the dataset.
    Configured,
    /// Legacy policy: the last column key of the dataset.
    LastColumn,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricExtraction {
    pub column: Option<String>,
    pub range: Option<MetricRange>,
    pub source: Option<MetricSource>,
}

/// Min/max over the finite numeric values of a column, `None` if there are none.
pub fn metric_range(values: &[Option<CellValue>]) -> Option<MetricRange> {
    values
        .iter()
        .flatten()
        .filter_map(CellValue::as_number)
        .fold(None, |range, value| {
            Some(match range {
                None => MetricRange {
                    min: value,
                    max: value,
                },
                Some(MetricRange { min, max }) => MetricRange {
                    min: min.min(value),
                    max: max.max(value),
                },
            })
        })
}

/// Takes the last column of the dataset as the metric.
pub fn extract_metric(dataset: &RawDataset) -> MetricExtraction {
    match dataset.last_key() {
        Some(column) => extraction(dataset, column, MetricSource::LastColumn),
        None => MetricExtraction::default(),
    }
}

/// Prefers the configured `kpi` column, falling back to [`extract_metric`]
/// when it is unbound or absent from the dataset.
pub fn extract_configured_metric(config: &Configuration, dataset: &RawDataset) -> MetricExtraction {
    match config.kpi_column() {
        Some(column) if dataset.column(column).is_some() => {
            extraction(dataset, column, MetricSource::Configured)
        }
        _ => extract_metric(dataset),
    }
}

fn extraction(dataset: &RawDataset, column: &str, source: MetricSource) -> MetricExtraction {
    MetricExtraction {
        column: Some(column.to_owned()),
        range: dataset.column(column).and_then(metric_range),
        source: Some(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(value: f64) -> Option<CellValue> {
        Some(CellValue::Number(value))
    }

    #[test]
    fn range_skips_nulls_nan_and_text() {
        let values = vec![
            num(10.0),
            None,
            num(f64::NAN),
            Some(CellValue::from("n/a")),
            Some(CellValue::from("42")),
            num(-3.0),
        ];
        assert_eq!(
            metric_range(&values),
            Some(MetricRange {
                min: -3.0,
                max: 42.0,
            })
        );
    }

    #[test]
    fn range_is_none_without_numeric_values() {
        assert_eq!(metric_range(&[]), None);
        assert_eq!(metric_range(&[None, Some(CellValue::from(""))]), None);
    }

    #[test]
    fn single_value_gives_degenerate_range() {
        let range = metric_range(&[num(5.0), None]).expect("range");
        assert!(range.is_degenerate());
    }

    #[test]
    fn last_column_is_the_metric() {
        let dataset = RawDataset::new()
            .with_column("region_id", [Some(CellValue::Integer(1))])
            .with_column("sales", [num(9.0)]);
        let extraction = extract_metric(&dataset);
        assert_eq!(extraction.column.as_deref(), Some("sales"));
        assert_eq!(extraction.source, Some(MetricSource::LastColumn));
        assert_eq!(
            extraction.range,
            Some(MetricRange {
                min: 9.0,
                max: 9.0,
            })
        );
    }

    #[test]
    fn empty_dataset_has_no_metric() {
        assert_eq!(extract_metric(&RawDataset::new()), MetricExtraction::default());
    }

    #[test]
    fn configured_kpi_wins_over_column_order() {
        // Host delivered the bound KPI column before another column.
        let dataset = RawDataset::new()
            .with_column("region_id", [Some(CellValue::Integer(1)), Some(CellValue::Integer(2))])
            .with_column("kpi", [num(1.0), num(2.0)])
            .with_column("notes", [Some(CellValue::from("a")), Some(CellValue::from("b"))]);
        let config = Configuration {
            kpi: Some("kpi".into()),
            ..Configuration::default()
        };

        let configured = extract_configured_metric(&config, &dataset);
        assert_eq!(configured.column.as_deref(), Some("kpi"));
        assert_eq!(configured.source, Some(MetricSource::Configured));
        assert_eq!(configured.range, Some(MetricRange { min: 1.0, max: 2.0 }));

        let legacy = extract_metric(&dataset);
        assert_eq!(legacy.column.as_deref(), Some("notes"));
        assert_eq!(legacy.range, None);
    }

    #[test]
    fn unbound_or_missing_kpi_falls_back_to_last_column() {
        let dataset = RawDataset::new()
            .with_column("region_id", [Some(CellValue::Integer(1))])
            .with_column("value", [num(3.0)]);

        let unbound = extract_configured_metric(&Configuration::default(), &dataset);
        assert_eq!(unbound.column.as_deref(), Some("value"));
        assert_eq!(unbound.source, Some(MetricSource::LastColumn));

        let missing = Configuration {
            kpi: Some("not_delivered".into()),
            ..Configuration::default()
        };
        let fallback = extract_configured_metric(&missing, &dataset);
        assert_eq!(fallback.column.as_deref(), Some("value"));
        assert_eq!(fallback.source, Some(MetricSource::LastColumn));
    }

    #[test]
    fn extraction_is_idempotent() {
        let dataset = RawDataset::new().with_column("v", [num(1.5), None, num(-2.5)]);
        assert_eq!(extract_metric(&dataset), extract_metric(&dataset));
    }
}
