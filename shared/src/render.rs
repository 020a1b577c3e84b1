use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::catalog::RegionCatalog;
use crate::colors::{ColorStops, NO_DATA_COLOR, RegionColor, Rgb, color_for};
use crate::dataset::{CellValue, HostBinding, RawDataset};
use crate::identifier::{IdentifierColumn, IdentifierKind, resolve_identifier};
use crate::join::join_records;
use crate::metric::{MetricExtraction, MetricRange, extract_configured_metric};

/// Where the renderer draws the gradient legend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendPlacement {
    /// Horizontal bar above the map with the KPI label, min on the left.
    #[default]
    Header,
    /// Vertical bar beside the map, max on top.
    Vertical,
}

impl LegendPlacement {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "header" | "horizontal" => Some(LegendPlacement::Header),
            "vertical" | "side" => Some(LegendPlacement::Vertical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSettings {
    pub stops: ColorStops,
    pub placement: LegendPlacement,
}

/// Reasons a render cycle degrades to an empty or partial map.
/// The `Display` text is shown inline to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("No data received.")]
    NoData,
    #[error("No numeric KPI column found in data.")]
    NoMetricColumn,
    #[error(
        "No DMA ID or DMA Name column selected. Please re-select columns in the plugin configuration panel."
    )]
    NoIdentifierBinding,
    #[error("Selected DMA ID / DMA Name columns contain no values.")]
    NoIdentifierValues,
    #[error("No numeric KPI values available.")]
    NoMetricValues,
}

impl ConfigurationError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigurationError::NoData => "no_data",
            ConfigurationError::NoMetricColumn => "no_metric_column",
            ConfigurationError::NoIdentifierBinding => "no_identifier_binding",
            ConfigurationError::NoIdentifierValues => "no_identifier_values",
            ConfigurationError::NoMetricValues => "no_metric_values",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Ready,
    Degraded(ConfigurationError),
}

impl RenderStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, RenderStatus::Ready)
    }

    pub fn error(&self) -> Option<ConfigurationError> {
        match self {
            RenderStatus::Ready => None,
            RenderStatus::Degraded(error) => Some(*error),
        }
    }
}

impl Serialize for RenderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RenderStatus::Ready => {
                let mut status = serializer.serialize_struct("RenderStatus", 1)?;
                status.serialize_field("state", "ready")?;
                status.end()
            }
            RenderStatus::Degraded(error) => {
                let mut status = serializer.serialize_struct("RenderStatus", 3)?;
                status.serialize_field("state", "degraded")?;
                status.serialize_field("code", error.code())?;
                status.serialize_field("message", &error.to_string())?;
                status.end()
            }
        }
    }
}

/// What the renderer receives for one input row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRegion {
    pub region_key: Option<CellValue>,
    pub value: Option<f64>,
    pub color: RegionColor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dma_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub placement: LegendPlacement,
    pub label: String,
    pub start_color: Rgb,
    pub end_color: Rgb,
    pub no_data_color: Rgb,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub gradient_css: String,
}

impl Legend {
    pub fn new(
        placement: LegendPlacement,
        stops: &ColorStops,
        range: Option<MetricRange>,
        label: &str,
    ) -> Self {
        let gradient_css = match placement {
            LegendPlacement::Header => format!(
                "linear-gradient(90deg, {} 0%, {} 100%)",
                stops.start_color, stops.end_color
            ),
            LegendPlacement::Vertical => format!(
                "linear-gradient(180deg, {} 0%, {} 100%)",
                stops.end_color, stops.start_color
            ),
        };
        Self {
            placement,
            label: label.to_owned(),
            start_color: stops.start_color,
            end_color: stops.end_color,
            no_data_color: NO_DATA_COLOR,
            min: range.map(|r| r.min),
            max: range.map(|r| r.max),
            gradient_css,
        }
    }
}

/// Fully derived view of one host binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub status: RenderStatus,
    pub identifier: Option<IdentifierColumn>,
    pub metric: MetricExtraction,
    pub kpi_label: String,
    pub regions: Vec<RenderedRegion>,
    pub legend: Legend,
}

impl RenderPlan {
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

/// Runs resolve → extract → join → color for one binding.
///
/// Never fails: configuration problems are reported through `status` and the
/// plan still carries whatever regions could be joined.
pub fn build_render_plan(
    binding: &HostBinding,
    settings: &RenderSettings,
    kpi_label: &str,
    catalog: &RegionCatalog,
) -> RenderPlan {
    let empty = RawDataset::new();
    let dataset = binding.data.as_ref().unwrap_or(&empty);
    let config = &binding.config;

    let identifier = resolve_identifier(config, dataset);
    let metric = extract_configured_metric(config, dataset);
    let records = join_records(
        dataset,
        identifier.as_ref().map(|id| id.column.as_str()),
        metric.column.as_deref(),
    );
    let by_name = identifier
        .as_ref()
        .is_some_and(|id| id.key == IdentifierKind::Name);

    let regions = records
        .into_iter()
        .map(|record| {
            let dma_name = record.region_key.as_ref().and_then(|key| {
                catalog
                    .region_name(key)
                    .map(str::to_owned)
                    .or_else(|| by_name.then(|| key.to_string()))
            });
            RenderedRegion {
                color: color_for(record.value, metric.range, &settings.stops),
                region_key: record.region_key,
                value: record.value,
                dma_name,
            }
        })
        .collect();

    let status = match check_configuration(binding, identifier.as_ref(), &metric) {
        Ok(()) => RenderStatus::Ready,
        Err(error) => RenderStatus::Degraded(error),
    };

    RenderPlan {
        status,
        legend: Legend::new(settings.placement, &settings.stops, metric.range, kpi_label),
        identifier,
        metric,
        kpi_label: kpi_label.to_owned(),
        regions,
    }
}

/// First failing check wins. `NoMetricColumn` cannot follow a non-empty
/// dataset through [`extract_configured_metric`], which always falls back to
/// the last column; the check stays for extractions that do not.
fn check_configuration(
    binding: &HostBinding,
    identifier: Option<&IdentifierColumn>,
    metric: &MetricExtraction,
) -> Result<(), ConfigurationError> {
    if binding.data.as_ref().is_none_or(RawDataset::is_empty) {
        return Err(ConfigurationError::NoData);
    }
    if metric.column.is_none() {
        return Err(ConfigurationError::NoMetricColumn);
    }
    if !binding.config.has_identifier_binding() {
        return Err(ConfigurationError::NoIdentifierBinding);
    }
    if identifier.is_none() {
        return Err(ConfigurationError::NoIdentifierValues);
    }
    if metric.range.is_none() {
        return Err(ConfigurationError::NoMetricValues);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::dataset::Configuration;
    use crate::metric::MetricSource;

    fn int(value: i64) -> Option<CellValue> {
        Some(CellValue::Integer(value))
    }

    fn binding(config: Configuration, data: Option<RawDataset>) -> HostBinding {
        HostBinding::new(config, data)
    }

    fn id_config() -> Configuration {
        Configuration {
            dma_id: Some("region_id".into()),
            kpi: Some("kpi".into()),
            ..Configuration::default()
        }
    }

    fn render_default(binding: &HostBinding) -> RenderPlan {
        build_render_plan(
            binding,
            &RenderSettings::default(),
            "KPI",
            &RegionCatalog::default(),
        )
    }

    #[test]
    fn scenario_with_null_metric_value() {
        let data = RawDataset::new()
            .with_column("region_id", [int(1), int(2), int(3)])
            .with_column("kpi", [int(10), None, int(30)]);
        let plan = render_default(&binding(id_config(), Some(data)));
        let stops = ColorStops::default();

        assert_eq!(plan.status, RenderStatus::Ready);
        assert_eq!(plan.metric.range, Some(MetricRange { min: 10.0, max: 30.0 }));
        assert_eq!(plan.metric.source, Some(MetricSource::Configured));
        let keys: Vec<_> = plan.regions.iter().map(|r| r.region_key.clone()).collect();
        assert_eq!(keys, vec![int(1), int(2), int(3)]);
        assert_eq!(plan.regions[0].color, RegionColor::Gradient(stops.start_color));
        assert_eq!(plan.regions[1].color, RegionColor::NoData);
        assert_eq!(plan.regions[2].color, RegionColor::Gradient(stops.end_color));
        assert_eq!(plan.legend.min, Some(10.0));
        assert_eq!(plan.legend.max, Some(30.0));
    }

    #[test]
    fn zero_rows_degrade_without_panicking() {
        let data = RawDataset::new()
            .with_column("region_id", Vec::new())
            .with_column("kpi", Vec::new());
        let plan = render_default(&binding(id_config(), Some(data)));
        assert!(plan.regions.is_empty());
        assert_eq!(plan.metric.range, None);
        assert_eq!(
            plan.status,
            RenderStatus::Degraded(ConfigurationError::NoIdentifierValues)
        );
        assert_eq!(plan.legend.min, None);
    }

    #[test]
    fn missing_data_reports_no_data() {
        for data in [None, Some(RawDataset::new())] {
            let plan = render_default(&binding(id_config(), data));
            assert_eq!(plan.status, RenderStatus::Degraded(ConfigurationError::NoData));
            assert!(plan.regions.is_empty());
        }
    }

    #[test]
    fn missing_metric_column_is_reported_before_identifier_checks() {
        let data = RawDataset::new().with_column("region_id", [int(1)]);
        let binding = binding(Configuration::default(), Some(data));
        assert_eq!(
            check_configuration(&binding, None, &MetricExtraction::default()),
            Err(ConfigurationError::NoMetricColumn)
        );
        // The configured extractor never leaves a non-empty dataset without a column.
        let plan = render_default(&binding);
        assert_eq!(plan.metric.column.as_deref(), Some("region_id"));
        assert_eq!(
            plan.status.error(),
            Some(ConfigurationError::NoIdentifierBinding)
        );
    }

    #[test]
    fn unbound_identifier_is_reported() {
        let data = RawDataset::new()
            .with_column("region_id", [int(1)])
            .with_column("kpi", [int(5)]);
        let config = Configuration {
            kpi: Some("kpi".into()),
            ..Configuration::default()
        };
        let plan = render_default(&binding(config, Some(data)));
        assert_eq!(
            plan.status.error(),
            Some(ConfigurationError::NoIdentifierBinding)
        );
        assert!(plan.regions.is_empty());
    }

    #[test]
    fn non_numeric_metric_keeps_regions_as_no_data() {
        let data = RawDataset::new()
            .with_column("region_id", [int(1), int(2)])
            .with_column("kpi", [Some(CellValue::from("n/a")), None]);
        let plan = render_default(&binding(id_config(), Some(data)));
        assert_eq!(plan.status.error(), Some(ConfigurationError::NoMetricValues));
        assert_eq!(plan.region_count(), 2);
        assert!(plan.regions.iter().all(|r| r.color.is_no_data()));
    }

    #[test]
    fn catalog_and_name_keys_fill_region_names() {
        let catalog = RegionCatalog::from_entries([CatalogEntry {
            dma_id: 501,
            dma_name: "New York".into(),
        }]);
        let data = RawDataset::new()
            .with_column("region_id", [int(501), int(502)])
            .with_column("kpi", [int(1), int(2)]);
        let plan = build_render_plan(
            &binding(id_config(), Some(data)),
            &RenderSettings::default(),
            "KPI",
            &catalog,
        );
        assert_eq!(plan.regions[0].dma_name.as_deref(), Some("New York"));
        assert_eq!(plan.regions[1].dma_name, None);

        let data = RawDataset::new()
            .with_column("name", [Some(CellValue::from("Boston"))])
            .with_column("kpi", [int(1)]);
        let config = Configuration {
            dma_name: Some("name".into()),
            ..Configuration::default()
        };
        let plan = render_default(&binding(config, Some(data)));
        assert_eq!(plan.regions[0].dma_name.as_deref(), Some("Boston"));
        assert_eq!(
            plan.identifier.map(|id| id.key),
            Some(IdentifierKind::Name)
        );
    }

    #[test]
    fn legend_follows_placement() {
        let stops = ColorStops::default();
        let header = Legend::new(LegendPlacement::Header, &stops, None, "Sales");
        assert_eq!(
            header.gradient_css,
            "linear-gradient(90deg, #d4f9d0 0%, #27e7b8 100%)"
        );
        let vertical = Legend::new(LegendPlacement::Vertical, &stops, None, "Sales");
        assert_eq!(
            vertical.gradient_css,
            "linear-gradient(180deg, #27e7b8 0%, #d4f9d0 100%)"
        );
        assert_eq!(LegendPlacement::parse(" Vertical "), Some(LegendPlacement::Vertical));
        assert_eq!(LegendPlacement::parse("diagonal"), None);
    }

    #[test]
    fn status_serializes_code_and_message() {
        let json = serde_json::to_value(RenderStatus::Degraded(ConfigurationError::NoData))
            .expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"state": "degraded", "code": "no_data", "message": "No data received."})
        );
        assert_eq!(
            serde_json::to_value(RenderStatus::Ready).expect("serialize"),
            serde_json::json!({"state": "ready"})
        );
    }

    #[test]
    fn plan_is_deterministic() {
        let data = RawDataset::new()
            .with_column("region_id", [int(1), int(2)])
            .with_column("kpi", [Some(CellValue::Number(0.25)), int(4)]);
        let binding = binding(id_config(), Some(data));
        assert_eq!(render_default(&binding), render_default(&binding));
    }
}
