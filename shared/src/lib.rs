pub mod catalog;
pub mod colors;
pub mod dataset;
pub mod editor_panel;
pub mod events;
pub mod identifier;
pub mod join;
pub mod label;
pub mod metric;
pub mod overlay;
pub mod render;

pub use catalog::{CatalogEntry, RegionCatalog};
pub use colors::{ColorStops, RegionColor, Rgb, color_for};
pub use dataset::{CellValue, Configuration, HostBinding, RawDataset};
pub use events::*;
pub use identifier::{IdentifierColumn, IdentifierKind, resolve_identifier};
pub use join::{CanonicalRecord, join_records};
pub use label::{DEFAULT_KPI_LABEL, parse_kpi_label};
pub use metric::{MetricExtraction, MetricRange, extract_configured_metric, extract_metric};
pub use overlay::{DisplayRecord, OverlayKind, OverlayState, OverlayView, SelectionEvent};
pub use render::{LegendPlacement, RenderPlan, RenderSettings, RenderStatus, build_render_plan};
