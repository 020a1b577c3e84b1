use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::CellValue;

/// Where a picked region may carry an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    Flat(&'static str),
    Nested(&'static str, &'static str),
}

impl FieldPath {
    fn lookup<'a>(&self, attributes: &'a Map<String, Value>) -> Option<&'a Value> {
        let value = match self {
            FieldPath::Flat(field) => attributes.get(*field),
            FieldPath::Nested(parent, field) => attributes
                .get(*parent)
                .and_then(Value::as_object)
                .and_then(|nested| nested.get(*field)),
        }?;
        (!value.is_null()).then_some(value)
    }
}

/// Region name lookup order: geometry-layer properties first, then flattened
/// record fields, then the raw join key.
pub const REGION_NAME_FIELDS: &[FieldPath] = &[
    FieldPath::Nested("properties", "dma_name"),
    FieldPath::Flat("dma_name"),
    FieldPath::Flat("dma"),
    FieldPath::Flat("DMA"),
    FieldPath::Flat("region_key"),
];

pub const VALUE_FIELDS: &[FieldPath] = &[FieldPath::Flat("numeric_value"), FieldPath::Flat("value")];

/// Attribute bag of one region as reported by the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickedRegion(pub Map<String, Value>);

impl PickedRegion {
    fn first_of(&self, fields: &[FieldPath]) -> Option<&Value> {
        fields.iter().find_map(|field| field.lookup(&self.0))
    }
}

impl From<Value> for PickedRegion {
    /// Non-object values become an empty bag.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => PickedRegion(fields),
            _ => PickedRegion::default(),
        }
    }
}

/// Hover or click reported by the renderer. `objects` is set for
/// multi-select and takes precedence over `object`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<PickedRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<PickedRegion>>,
}

impl SelectionEvent {
    pub fn single(x: f64, y: f64, object: PickedRegion) -> Self {
        Self {
            x,
            y,
            object: Some(object),
            objects: None,
        }
    }

    pub fn batch(x: f64, y: f64, objects: Vec<PickedRegion>) -> Self {
        Self {
            x,
            y,
            object: None,
            objects: Some(objects),
        }
    }

    /// Picked regions as one sequence, whether single or batch.
    pub fn picked(&self) -> Vec<&PickedRegion> {
        match &self.objects {
            Some(objects) => objects.iter().collect(),
            None => self.object.iter().collect(),
        }
    }
}

/// Normalized summary of one picked region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRecord {
    pub region: String,
    pub value: Option<CellValue>,
}

impl DisplayRecord {
    pub fn value_text(&self) -> String {
        self.value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

pub fn describe(picked: &PickedRegion) -> DisplayRecord {
    DisplayRecord {
        region: picked
            .first_of(REGION_NAME_FIELDS)
            .map(value_to_text)
            .unwrap_or_default(),
        value: picked.first_of(VALUE_FIELDS).map(value_to_cell),
    }
}

/// Describes every picked region of the event.
pub fn describe_event(event: &SelectionEvent) -> Vec<DisplayRecord> {
    event.picked().into_iter().map(describe).collect()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn value_to_cell(value: &Value) -> CellValue {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(integer) => CellValue::Integer(integer),
            None => CellValue::Number(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => CellValue::Text(text.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

/// Clipboard CSV: `Region,<label>` header then one `region,value` row per record.
///
/// Fields are not quoted, so names containing commas or newlines produce
/// malformed rows.
pub fn export_csv(records: &[DisplayRecord], metric_label: &str) -> String {
    std::iter::once(format!("Region,{metric_label}"))
        .chain(
            records
                .iter()
                .map(|record| format!("{},{}", record.region, record.value_text())),
        )
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn export_event_csv(event: &SelectionEvent, metric_label: &str) -> String {
    export_csv(&describe_event(event), metric_label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Hover,
    Click,
}

/// What the overlay currently shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayView {
    pub kind: OverlayKind,
    pub x: f64,
    pub y: f64,
    pub metric_label: String,
    pub records: Vec<DisplayRecord>,
    pub lines: Vec<String>,
}

impl OverlayView {
    /// `None` when the event picked nothing.
    pub fn from_event(kind: OverlayKind, event: &SelectionEvent, metric_label: &str) -> Option<Self> {
        let records = describe_event(event);
        let primary = records.first()?;
        let lines = vec![
            format!("Region: {}", primary.region),
            format!("{metric_label}: {}", primary.value_text()),
        ];
        Some(Self {
            kind,
            x: event.x,
            y: event.y,
            metric_label: metric_label.to_owned(),
            records,
            lines,
        })
    }

    pub fn to_csv(&self) -> String {
        export_csv(&self.records, &self.metric_label)
    }
}

/// Last-write-wins holder of the overlay.
#[derive(Debug, Clone, Default)]
pub struct OverlayState {
    current: Option<OverlayView>,
    revision: u64,
}

impl OverlayState {
    /// Replaces the overlay with one derived from `event`. An event that
    /// picked nothing clears it.
    pub fn apply(
        &mut self,
        kind: OverlayKind,
        event: &SelectionEvent,
        metric_label: &str,
    ) -> Option<&OverlayView> {
        self.current = OverlayView::from_event(kind, event, metric_label);
        self.revision += 1;
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.revision += 1;
    }

    pub fn current(&self) -> Option<&OverlayView> {
        self.current.as_ref()
    }

    /// Bumped on every apply or clear.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
