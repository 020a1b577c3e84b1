use serde::Serialize;

pub const SOURCE_FIELD: &str = "source";
pub const DMA_ID_FIELD: &str = "dma_id";
pub const DMA_NAME_FIELD: &str = "dma_name";
pub const KPI_FIELD: &str = "kpi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Element,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    Integer,
    Text,
}

/// One entry of the editor panel declaration, in the host's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_multiple: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_types: Vec<ColumnType>,
}

impl EditorField {
    fn element(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Element,
            source: None,
            allow_multiple: None,
            allowed_types: Vec::new(),
        }
    }

    fn column(name: &'static str, allowed_types: &[ColumnType]) -> Self {
        Self {
            name,
            kind: FieldKind::Column,
            source: Some(SOURCE_FIELD),
            allow_multiple: Some(false),
            allowed_types: allowed_types.to_vec(),
        }
    }

    pub fn accepts(&self, column_type: ColumnType) -> bool {
        self.allowed_types.contains(&column_type)
    }
}

/// The single editor panel schema shared by every legend layout.
pub fn editor_panel() -> Vec<EditorField> {
    use ColumnType::*;
    vec![
        EditorField::element(SOURCE_FIELD),
        EditorField::column(DMA_ID_FIELD, &[Number, Integer, Text]),
        EditorField::column(DMA_NAME_FIELD, &[Number, Integer, Text]),
        EditorField::column(KPI_FIELD, &[Number, Integer]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_the_four_bindings_in_order() {
        let names: Vec<&str> = editor_panel().iter().map(|field| field.name).collect();
        assert_eq!(names, vec!["source", "dma_id", "dma_name", "kpi"]);
    }

    #[test]
    fn kpi_accepts_only_numeric_columns() {
        let panel = editor_panel();
        let kpi = panel.iter().find(|f| f.name == KPI_FIELD).expect("kpi field");
        assert!(kpi.accepts(ColumnType::Number));
        assert!(kpi.accepts(ColumnType::Integer));
        assert!(!kpi.accepts(ColumnType::Text));
    }

    #[test]
    fn serializes_in_host_shape() {
        let json = serde_json::to_value(editor_panel()).expect("serialize");
        assert_eq!(json[0], serde_json::json!({"name": "source", "type": "element"}));
        assert_eq!(
            json[1],
            serde_json::json!({
                "name": "dma_id",
                "type": "column",
                "source": "source",
                "allowMultiple": false,
                "allowedTypes": ["number", "integer", "text"],
            })
        );
    }
}
