use serde_json::Value;

pub const KPI_LABEL_PARAM: &str = "kpiLabel";
pub const DEFAULT_KPI_LABEL: &str = "KPI";

/// Resolves the cosmetic KPI label from the (already percent-decoded)
/// `kpiLabel` query parameter.
///
/// Values that look like JSON must parse as a string, or as an object with a
/// string `label`; anything else falls back to [`DEFAULT_KPI_LABEL`]. Bare
/// values have JSON escapes decoded when they are well formed.
pub fn parse_kpi_label(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return DEFAULT_KPI_LABEL.to_owned();
    };

    let label = if raw.starts_with(['{', '[', '"']) {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::String(label)) => Some(label),
            Ok(Value::Object(fields)) => match fields.get("label") {
                Some(Value::String(label)) => Some(label.clone()),
                _ => None,
            },
            _ => None,
        }
    } else {
        let quoted = format!("\"{}\"", raw.replace('"', "\\\""));
        Some(serde_json::from_str::<String>(&quoted).unwrap_or_else(|_| raw.to_owned()))
    };

    label
        .filter(|label| !label.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_KPI_LABEL.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_blank_uses_default() {
        assert_eq!(parse_kpi_label(None), "KPI");
        assert_eq!(parse_kpi_label(Some("")), "KPI");
        assert_eq!(parse_kpi_label(Some("   ")), "KPI");
    }

    #[test]
    fn bare_string_is_used_verbatim() {
        assert_eq!(parse_kpi_label(Some("Total Sales")), "Total Sales");
        assert_eq!(parse_kpi_label(Some("Say \"hi\"")), "Say \"hi\"");
    }

    #[test]
    fn bare_string_escapes_are_decoded() {
        assert_eq!(parse_kpi_label(Some("Caf\\u00e9")), "Café");
        assert_eq!(parse_kpi_label(Some("Tab\\tbed")), "Tab\tbed");
    }

    #[test]
    fn malformed_escape_keeps_raw_value() {
        assert_eq!(parse_kpi_label(Some("Sales\\q")), "Sales\\q");
    }

    #[test]
    fn json_string_and_object_forms() {
        assert_eq!(parse_kpi_label(Some("\"Revenue\"")), "Revenue");
        assert_eq!(parse_kpi_label(Some(r#"{"label":"Impressions"}"#)), "Impressions");
    }

    #[test]
    fn unusable_json_falls_back_to_default() {
        assert_eq!(parse_kpi_label(Some("{not json")), "KPI");
        assert_eq!(parse_kpi_label(Some("[1,2]")), "KPI");
        assert_eq!(parse_kpi_label(Some(r#"{"label":3}"#)), "KPI");
        assert_eq!(parse_kpi_label(Some("\"\"")), "KPI");
    }
}
