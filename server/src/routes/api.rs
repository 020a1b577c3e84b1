use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use dma_heatmap_shared::editor_panel::{EditorField, editor_panel};
use dma_heatmap_shared::overlay::export_event_csv;
use dma_heatmap_shared::{
    DEFAULT_KPI_LABEL, HostBinding, OverlayKind, RenderEnvelope, SelectionEvent, build_render_plan,
    parse_kpi_label,
};
use serde::Deserialize;
use tracing::{debug, error};

use crate::state::{AppState, ObservabilitySnapshot, overlay_json};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
pub struct LabelQuery {
    #[serde(default, rename = "kpiLabel")]
    pub kpi_label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OverlayRequest {
    pub kind: OverlayKind,
    #[serde(default)]
    pub event: SelectionEvent,
    #[serde(default, rename = "kpiLabel")]
    pub kpi_label: Option<String>,
}

/// Without an `event`, the current overlay is exported.
#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub event: Option<SelectionEvent>,
    #[serde(default, rename = "kpiLabel")]
    pub kpi_label: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (seq, region_count, render_state) = {
        let snapshot = state.render_snapshot.read().await;
        (
            snapshot.seq,
            snapshot.plan.region_count(),
            if snapshot.plan.status.is_ready() {
                "ready"
            } else {
                "degraded"
            },
        )
    };
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "seq": seq,
        "regions": region_count,
        "render_state": render_state,
        "catalog_regions": state.catalog.len(),
        "observability": observability,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let (seq, region_count, render_ready) = {
        let snapshot = state.render_snapshot.read().await;
        (
            snapshot.seq,
            snapshot.plan.region_count(),
            snapshot.plan.status.is_ready(),
        )
    };
    let body = render_prometheus_metrics(
        seq,
        region_count,
        render_ready,
        state.catalog.len(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn render_prometheus_metrics(
    seq: u64,
    region_count: usize,
    render_ready: bool,
    catalog_regions: usize,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    let mut gauge = |name: &str, help: &str, value: u64| {
        let _ = writeln!(body, "# HELP dma_heatmap_{name} {help}");
        let _ = writeln!(body, "# TYPE dma_heatmap_{name} gauge");
        let _ = writeln!(body, "dma_heatmap_{name} {value}");
    };
    gauge("render_seq", "Sequence number of the current render plan.", seq);
    gauge(
        "regions",
        "Regions in the current render plan.",
        region_count as u64,
    );
    gauge(
        "render_ready",
        "Whether the current render plan is free of configuration errors (1 or 0).",
        u64::from(render_ready),
    );
    gauge(
        "catalog_regions",
        "Entries in the DMA region catalog.",
        catalog_regions as u64,
    );

    let counters = [
        (
            "bindings_received_total",
            "Total host bindings received.",
            observability.bindings_received_total,
        ),
        (
            "bindings_unchanged_total",
            "Total host bindings skipped because their fingerprint was unchanged.",
            observability.bindings_unchanged_total,
        ),
        (
            "degraded_renders_total",
            "Total render plans built with a configuration error.",
            observability.degraded_renders_total,
        ),
        (
            "render_requests_total",
            "Total render API requests.",
            observability.render_requests_total,
        ),
        (
            "overlay_updates_total",
            "Total overlay updates and clears.",
            observability.overlay_updates_total,
        ),
        (
            "exports_total",
            "Total CSV exports.",
            observability.exports_total,
        ),
        (
            "sse_lagged_events_total",
            "Total events skipped by lagging SSE clients.",
            observability.sse_lagged_events_total,
        ),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(body, "# HELP dma_heatmap_{name} {help}");
        let _ = writeln!(body, "# TYPE dma_heatmap_{name} counter");
        let _ = writeln!(body, "dma_heatmap_{name} {value}");
    }

    body
}

pub async fn get_editor_panel() -> Json<Vec<EditorField>> {
    Json(editor_panel())
}

pub async fn post_binding(
    State(state): State<AppState>,
    Json(binding): Json<HostBinding>,
) -> Response {
    match state.apply_binding(binding).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize render snapshot");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serves the pre-serialized render plan. A non-default `kpiLabel` rebuilds
/// the plan for that label and bypasses the ETag.
pub async fn get_render(
    State(state): State<AppState>,
    Query(query): Query<LabelQuery>,
    headers: HeaderMap,
) -> Response {
    state.observability.record_render_request();
    let label = parse_kpi_label(query.kpi_label.as_deref());
    let snapshot = state.render_snapshot.read().await.clone();

    if label == DEFAULT_KPI_LABEL {
        let etag = render_etag(snapshot.seq);
        if if_none_match_matches(&headers, &etag) {
            return not_modified_response("no-cache", Some(etag.as_str()));
        }
        return json_bytes_response(
            (*snapshot.snapshot_json).clone(),
            "no-cache",
            Some(etag.as_str()),
        );
    }

    debug!(seq = snapshot.seq, label = %label, "rebuilding render plan for label");
    let plan = build_render_plan(
        &snapshot.binding,
        &state.settings,
        &label,
        &state.catalog,
    );
    match serde_json::to_vec(&RenderEnvelope {
        seq: snapshot.seq,
        timestamp: &snapshot.timestamp,
        fingerprint: snapshot.fingerprint,
        plan: &plan,
    }) {
        Ok(body) => json_bytes_response(Bytes::from(body), "no-store", None),
        Err(e) => {
            error!(error = %e, "failed to serialize render plan");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_overlay(State(state): State<AppState>) -> Response {
    let overlay = state.overlay.read().await;
    match overlay_json(&overlay) {
        Ok(body) => json_bytes_response(body, "no-store", None),
        Err(e) => {
            error!(error = %e, "failed to serialize overlay");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn post_overlay(
    State(state): State<AppState>,
    Json(request): Json<OverlayRequest>,
) -> Response {
    let label = parse_kpi_label(request.kpi_label.as_deref());
    overlay_response(
        state
            .apply_overlay(request.kind, &request.event, &label)
            .await,
    )
}

pub async fn delete_overlay(State(state): State<AppState>) -> Response {
    overlay_response(state.clear_overlay().await)
}

fn overlay_response(result: Result<Arc<Bytes>, serde_json::Error>) -> Response {
    match result {
        Ok(json) => json_bytes_response((*json).clone(), "no-store", None),
        Err(e) => {
            error!(error = %e, "failed to serialize overlay");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn post_export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Response {
    let csv = match request.event {
        Some(event) => {
            let label = parse_kpi_label(request.kpi_label.as_deref());
            export_event_csv(&event, &label)
        }
        None => {
            let overlay = state.overlay.read().await;
            let Some(view) = overlay.current() else {
                return StatusCode::NOT_FOUND.into_response();
            };
            view.to_csv()
        }
    };
    state.observability.record_export();

    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        csv,
    )
        .into_response()
}

fn render_etag(seq: u64) -> String {
    format!("\"render-{seq}\"")
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}
