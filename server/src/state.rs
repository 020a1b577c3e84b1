use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use dma_heatmap_shared::{
    DEFAULT_KPI_LABEL, HostBinding, OverlayEnvelope, OverlayKind, OverlayState, RegionCatalog,
    RenderEnvelope, RenderPlan, RenderSettings, RenderStatus, SelectionEvent, build_render_plan,
};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::config::sse_broadcast_buffer;

/// Pre-serialized SSE event, serialized once and shared by all clients via Arc.
#[derive(Debug, Clone)]
pub enum PreSerializedEvent {
    Snapshot { seq: u64, json: Arc<Bytes> },
    Overlay { revision: u64, json: Arc<Bytes> },
}

/// Latest host binding and the plan derived from it.
#[derive(Debug, Clone)]
pub struct RenderSnapshot {
    pub seq: u64,
    pub timestamp: String,
    pub fingerprint: u32,
    pub binding: Arc<HostBinding>,
    pub plan: Arc<RenderPlan>,
    pub snapshot_json: Arc<Bytes>,
}

impl RenderSnapshot {
    fn build(
        seq: u64,
        binding: HostBinding,
        settings: &RenderSettings,
        catalog: &RegionCatalog,
    ) -> Result<Self, serde_json::Error> {
        let plan = build_render_plan(&binding, settings, DEFAULT_KPI_LABEL, catalog);
        let mut snapshot = Self::unencoded(seq, binding, plan);
        snapshot.snapshot_json = Arc::new(snapshot.encode()?);
        Ok(snapshot)
    }

    /// Snapshot served before the host delivers its first binding.
    fn initial(settings: &RenderSettings, catalog: &RegionCatalog) -> Self {
        let binding = HostBinding::default();
        let plan = build_render_plan(&binding, settings, DEFAULT_KPI_LABEL, catalog);
        let mut snapshot = Self::unencoded(0, binding, plan);
        match snapshot.encode() {
            Ok(json) => snapshot.snapshot_json = Arc::new(json),
            Err(e) => warn!(error = %e, "failed to serialize initial render snapshot"),
        }
        snapshot
    }

    fn unencoded(seq: u64, binding: HostBinding, plan: RenderPlan) -> Self {
        Self {
            seq,
            timestamp: Utc::now().to_rfc3339(),
            fingerprint: binding.fingerprint(),
            binding: Arc::new(binding),
            plan: Arc::new(plan),
            snapshot_json: Arc::new(Bytes::new()),
        }
    }

    fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(&RenderEnvelope {
            seq: self.seq,
            timestamp: &self.timestamp,
            fingerprint: self.fingerprint,
            plan: &self.plan,
        })
        .map(Bytes::from)
    }
}

/// Result of handing a binding to [`AppState::apply_binding`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BindingOutcome {
    pub seq: u64,
    pub fingerprint: u32,
    pub changed: bool,
    pub status: RenderStatus,
}

#[derive(Clone)]
pub struct AppState {
    pub render_snapshot: Arc<RwLock<RenderSnapshot>>,
    pub next_seq: Arc<AtomicU64>,
    pub event_tx: broadcast::Sender<PreSerializedEvent>,
    pub overlay: Arc<RwLock<OverlayState>>,
    /// DMA number <-> name lookup. Empty when no catalog file is configured.
    pub catalog: Arc<RegionCatalog>,
    pub settings: RenderSettings,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    bindings_received_total: AtomicU64,
    bindings_unchanged_total: AtomicU64,
    degraded_renders_total: AtomicU64,
    render_requests_total: AtomicU64,
    overlay_updates_total: AtomicU64,
    exports_total: AtomicU64,
    sse_lagged_events_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ObservabilitySnapshot {
    pub bindings_received_total: u64,
    pub bindings_unchanged_total: u64,
    pub degraded_renders_total: u64,
    pub render_requests_total: u64,
    pub overlay_updates_total: u64,
    pub exports_total: u64,
    pub sse_lagged_events_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            bindings_received_total: self.bindings_received_total.load(Ordering::Relaxed),
            bindings_unchanged_total: self.bindings_unchanged_total.load(Ordering::Relaxed),
            degraded_renders_total: self.degraded_renders_total.load(Ordering::Relaxed),
            render_requests_total: self.render_requests_total.load(Ordering::Relaxed),
            overlay_updates_total: self.overlay_updates_total.load(Ordering::Relaxed),
            exports_total: self.exports_total.load(Ordering::Relaxed),
            sse_lagged_events_total: self.sse_lagged_events_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_binding_received(&self) {
        self.bindings_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_binding_unchanged(&self) {
        self.bindings_unchanged_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded_render(&self) {
        self.degraded_renders_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render_request(&self) {
        self.render_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overlay_update(&self) {
        self.overlay_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.exports_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sse_lagged_events(&self, count: u64) {
        self.sse_lagged_events_total
            .fetch_add(count, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(settings: RenderSettings, catalog: RegionCatalog) -> Self {
        let (event_tx, _) = broadcast::channel(sse_broadcast_buffer());
        let initial = RenderSnapshot::initial(&settings, &catalog);

        Self {
            render_snapshot: Arc::new(RwLock::new(initial)),
            next_seq: Arc::new(AtomicU64::new(0)),
            event_tx,
            overlay: Arc::new(RwLock::new(OverlayState::default())),
            catalog: Arc::new(catalog),
            settings,
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }

    /// Recomputes the render plan for a freshly delivered binding and
    /// broadcasts it. A binding equal to the current one is a no-op.
    pub async fn apply_binding(
        &self,
        binding: HostBinding,
    ) -> Result<BindingOutcome, serde_json::Error> {
        self.observability.record_binding_received();
        let fingerprint = binding.fingerprint();

        let mut snapshot = self.render_snapshot.write().await;
        // Equal fingerprints alone are not enough: CRC32 collides.
        if snapshot.seq > 0 && *snapshot.binding == binding {
            self.observability.record_binding_unchanged();
            debug!(seq = snapshot.seq, fingerprint, "binding unchanged");
            return Ok(BindingOutcome {
                seq: snapshot.seq,
                fingerprint,
                changed: false,
                status: snapshot.plan.status,
            });
        }

        let seq = self.next_seq.load(Ordering::Relaxed) + 1;
        let next = RenderSnapshot::build(seq, binding, &self.settings, &self.catalog)?;
        self.next_seq.store(seq, Ordering::Relaxed);

        let status = next.plan.status;
        match status.error() {
            None => info!(seq, fingerprint, regions = next.plan.region_count(), "render ready"),
            Some(error) => {
                self.observability.record_degraded_render();
                info!(
                    seq,
                    fingerprint,
                    regions = next.plan.region_count(),
                    reason = error.code(),
                    "render degraded"
                );
            }
        }

        // Broadcast under the write lock so subscribers see snapshots in seq order.
        let _ = self.event_tx.send(PreSerializedEvent::Snapshot {
            seq,
            json: Arc::clone(&next.snapshot_json),
        });
        *snapshot = next;

        Ok(BindingOutcome {
            seq,
            fingerprint,
            changed: true,
            status,
        })
    }

    /// Replaces the overlay (last write wins) and broadcasts the new view.
    pub async fn apply_overlay(
        &self,
        kind: OverlayKind,
        event: &SelectionEvent,
        metric_label: &str,
    ) -> Result<Arc<Bytes>, serde_json::Error> {
        let mut overlay = self.overlay.write().await;
        overlay.apply(kind, event, metric_label);
        self.observability.record_overlay_update();
        self.publish_overlay(&overlay)
    }

    pub async fn clear_overlay(&self) -> Result<Arc<Bytes>, serde_json::Error> {
        let mut overlay = self.overlay.write().await;
        overlay.clear();
        self.observability.record_overlay_update();
        self.publish_overlay(&overlay)
    }

    fn publish_overlay(&self, overlay: &OverlayState) -> Result<Arc<Bytes>, serde_json::Error> {
        let json = Arc::new(overlay_json(overlay)?);
        let _ = self.event_tx.send(PreSerializedEvent::Overlay {
            revision: overlay.revision(),
            json: Arc::clone(&json),
        });
        Ok(json)
    }
}

pub fn overlay_json(overlay: &OverlayState) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(&OverlayEnvelope {
        revision: overlay.revision(),
        overlay: overlay.current(),
    })
    .map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use dma_heatmap_shared::{CellValue, Configuration, RawDataset};
    use serde_json::json;

    use super::*;

    fn test_state() -> AppState {
        AppState::new(RenderSettings::default(), RegionCatalog::default())
    }

    fn sample_binding() -> HostBinding {
        HostBinding::new(
            Configuration {
                dma_id: Some("region_id".into()),
                kpi: Some("kpi".into()),
                ..Configuration::default()
            },
            Some(
                RawDataset::new()
                    .with_column("region_id", [Some(CellValue::Integer(501))])
                    .with_column("kpi", [Some(CellValue::Integer(10))]),
            ),
        )
    }

    #[tokio::test]
    async fn initial_snapshot_is_degraded_and_serialized() {
        let state = test_state();
        let snapshot = state.render_snapshot.read().await;
        assert_eq!(snapshot.seq, 0);
        assert!(!snapshot.plan.status.is_ready());
        let parsed: serde_json::Value =
            serde_json::from_slice(&snapshot.snapshot_json).expect("snapshot json");
        assert_eq!(parsed["plan"]["status"]["code"], "no_data");
    }

    #[tokio::test]
    async fn identical_binding_is_not_recomputed() {
        let state = test_state();
        let mut rx = state.event_tx.subscribe();

        let first = state
            .apply_binding(sample_binding())
            .await
            .expect("apply binding");
        assert!(first.changed);
        assert_eq!(first.seq, 1);
        assert!(first.status.is_ready());
        assert!(matches!(
            rx.try_recv(),
            Ok(PreSerializedEvent::Snapshot { seq: 1, .. })
        ));

        let second = state
            .apply_binding(sample_binding())
            .await
            .expect("apply binding");
        assert!(!second.changed);
        assert_eq!(second.seq, 1);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert!(rx.try_recv().is_err());

        let counters = state.observability.snapshot();
        assert_eq!(counters.bindings_received_total, 2);
        assert_eq!(counters.bindings_unchanged_total, 1);
    }

    #[tokio::test]
    async fn colliding_fingerprint_with_new_content_is_recomputed() {
        let state = test_state();
        state
            .apply_binding(sample_binding())
            .await
            .expect("apply binding");

        let mut renamed = sample_binding();
        renamed.config.dma_id = None;
        renamed.config.dma_name = Some("region_name".into());
        if let Some(data) = renamed.data.as_mut() {
            data.insert("region_name", [Some(CellValue::from("Boston"))]);
        }
        // Pretend the current binding hashed to the same CRC32 as the new one.
        state.render_snapshot.write().await.fingerprint = renamed.fingerprint();

        let outcome = state
            .apply_binding(renamed.clone())
            .await
            .expect("apply binding");
        assert!(outcome.changed);
        assert_eq!(outcome.seq, 2);

        let snapshot = state.render_snapshot.read().await;
        assert_eq!(*snapshot.binding, renamed);
        assert_eq!(snapshot.plan.regions[0].dma_name.as_deref(), Some("Boston"));
    }

    #[tokio::test]
    async fn degraded_binding_still_advances_seq() {
        let state = test_state();
        let outcome = state
            .apply_binding(HostBinding::default())
            .await
            .expect("apply binding");
        assert!(outcome.changed);
        assert_eq!(outcome.seq, 1);
        assert!(!outcome.status.is_ready());
        assert_eq!(state.observability.snapshot().degraded_renders_total, 1);
    }

    #[tokio::test]
    async fn overlay_updates_are_broadcast() {
        let state = test_state();
        let mut rx = state.event_tx.subscribe();
        let event: SelectionEvent = serde_json::from_value(json!({
            "x": 1.0,
            "y": 2.0,
            "object": {"dma_name": "Boston", "value": 10}
        }))
        .expect("event");

        let json = state
            .apply_overlay(OverlayKind::Hover, &event, "Sales")
            .await
            .expect("apply overlay");
        let parsed: serde_json::Value = serde_json::from_slice(&json).expect("overlay json");
        assert_eq!(parsed["revision"], 1);
        assert_eq!(parsed["overlay"]["lines"][1], "Sales: 10");
        assert!(matches!(
            rx.try_recv(),
            Ok(PreSerializedEvent::Overlay { revision: 1, .. })
        ));

        let cleared = state.clear_overlay().await.expect("clear overlay");
        let parsed: serde_json::Value = serde_json::from_slice(&cleared).expect("overlay json");
        assert!(parsed["overlay"].is_null());
        assert_eq!(parsed["revision"], 2);
    }
}
