use serde::Serialize;

use crate::overlay::OverlayView;
use crate::render::RenderPlan;

/// Payload of `snapshot` stream events and of the render endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RenderEnvelope<'a> {
    pub seq: u64,
    pub timestamp: &'a str,
    pub fingerprint: u32,
    pub plan: &'a RenderPlan,
}

/// Payload of `overlay` stream events. `overlay` is null once cleared.
#[derive(Debug, Clone, Serialize)]
pub struct OverlayEnvelope<'a> {
    pub revision: u64,
    pub overlay: Option<&'a OverlayView>,
}
