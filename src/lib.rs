//! flowsentry -- flow-based network intrusion detection core.
//!
//! This crate turns an unbounded stream of parsed packet events into
//! discrete flow records with deterministic expiry, and runs each expired
//! flow through a two-stage classification cascade (normal filter, then
//! attack-family discrimination) to produce labeled detection records.
//!
//! Packet capture, model training, and the reporting dashboard are external
//! collaborators reached through the [`event`], [`cascade::model`], and
//! [`sink`] boundaries respectively.

pub mod advisor;
pub mod cascade;
pub mod config;
pub mod event;
pub mod features;
pub mod flow;
pub mod pipeline;
pub mod sink;

use std::sync::Arc;

use crate::cascade::overrides::SignatureOverride;
use crate::cascade::{CascadeEngine, ModelSet};
use crate::config::SentryConfig;
use crate::pipeline::PipelineHandle;
use crate::sink::DetectionSink;

/// Build the cascade from configuration and a model set, and start the
/// pipeline. The demo signature override is wired in only when the config
/// explicitly enables it.
pub fn start_pipeline(
    config: &SentryConfig,
    models: ModelSet,
    sink: Arc<dyn DetectionSink>,
) -> PipelineHandle {
    let mut engine = CascadeEngine::new(models, config.cascade_thresholds())
        .with_priority(config.family_priority.clone());
    if config.demo_override_enabled {
        tracing::warn!("demo signature override enabled; do not use in production");
        engine = engine.with_overrides(Box::new(SignatureOverride::default()));
    }
    pipeline::start(config, engine, sink)
}
