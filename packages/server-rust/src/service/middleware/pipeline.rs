//! Assembles the forwarder's call pipeline around the bus dispatcher.

use edgeway_core::BusReply;
use tower::util::BoxCloneSyncService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::ForwarderConfig;
use crate::service::dispatch::BusDispatcher;
use crate::service::operation::{CallError, RemoteCall};

/// Type-erased forwarder pipeline. Cheap to clone, shareable across tasks.
pub type CallPipeline = BoxCloneSyncService<RemoteCall, BusReply, CallError>;

/// Wraps `dispatcher` as metrics, then load shed, then timeout.
///
/// Metrics sit outermost so shed and timed-out calls are counted with their
/// own outcome. Shedding precedes the timeout so a rejected call never starts
/// its clock.
#[must_use]
pub fn build_call_pipeline(dispatcher: BusDispatcher, config: &ForwarderConfig) -> CallPipeline {
    let svc = ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(LoadShedLayer::new(config.max_concurrent_calls))
        .layer(TimeoutLayer)
        .service(dispatcher);
    BoxCloneSyncService::new(svc)
}
