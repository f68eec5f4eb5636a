//! Metrics and observability infrastructure.

pub mod events;
pub mod server;

pub use server::init;

/// Macro for emitting metric events.
///
/// Calls `InternalEvent::emit()` on the given event, recording the
/// corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use floe::metrics::events::RecordsGrouped;
///
/// emit!(RecordsGrouped { count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
