//! Runtime-injectable diagnostic instrumentation.
//!
//! The engine never treats a numeric anomaly as a control-flow signal: a NaN,
//! a negative stock or a degenerate table lookup is reported through the
//! attached [`DiagnosticSink`] and the simulation carries on, so that a long
//! run can be inspected afterwards instead of aborted. Sinks observe only;
//! they must not feed anything back into the computation.

use std::cell::RefCell;
use std::rc::Rc;

use is_close::is_close;

use crate::state::FloatValue;

/// Values closer to zero than this are treated as zero by the
/// `cannot_be_zero` check.
pub const NEAR_ZERO_EPSILON: f64 = 1e-10;

/// True if `value` is indistinguishable from zero for diagnostic purposes.
pub fn is_almost_zero(value: FloatValue) -> bool {
    is_close!(value, 0.0, abs_tol = NEAR_ZERO_EPSILON)
}

/// A single anomaly observed while the simulation was running.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// An equation produced NaN or an infinity.
    NonFinite { equation: String, value: FloatValue },
    /// An equation marked `cannot_be_negative` went negative after the first
    /// tick.
    NegativeValue { equation: String, value: FloatValue },
    /// An equation marked `cannot_be_zero` reached (almost) zero after the
    /// first tick.
    NearZeroValue { equation: String, value: FloatValue },
    /// A table interpolation fraction fell outside `[0, 1]`.
    InterpolationOutOfRange {
        table: String,
        source: FloatValue,
        fraction: FloatValue,
    },
    /// A table lookup produced a value outside the envelope of the first and
    /// last samples.
    LookupOutsideEnvelope { table: String, value: FloatValue },
    /// An equation was asked to log a sample but no buffer was armed.
    MissingLogBuffer { equation: String },
    /// `get_logs` was asked for an equation that never collected data.
    NoDataCollected { equation: String },
    /// An auxiliary was registered but never named in the declared evaluation
    /// order, so it runs at the default position.
    UnorderedAuxiliary { equation: String },
}

/// Receiver for [`DiagnosticEvent`]s.
///
/// Implementations take `&self` so a sink can be shared; stateful sinks use
/// interior mutability.
pub trait DiagnosticSink {
    fn record(&self, event: DiagnosticEvent);
}

/// Default sink: routes every event through the `log` crate.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, event: DiagnosticEvent) {
        match &event {
            DiagnosticEvent::NonFinite { equation, value } => {
                log::warn!("{} is NaN or infinite: {}", equation, value)
            }
            DiagnosticEvent::NegativeValue { equation, value } => {
                log::warn!("{} is negative: {}", equation, value)
            }
            DiagnosticEvent::NearZeroValue { equation, value } => {
                log::warn!("{} is zero: {}", equation, value)
            }
            DiagnosticEvent::InterpolationOutOfRange {
                table,
                source,
                fraction,
            } => log::warn!(
                "table '{}' failed to interpolate: source {} gave fraction {}",
                table,
                source,
                fraction
            ),
            DiagnosticEvent::LookupOutsideEnvelope { table, value } => {
                log::warn!("table '{}' lookup out of range: {}", table, value)
            }
            DiagnosticEvent::MissingLogBuffer { equation } => {
                log::warn!("{} has no logging buffer", equation)
            }
            DiagnosticEvent::NoDataCollected { equation } => {
                log::debug!("no data collected for: {}", equation)
            }
            DiagnosticEvent::UnorderedAuxiliary { equation } => {
                log::warn!("{} does not appear in the declared evaluation order", equation)
            }
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _event: DiagnosticEvent) {}
}

/// Sink that buffers events behind a shared handle.
///
/// Clone the sink before handing it to the simulator and keep the clone to
/// inspect what was recorded.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Rc<RefCell<Vec<DiagnosticEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&self, event: DiagnosticEvent) {
        self.events.borrow_mut().push(event);
    }
}
