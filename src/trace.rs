//! Diagnostics hooks for the pass loop.
//!
//! Everything is emitted under the `pivcorr` target. Without the `tracing`
//! feature the macros only borrow their field values, so call sites need no
//! `cfg` attributes and no unused-variable allowances.

/// Span around a run, a pass or a backend batch.
#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::span!(target: "pivcorr", tracing::Level::INFO, $name $(, $($field)*)?)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        $crate::trace::Disabled
    };
}

/// Event at `$level` tagged with the stage that produced it.
#[cfg(feature = "tracing")]
macro_rules! trace_at {
    ($level:ident, $stage:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::event!(
            target: "pivcorr",
            tracing::Level::$level,
            stage = $stage
            $(, $key = $value)*
        )
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_at {
    ($level:ident, $stage:expr $(, $key:ident = $value:expr)* $(,)?) => {{
        let _ = (&$stage $(, &$value)*);
    }};
}

/// Measurement worth keeping in a run log.
macro_rules! trace_event {
    ($($args:tt)+) => {
        $crate::trace::trace_at!(INFO, $($args)+)
    };
}

/// Condition the caller should look at, such as vectors left unresolved.
macro_rules! trace_warn {
    ($($args:tt)+) => {
        $crate::trace::trace_at!(WARN, $($args)+)
    };
}

pub(crate) use trace_at;
pub(crate) use trace_event;
pub(crate) use trace_span;
pub(crate) use trace_warn;

/// Span guard returned by `trace_span!` when tracing is compiled out.
#[cfg(not(feature = "tracing"))]
pub struct Disabled;

#[cfg(not(feature = "tracing"))]
impl Disabled {
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{trace_event, trace_span, trace_warn};

    #[test]
    fn macros_accept_call_site_shapes() {
        let windows = 12usize;
        let window_size = 32usize;
        let _span = trace_span!("batch", windows = windows, window_size).entered();
        trace_event!("checkpoint");
        trace_event!("pass_residual", pass = 1usize, residual = 0.25f32,);
        trace_warn!("unresolved_vectors", count = windows);
    }
}
