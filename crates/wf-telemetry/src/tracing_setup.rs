//! Correlation ids for task views.
//!
//! Every opened task view gets a fresh trace id; background fetches issued
//! for that view run in child spans that repeat it, so one `grep` over the
//! logs recovers everything done for a single view.

use uuid::Uuid;

/// 32 lowercase hex characters.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// 16 lowercase hex characters.
pub fn generate_span_id() -> String {
    let mut id = Uuid::new_v4().as_simple().to_string();
    id.truncate(16);
    id
}

/// Root span for one task view. Returns the span and its trace id.
pub fn task_view_span(task_id: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span = tracing::info_span!("task_view", trace_id = %trace_id, task_id = %task_id);
    (span, trace_id)
}

/// Span for background work (a fetch, a refresh) belonging to a view.
pub fn create_child_span(trace_id: &str, operation: &str) -> tracing::Span {
    tracing::info_span!(
        "view_op",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        operation = %operation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_hexdigit())
    }

    #[test]
    fn id_lengths() {
        let trace = generate_trace_id();
        let span = generate_span_id();
        assert_eq!((trace.len(), span.len()), (32, 16));
        assert!(is_hex(&trace) && is_hex(&span));
    }

    #[test]
    fn each_view_gets_its_own_trace() {
        let (_, a) = task_view_span("t-1");
        let (_, b) = task_view_span("t-1");
        assert_ne!(a, b);
        let child = create_child_span(&a, "final_refresh");
        let _guard = child.enter();
    }
}
