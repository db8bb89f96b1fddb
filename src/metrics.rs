use tracing::trace;

// Lightweight metrics helpers that stay safe without a recorder.
// These intentionally avoid the metrics macros to keep deps stable.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "margem.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "margem.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}
