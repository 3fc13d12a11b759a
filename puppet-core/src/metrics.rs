// ABOUTME: Counter helpers for cache lookups, bridged messages, and errors.
// ABOUTME: Records through the `metrics` facade; installing an exporter is up to the binary.

/// Record a raw cache lookup for `store` ("contact", "room", "message")
pub fn record_cache_lookup(store: &'static str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    ::metrics::counter!("puppet_cache_lookups_total", "store" => store, "outcome" => outcome)
        .increment(1);
}

/// Record the outcome of one real-time message event ("bridged", "ignored", "failed")
pub fn record_bridge_message(outcome: &'static str) {
    ::metrics::counter!("puppet_bridge_messages_total", "outcome" => outcome).increment(1);
}

/// Record an error by kind label
pub fn record_error(kind: &'static str) {
    ::metrics::counter!("puppet_errors_total", "kind" => kind).increment(1);
}
