/// Format a millisecond latency as seconds with three decimals, e.g. "0.180s".
pub fn format_seconds(ms: u64) -> String {
    format!("{:.3}s", ms as f64 / 1000.0)
}

/// Best-time footer text; "Best: --" until a round has been recorded.
pub fn format_best(best: Option<u64>) -> String {
    match best {
        Some(ms) => format!("Best: {}", format_seconds(ms)),
        None => "Best: --".to_string(),
    }
}
