use std::time::Duration;

/// Formats a wall-clock duration as `HHh:MMm:SSs`.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours:02}h:{minutes:02}m:{seconds:02}s")
}
