const MS_PER_SECOND: u64 = 1_000;
const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns milliseconds elapsed since `start_unix_ms`, clamped at zero when the
/// start lies in the future (clock skew).
pub fn span_since_unix_ms(start_unix_ms: u64) -> u64 {
    current_unix_timestamp_ms().saturating_sub(start_unix_ms)
}

/// Renders an elapsed span with the coarsest unit that is non-zero.
///
/// | span              | rendering          |
/// |-------------------|--------------------|
/// | under a minute    | `S.mmms`           |
/// | under an hour     | `MM:SS.mmm`        |
/// | under a day       | `HH:MM:SS.mmm`     |
/// | a day or more     | `Nd HH:MM:SS.mmm`  |
///
/// ```
/// use loom_core::format_elapsed_ms;
///
/// assert_eq!(format_elapsed_ms(1_234), "1.234s");
/// assert_eq!(format_elapsed_ms(61_005), "01:01.005");
/// ```
pub fn format_elapsed_ms(elapsed_ms: u64) -> String {
    let millis = elapsed_ms % MS_PER_SECOND;
    let total_seconds = elapsed_ms / MS_PER_SECOND;
    let days = total_seconds / SECONDS_PER_DAY;
    let remaining = total_seconds % SECONDS_PER_DAY;
    let hours = remaining / SECONDS_PER_HOUR;
    let minutes = (remaining % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = remaining % SECONDS_PER_MINUTE;

    if days > 0 {
        return format!("{days}d {hours:02}:{minutes:02}:{seconds:02}.{millis:03}");
    }
    if hours > 0 {
        return format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}");
    }
    if minutes > 0 {
        return format!("{minutes:02}:{seconds:02}.{millis:03}");
    }
    format!("{seconds}.{millis:03}s")
}
