use anyhow::{Context, Result};

/// Render remaining milliseconds as `mm:ss`
///
/// Partial seconds round up, so a lock with 1ms left still shows `00:01`.
/// Minutes are not capped at 59; an hour-long lock renders as `60:00`.
pub fn format_time(ms: i64) -> String {
    let total_seconds = ceil_div(ms.max(0), 1000);
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}", minutes, seconds)
}

/// Parse `mm:ss` back into whole seconds
pub fn parse_time(text: &str) -> Result<i64> {
    let (minutes, seconds) = text
        .trim()
        .split_once(':')
        .with_context(|| format!("Expected mm:ss, got '{}'", text))?;

    let minutes: i64 = minutes
        .parse()
        .with_context(|| format!("Invalid minutes in '{}'", text))?;
    let seconds: i64 = seconds
        .parse()
        .with_context(|| format!("Invalid seconds in '{}'", text))?;

    if minutes < 0 || !(0..60).contains(&seconds) {
        anyhow::bail!("Time out of range: '{}'", text);
    }

    Ok(minutes * 60 + seconds)
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    (value + divisor - 1) / divisor
}
