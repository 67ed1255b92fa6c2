//! Parsing of the encoder's `-progress` telemetry.

/// Parse one line of ffmpeg `-progress pipe:1` output into a unified
/// progress fraction.
///
/// Only `out_time_us=<integer>` lines carry a signal; every other key, and
/// any malformed value, yields `None` so one odd line never aborts an
/// encode. The elapsed fraction is clamped to [0, 1] within the pass, then
/// mapped into the unified range: pass 1 covers [0.0, 0.5), pass 2 covers
/// [0.5, 1.0]. The even split is a convention, not a measurement; pass 2
/// usually takes longer in wall-clock terms.
pub fn parse_progress_line(line: &str, total_duration_us: f64, pass: u32) -> Option<f64> {
    let value = line.strip_prefix("out_time_us=")?;
    let out_time_us: i64 = value.trim().parse().ok()?;

    if total_duration_us <= 0.0 {
        return None;
    }

    let pass_progress = (out_time_us as f64 / total_duration_us).clamp(0.0, 1.0);

    if pass == 1 {
        Some(pass_progress * 0.5)
    } else {
        Some(0.5 + pass_progress * 0.5)
    }
}
