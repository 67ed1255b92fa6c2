//! Bitrate budgeting for size-targeted encodes.

/// Share of the byte budget reserved for container/muxing overhead.
pub const CONTAINER_OVERHEAD: f64 = 0.05;

/// Floor below which a video bitrate is considered unusable.
pub const MIN_VIDEO_BITRATE_KBPS: f64 = 100.0;

/// Audio bitrate used when the caller does not pick one.
pub const DEFAULT_AUDIO_BITRATE_KBPS: f64 = 128.0;

/// Bitrate budget for one encode, derived from a target file size.
///
/// `total_bitrate_kbps` is always exactly `video + audio`. When the target
/// size is too small to reach the minimum video bitrate, a plan is still
/// returned with the video bitrate clamped to the floor, `is_feasible` set
/// to false, and `warning` explaining the shortfall. Callers must check
/// `is_feasible` before starting an encode; the clamped numbers exist so a
/// UI can keep previewing them while the user adjusts settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BitratePlan {
    /// Video bitrate in kbps.
    pub video_bitrate_kbps: f64,
    /// Audio bitrate in kbps (0 when the output carries no audio).
    pub audio_bitrate_kbps: f64,
    /// Combined bitrate in kbps.
    pub total_bitrate_kbps: f64,
    /// Whether the target size is achievable at or above the minimum video bitrate.
    pub is_feasible: bool,
    /// Human-readable explanation when the plan is degenerate or clamped.
    pub warning: Option<String>,
}

/// Compute the bitrate budget for a target file size.
///
/// The target is converted to bits, shrunk by [`CONTAINER_OVERHEAD`] to
/// leave room for container bookkeeping, spread over the duration, and the
/// audio share is subtracted to leave the video bitrate:
///
/// ```text
/// video_kbps = target_mb * 1024 * 1024 * 8 / (1 - overhead) / duration / 1000 - audio_kbps
/// ```
///
/// A non-positive duration yields a zero, infeasible plan rather than an
/// error; the degenerate case is representable in the result. Deterministic
/// and side-effect free.
pub fn solve(
    target_size_mb: f64,
    duration_seconds: f64,
    audio_bitrate_kbps: f64,
    has_audio: bool,
) -> BitratePlan {
    if duration_seconds <= 0.0 {
        return BitratePlan {
            video_bitrate_kbps: 0.0,
            audio_bitrate_kbps: 0.0,
            total_bitrate_kbps: 0.0,
            is_feasible: false,
            warning: Some("source duration is zero".to_string()),
        };
    }

    let target_size_bits = target_size_mb * 1024.0 * 1024.0 * 8.0;
    let effective_bitrate = target_size_bits / (1.0 - CONTAINER_OVERHEAD) / duration_seconds;
    let effective_bitrate_kbps = effective_bitrate / 1000.0;

    let audio_kbps = if has_audio { audio_bitrate_kbps } else { 0.0 };
    let mut video_kbps = effective_bitrate_kbps - audio_kbps;

    let mut warning = None;
    let mut is_feasible = true;

    if video_kbps < MIN_VIDEO_BITRATE_KBPS {
        warning = Some(format!(
            "calculated video bitrate ({:.0} kbps) is below the minimum ({:.0} kbps); \
             increase the target size or lower the audio bitrate",
            video_kbps, MIN_VIDEO_BITRATE_KBPS
        ));
        video_kbps = MIN_VIDEO_BITRATE_KBPS;
        is_feasible = false;
    }

    BitratePlan {
        video_bitrate_kbps: video_kbps,
        audio_bitrate_kbps: audio_kbps,
        total_bitrate_kbps: video_kbps + audio_kbps,
        is_feasible,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_is_infeasible() {
        let plan = solve(10.0, 0.0, 128.0, true);
        assert!(!plan.is_feasible);
        assert_eq!(plan.video_bitrate_kbps, 0.0);
        assert_eq!(plan.audio_bitrate_kbps, 0.0);
        assert_eq!(plan.total_bitrate_kbps, 0.0);
        assert!(plan.warning.is_some());
    }

    #[test]
    fn test_negative_duration_is_infeasible() {
        let plan = solve(10.0, -5.0, 128.0, true);
        assert!(!plan.is_feasible);
        assert_eq!(plan.video_bitrate_kbps, 0.0);
    }

    #[test]
    fn test_ten_megabytes_over_a_minute() {
        let plan = solve(10.0, 60.0, 128.0, true);

        let expected =
            10.0 * 1024.0 * 1024.0 * 8.0 / (1.0 - CONTAINER_OVERHEAD) / 60.0 / 1000.0 - 128.0;
        assert!((plan.video_bitrate_kbps - expected).abs() < 1e-9);
        assert!((plan.video_bitrate_kbps - 1343.7).abs() < 0.1);
        assert_eq!(plan.audio_bitrate_kbps, 128.0);
        assert!(plan.is_feasible);
        assert!(plan.warning.is_none());
    }

    #[test]
    fn test_total_is_video_plus_audio() {
        let plan = solve(25.0, 90.0, 96.0, true);
        assert!(plan.is_feasible);
        assert_eq!(
            plan.total_bitrate_kbps,
            plan.video_bitrate_kbps + plan.audio_bitrate_kbps
        );
    }

    #[test]
    fn test_no_audio_gets_full_budget() {
        let with_audio = solve(10.0, 60.0, 128.0, true);
        let without = solve(10.0, 60.0, 128.0, false);

        assert_eq!(without.audio_bitrate_kbps, 0.0);
        assert!(
            (without.video_bitrate_kbps - (with_audio.video_bitrate_kbps + 128.0)).abs() < 1e-9
        );
    }

    #[test]
    fn test_tiny_target_clamps_to_floor() {
        let plan = solve(0.5, 600.0, 128.0, true);

        assert_eq!(plan.video_bitrate_kbps, MIN_VIDEO_BITRATE_KBPS);
        assert!(!plan.is_feasible);
        assert_eq!(plan.total_bitrate_kbps, MIN_VIDEO_BITRATE_KBPS + 128.0);

        let warning = plan.warning.unwrap();
        assert!(warning.contains("below the minimum"));
    }

    #[test]
    fn test_larger_target_never_lowers_video_bitrate() {
        let mut last = 0.0;
        for mb in [1.0, 2.0, 5.0, 10.0, 50.0, 100.0] {
            let plan = solve(mb, 120.0, 128.0, true);
            assert!(plan.video_bitrate_kbps >= last);
            last = plan.video_bitrate_kbps;
        }
    }
}
