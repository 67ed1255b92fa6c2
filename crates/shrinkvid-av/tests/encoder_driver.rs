#![cfg(unix)]

//! Drives the encoder against a fake ffmpeg to exercise the two-pass
//! loop, retry behavior, and argument construction without a real
//! encode.

use shrinkvid_av::{EncodeRequest, Encoder, Error, Resolution};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write a shell script that mimics ffmpeg.
///
/// The capability probe (a `nullsrc` input) succeeds silently. Every
/// encode invocation appends its arguments to `args.log` and emits
/// progress telemetry for five of the ten source seconds. Pass 2 writes
/// an output file whose size is taken from the next line of the `sizes`
/// file, one line per attempt.
fn write_fake_ffmpeg(dir: &Path, sizes: &[u64]) -> PathBuf {
    let sizes_text = sizes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(dir.join("sizes"), sizes_text).unwrap();

    let script = format!(
        r#"#!/bin/sh
case "$*" in
    *nullsrc*) exit 0 ;;
esac
echo "$*" >> "{dir}/args.log"
for last; do :; done
if printf '%s' "$*" | grep -q -- "-pass 1"; then
    echo "frame=1"
    echo "fps=30.0"
    echo "out_time_us=5000000"
    echo "progress=end"
    exit 0
fi
echo "out_time_us=5000000"
echo "progress=end"
n=$(cat "{dir}/attempt" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "{dir}/attempt"
size=$(sed -n "${{n}}p" "{dir}/sizes")
head -c "$size" /dev/zero > "$last"
exit 0
"#,
        dir = dir.display()
    );
    write_script(dir, &script)
}

/// Write a fake ffmpeg whose second pass fails with a diagnostic.
fn write_failing_ffmpeg(dir: &Path) -> PathBuf {
    let script = r#"#!/bin/sh
case "$*" in
    *nullsrc*) exit 0 ;;
esac
if printf '%s' "$*" | grep -q -- "-pass 1"; then
    echo "out_time_us=5000000"
    exit 0
fi
echo "Error: no write access" >&2
exit 1
"#;
    write_script(dir, script)
}

fn write_script(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("ffmpeg");
    fs::write(&path, script).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn request(dir: &Path, video_kbps: f64, has_audio: bool, resolution: Resolution) -> EncodeRequest {
    fs::write(dir.join("input.mp4"), b"fake video").unwrap();
    EncodeRequest {
        input: dir.join("input.mp4"),
        output: dir.join("output.mp4"),
        video_bitrate_kbps: video_kbps,
        audio_bitrate_kbps: 128.0,
        has_audio,
        duration_seconds: 10.0,
        resolution,
    }
}

fn logged_args(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("args.log"))
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

#[test]
fn test_single_attempt_when_output_fits() {
    let dir = tempfile::tempdir().unwrap();
    // 100 kbps over 10 s predicts 125_000 bytes; 120_000 is within the
    // 5% tolerance.
    let program = write_fake_ffmpeg(dir.path(), &[120_000]);
    let encoder = Encoder::with_program(program);
    assert!(encoder.supports_stats_period());

    let request = request(dir.path(), 100.0, false, Resolution::Original);
    let mut fractions = Vec::new();
    let output = encoder
        .run(&request, |fraction| fractions.push(fraction))
        .unwrap();

    assert_eq!(output, request.output);
    assert_eq!(fs::metadata(&output).unwrap().len(), 120_000);
    assert_eq!(fractions, vec![0.25, 0.75]);

    let lines = logged_args(dir.path());
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("-b:v 100k") && lines[0].contains("-pass 1"));
    assert!(lines[0].contains("-an") && lines[0].contains("-f null"));
    assert!(lines[1].contains("-b:v 100k") && lines[1].contains("-pass 2"));
    assert!(lines.iter().all(|l| l.contains("-stats_period 0.5")));
}

#[test]
fn test_overshoot_retries_at_reduced_bitrate() {
    let dir = tempfile::tempdir().unwrap();
    // First attempt lands at 200_000 bytes, well over the 131_250 byte
    // limit; the retry at 95 kbps fits.
    let program = write_fake_ffmpeg(dir.path(), &[200_000, 100_000]);
    let encoder = Encoder::with_program(program);

    let request = request(dir.path(), 100.0, false, Resolution::Original);
    let mut fractions = Vec::new();
    let output = encoder
        .run(&request, |fraction| fractions.push(fraction))
        .unwrap();

    assert_eq!(fs::metadata(&output).unwrap().len(), 100_000);
    assert_eq!(fractions, vec![0.25, 0.75, 0.0, 0.25, 0.75]);

    let lines = logged_args(dir.path());
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("-b:v 100k") && lines[0].contains("-pass 1"));
    assert!(lines[1].contains("-b:v 100k") && lines[1].contains("-pass 2"));
    assert!(lines[2].contains("-b:v 95k") && lines[2].contains("-pass 1"));
    assert!(lines[3].contains("-b:v 95k") && lines[3].contains("-pass 2"));
}

#[test]
fn test_gives_up_after_max_retries() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_fake_ffmpeg(dir.path(), &[200_000, 200_000, 200_000]);
    let encoder = Encoder::with_program(program);

    let request = request(dir.path(), 100.0, false, Resolution::Original);
    let mut fractions = Vec::new();
    let output = encoder
        .run(&request, |fraction| fractions.push(fraction))
        .unwrap();

    // The oversized file is still handed back after the retries are
    // spent.
    assert_eq!(fs::metadata(&output).unwrap().len(), 200_000);
    assert_eq!(
        fractions,
        vec![0.25, 0.75, 0.0, 0.25, 0.75, 0.0, 0.25, 0.75]
    );

    let lines = logged_args(dir.path());
    assert_eq!(lines.len(), 6);
    assert!(lines[0].contains("-b:v 100k"));
    assert!(lines[2].contains("-b:v 95k"));
    assert!(lines[4].contains("-b:v 90k") && lines[5].contains("-b:v 90k"));
}

#[test]
fn test_pass_failure_reports_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_failing_ffmpeg(dir.path());
    let encoder = Encoder::with_program(program);

    let request = request(dir.path(), 100.0, false, Resolution::Original);
    let err = encoder.run(&request, |_| {}).unwrap_err();

    match err {
        Error::EncoderFailed { pass, diagnostics } => {
            assert_eq!(pass, 2);
            assert!(diagnostics.contains("no write access"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_audio_and_scale_args_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    // 500 + 128 kbps over 10 s predicts 785_000 bytes; 700_000 fits.
    let program = write_fake_ffmpeg(dir.path(), &[700_000]);
    let encoder = Encoder::with_program(program);

    let request = request(dir.path(), 500.0, true, Resolution::P720);
    encoder.run(&request, |_| {}).unwrap();

    let lines = logged_args(dir.path());
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.contains("-vf scale=1280:-2")));
    assert!(lines[0].contains("-an"));
    assert!(lines[1].contains("-c:a aac") && lines[1].contains("-b:a 128k"));
    assert!(lines[1].ends_with("output.mp4"));
}
