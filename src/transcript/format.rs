use super::types::TranscriptSegment;

/// Format seconds as `HH:MM:SS`, truncating fractions.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Render one line per segment: `[HH:MM:SS] Speaker: text`, or
/// `[HH:MM:SS] text` for unlabeled segments or when speakers are omitted.
pub fn format_with_timestamps(segments: &[TranscriptSegment], include_speakers: bool) -> String {
    segments
        .iter()
        .map(|segment| {
            let ts = format_timestamp(segment.start_time);
            match (&segment.speaker, include_speakers) {
                (Some(speaker), true) => format!("[{}] {}: {}", ts, speaker, segment.text),
                _ => format!("[{}] {}", ts, segment.text),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start: f64, speaker: Option<&str>) -> TranscriptSegment {
        TranscriptSegment {
            text: text.into(),
            start_time: start,
            end_time: start + 1.0,
            speaker: speaker.map(String::from),
            confidence: 1.0,
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(59.99), "00:00:59");
        assert_eq!(format_timestamp(3725.4), "01:02:05");
        assert_eq!(format_timestamp(-3.0), "00:00:00");
    }

    #[test]
    fn test_format_with_timestamps() {
        let segments = vec![
            seg("Hello there.", 1.2, Some("spk_0")),
            seg("Hi.", 65.0, None),
        ];
        assert_eq!(
            format_with_timestamps(&segments, true),
            "[00:00:01] spk_0: Hello there.\n[00:01:05] Hi."
        );
        assert_eq!(
            format_with_timestamps(&segments, false),
            "[00:00:01] Hello there.\n[00:01:05] Hi."
        );
        assert_eq!(format_with_timestamps(&[], true), "");
    }
}
