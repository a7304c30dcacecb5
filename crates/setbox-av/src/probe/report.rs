//! Parser for the prober's textual stream report (`ffmpeg -i <file>` on
//! stderr).
//!
//! The report is free text, so every field is matched independently and a
//! missing match only leaves that field unset. A report without a container,
//! video codec, resolution or frame rate describes a file we cannot make any
//! decision about, and the descriptor is marked unsupported.

use std::collections::BTreeMap;

use setbox_core::{AudioStream, PixelAspectRatio, SourceDescriptor};

// helper.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

/// Frame rate that doubled-rate mpeg2 film sources are normalised to.
const FILM_RATE: &str = "29.97";

/// Parse a full report into a descriptor.
pub fn parse_report(report: &str) -> SourceDescriptor {
    let mut desc = SourceDescriptor {
        supported: true,
        ..SourceDescriptor::default()
    };

    match capture(regex!(r"Input #0, ([^,]+),"), report) {
        Some(container) => desc.container = container.to_string(),
        None => missing(&mut desc, "container"),
    }
    match capture(regex!(r"Video: ([^, ]+)"), report) {
        Some(codec) => desc.video_codec = codec.to_string(),
        None => missing(&mut desc, "video codec"),
    }

    desc.audio_codec = capture(regex!(r"Audio: ([^, ]+)"), report)
        .unwrap_or_default()
        .to_string();
    desc.audio_kbps = capture(regex!(r"Audio: .+, (.+) kb/s"), report).and_then(parse_number);
    desc.audio_sample_rate = capture(regex!(r"Audio: .+, (.+) Hz"), report)
        .unwrap_or_default()
        .to_string();
    desc.audio_channels = parse_channels(report);
    desc.video_stream =
        capture(regex!(r"([0-9]+[.:]+[0-9]+).*: Video:"), report).map(str::to_string);

    match regex!(r"Video: .+, (\d+)x(\d+)[, ]").captures(report) {
        Some(caps) => {
            desc.video_width = caps[1].parse().unwrap_or(0);
            desc.video_height = caps[2].parse().unwrap_or(0);
        }
        None => missing(&mut desc, "resolution"),
    }

    match parse_frame_rate(report, &desc.video_codec) {
        Some(rate) => desc.frame_rate = rate,
        None => missing(&mut desc, "frame rate"),
    }

    desc.duration_millis = parse_duration(report);
    desc.video_kbps = capture(regex!(r"bitrate: (.+) kb/s"), report)
        .or_else(|| {
            capture(
                regex!(r"Stream #0\.0\[.*\]: Video: mpeg2video, \S+, \S+ \[.*\], (\d+) kb/s"),
                report,
            )
        })
        .and_then(parse_number);

    desc.pixel_aspect_ratio = regex!(r"Video: .+[PS]AR ([0-9]+):([0-9]+) DAR [0-9:]+")
        .captures(report)
        .and_then(|caps| PixelAspectRatio::new(caps[1].parse().ok()?, caps[2].parse().ok()?));
    desc.display_aspect_ratio = regex!(r"Video: .+DAR ([0-9]+):([0-9]+)")
        .captures(report)
        .filter(|caps| &caps[1] != "0" && &caps[2] != "0")
        .map(|caps| format!("{}:{}", &caps[1], &caps[2]));

    desc.audio_streams = regex!(r"([0-9]+[.:]+[0-9]+)(.*): Audio:(.*)")
        .captures_iter(report)
        .map(|caps| AudioStream::new(&caps[1], format!("{}{}", &caps[2], &caps[3])))
        .collect();

    desc.raw_metadata = parse_metadata(report);
    desc
}

fn capture<'a>(re: &regex::Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn missing(desc: &mut SourceDescriptor, field: &str) {
    tracing::debug!(field, "prober report is missing a required field");
    desc.supported = false;
}

fn parse_number(s: &str) -> Option<u32> {
    s.trim().parse().ok()
}

/// `mono`, `stereo`, `5.1` / `5.1 channels` (summed) or `<n> channels`.
fn parse_channels(report: &str) -> Option<u32> {
    let caps = regex!(
        r"Audio: .+, (?:(\d+)(?:(?:\.(\d).*)?(?: channels.*)?)|(stereo|mono)),"
    )
    .captures(report)?;

    if let Some(layout) = caps.get(3) {
        return Some(if layout.as_str() == "stereo" { 2 } else { 1 });
    }
    let main: u32 = caps.get(1)?.as_str().parse().ok()?;
    let extra: u32 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some(main + extra)
}

fn parse_frame_rate(report: &str, video_codec: &str) -> Option<String> {
    let mut rate = capture(regex!(r"Video: .+, (.+) (?:fps|tb\(r\)|tbr)"), report)?.to_string();
    if !rate.contains('.') {
        rate.push_str(".00");
    }

    // Some mpeg2 muxers report the field rate of film material.
    if video_codec == "mpeg2video" && rate != FILM_RATE {
        let lower = report.to_lowercase();
        if lower.contains("film source: 29.97")
            || lower.contains("frame rate differs from container frame rate: 29.97")
        {
            tracing::debug!(reported = %rate, "normalising film source frame rate");
            rate = FILM_RATE.to_string();
        }
    }
    Some(rate)
}

/// `Duration: HH:MM:SS.frac,` in milliseconds; 0 when absent.
fn parse_duration(report: &str) -> u64 {
    let Some(caps) = regex!(r"Duration: ([0-9]+):([0-9]+):([0-9]+)\.([0-9]+),").captures(report)
    else {
        return 0;
    };
    let field = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
    let seconds = field(1) * 3600 + field(2) * 60 + field(3);

    // Fraction scaled to milliseconds: `.5` is 500, `.05` is 50, `.1234` is 123.
    let frac = &caps[4];
    let mut millis: String = frac.chars().take(3).collect();
    while millis.len() < 3 {
        millis.push('0');
    }
    seconds * 1000 + millis.parse::<u64>().unwrap_or(0)
}

/// Container metadata: the lines between `  Metadata:` and `  Duration:`.
fn parse_metadata(report: &str) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    let mut in_block = false;

    for line in report.lines() {
        if line.starts_with("  Metadata:") {
            in_block = true;
        } else if in_block {
            if line.starts_with("  Duration:") {
                in_block = false;
            } else if let Some((key, value)) = line.split_once(':') {
                meta.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    meta
}
