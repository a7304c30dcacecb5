use std::path::Path;

use setbox_core::bitrate::kbps_arg;
use setbox_core::{DeviceProfile, OutputFormat, SourceDescriptor};

use super::aspect::aspect_args;
use crate::decision::{decide, select_audio_track, StreamAction};

/// Frame rates HD devices accept without conversion.
const GOOD_MPEG_FPS: &[&str] = &[
    "23.98", "24.00", "25.00", "29.97", "30.00", "50.00", "59.94", "60.00",
];
/// Audio codecs that may be copied into the output.
const COPYABLE_AUDIO: &[&str] = &["ac3", "liba52", "mp2", "aac_latm"];

/// What happens to the audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Copy,
    Ac3,
}

/// Encoder arguments (everything after the input) for serving `desc` to the
/// device in `format`. Deterministic for equal inputs.
pub fn build(desc: &SourceDescriptor, profile: &DeviceProfile, format: OutputFormat) -> Vec<String> {
    let decision = decide(desc, profile, format);
    let copy_video = decision.video == StreamAction::PassThrough;

    let mut args: Vec<String> = vec!["-bufsize".into(), kbps_arg(profile.buffer_size)];

    if copy_video {
        args.extend(["-c:v".into(), "copy".into()]);
        if format == OutputFormat::TransportStream {
            match desc.video_codec.as_str() {
                "h264" => args.extend(
                    ["-bsf:v", "h264_mp4toannexb", "-muxdelay", "0"].map(String::from),
                ),
                "hevc" => args.extend(["-bsf:v", "hevc_mp4toannexb"].map(String::from)),
                _ => {}
            }
        }
    } else {
        args.extend(["-c:v", "mpeg2video", "-pix_fmt", "yuv420p"].map(String::from));
        args.extend([
            "-b:v".into(),
            kbps_arg(video_bitrate(desc, profile)),
            "-maxrate".into(),
            kbps_arg(profile.max_video_bitrate),
        ]);
        let keeps_rate = profile.class.is_high_definition()
            && GOOD_MPEG_FPS.contains(&desc.frame_rate.as_str());
        if !keeps_rate {
            args.extend(["-r".into(), "29.97".into()]);
        }
        args.extend(aspect_args(desc, profile));
    }

    let audio = select_audio_codec(desc, decision.audio);
    args.extend([
        "-c:a".into(),
        match audio {
            AudioCodec::Copy => "copy".into(),
            AudioCodec::Ac3 => "ac3".into(),
        },
    ]);
    if !(audio == AudioCodec::Copy && desc.video_codec == "mpeg2video") {
        args.push("-copyts".into());
    }
    if audio == AudioCodec::Ac3 {
        args.extend(["-b:a".into(), format!("{}k", profile.audio_bitrate_kbps)]);
        let rate = if desc.audio_sample_rate == "44100" {
            "44100"
        } else {
            "48000"
        };
        args.extend(["-ar".into(), rate.into()]);
        // AC-3 carries at most 5.1.
        if desc.audio_channels.is_some_and(|ch| ch > 6) {
            args.extend(["-ac".into(), "6".into()]);
        }
    }

    args.extend(map_args(desc, profile));

    if let Some(params) = &profile.encoder_params {
        args.extend(params.split_whitespace().map(String::from));
    }

    args.extend(["-f".into(), format.muxer().into(), "-".into()]);
    args
}

/// Prefix `settings` with the input file.
pub fn encoder_args(source: &Path, settings: Vec<String>) -> Vec<String> {
    let mut args = vec!["-i".to_string(), source.to_string_lossy().into_owned()];
    args.extend(settings);
    args
}

/// Audio is copied only when it already passes and is either AC-3 or at most
/// stereo; multichannel audio in other codecs is always re-encoded.
pub fn select_audio_codec(desc: &SourceDescriptor, verdict: StreamAction) -> AudioCodec {
    let copyable = verdict == StreamAction::PassThrough
        && COPYABLE_AUDIO.contains(&desc.audio_codec.as_str());
    let multichannel = desc.audio_channels.map_or(true, |ch| ch > 2);
    if !copyable || (desc.audio_codec != "ac3" && multichannel) {
        AudioCodec::Ac3
    } else {
        AudioCodec::Copy
    }
}

/// Video bitrate (bits/s) when re-encoding: the profile target, raised to the
/// source bitrate on HD devices, capped at 95% of the device maximum.
pub fn video_bitrate(desc: &SourceDescriptor, profile: &DeviceProfile) -> u64 {
    let mut bitrate = profile.video_bitrate;
    if profile.class.is_high_definition() {
        if let Some(kbps) = desc.video_kbps {
            bitrate = bitrate.max(u64::from(kbps) * 1000);
        }
    }
    bitrate.min(profile.max_video_bitrate * 95 / 100)
}

/// `-map` arguments pinning the video stream and the preferred audio track.
pub fn map_args(desc: &SourceDescriptor, profile: &DeviceProfile) -> Vec<String> {
    let video = desc.video_stream.as_deref();
    let audio = select_audio_track(&desc.audio_streams, &profile.audio_languages);
    match (video, audio) {
        (Some(video), Some(audio)) => vec![
            "-map".into(),
            video.to_string(),
            "-map".into(),
            audio.id.clone(),
        ],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setbox_core::AudioStream;

    fn sd() -> DeviceProfile {
        DeviceProfile::resolve(&Default::default(), "5400001")
    }

    fn hd() -> DeviceProfile {
        DeviceProfile::resolve(&Default::default(), "7460001")
    }

    fn mkv() -> SourceDescriptor {
        SourceDescriptor {
            supported: true,
            container: "matroska".into(),
            video_codec: "h264".into(),
            audio_codec: "dts".into(),
            video_width: 1280,
            video_height: 720,
            frame_rate: "23.98".into(),
            video_kbps: Some(8000),
            audio_kbps: Some(1536),
            audio_channels: Some(6),
            audio_sample_rate: "48000".into(),
            video_stream: Some("0:0".into()),
            audio_streams: vec![
                AudioStream::new("0:1", "(eng): dts"),
                AudioStream::new("0:2", "(fre): ac3"),
            ],
            ..SourceDescriptor::default()
        }
    }

    fn joined(args: &[String]) -> String {
        args.join(" ")
    }

    #[test]
    fn full_reencode_for_sd() {
        let args = build(&mkv(), &sd(), OutputFormat::ProgramStream);
        assert_eq!(
            joined(&args),
            "-bufsize 1024k -c:v mpeg2video -pix_fmt yuv420p -b:v 4096k -maxrate 30000k \
             -r 29.97 -aspect 4:3 -vf scale=544:360,pad=544:480:0:60 \
             -c:a ac3 -copyts -b:a 448k -ar 48000 -map 0:0 -map 0:1 -f vob -"
        );
    }

    #[test]
    fn hd_keeps_good_frame_rate_and_raises_bitrate() {
        let mut desc = mkv();
        desc.video_kbps = Some(20_000);
        let args = build(&desc, &hd(), OutputFormat::ProgramStream);
        let s = joined(&args);
        assert!(s.starts_with("-bufsize 4096k -c:v mpeg2video"));
        assert!(s.contains("-b:v 20000k"));
        assert!(!s.contains("-r 29.97"));
        // 1280x720 fits an HD device untouched.
        assert!(!s.contains("-s "));
    }

    #[test]
    fn video_bitrate_is_capped() {
        let mut desc = mkv();
        desc.video_kbps = Some(50_000);
        assert_eq!(video_bitrate(&desc, &hd()), 28_500_000);
        assert_eq!(video_bitrate(&desc, &sd()), 4_096_000);
    }

    #[test]
    fn transport_stream_copies_h264_with_filters() {
        let mut desc = mkv();
        desc.container = "mpegts".into();
        let args = build(&desc, &hd(), OutputFormat::TransportStream);
        let s = joined(&args);
        assert!(s.starts_with("-bufsize 4096k -c:v copy -bsf:v h264_mp4toannexb -muxdelay 0 -c:a ac3"));
        assert!(s.ends_with("-f mpegts -"));
        assert!(!s.contains("-b:v"));
    }

    #[test]
    fn native_program_stream_copies_both() {
        let desc = SourceDescriptor {
            supported: true,
            container: "mpeg".into(),
            video_codec: "mpeg2video".into(),
            audio_codec: "ac3".into(),
            video_width: 720,
            video_height: 480,
            frame_rate: "29.97".into(),
            video_kbps: Some(6000),
            audio_kbps: Some(384),
            audio_channels: Some(6),
            display_aspect_ratio: Some("4:3".into()),
            ..SourceDescriptor::default()
        };
        let args = build(&desc, &sd(), OutputFormat::ProgramStream);
        assert_eq!(
            joined(&args),
            "-bufsize 1024k -c:v copy -c:a copy -f vob -"
        );
    }

    #[test]
    fn audio_codec_rules() {
        let mut desc = mkv();
        desc.audio_codec = "mp2".into();
        desc.audio_channels = Some(2);
        assert_eq!(
            select_audio_codec(&desc, StreamAction::PassThrough),
            AudioCodec::Copy
        );
        assert_eq!(select_audio_codec(&desc, StreamAction::Reencode), AudioCodec::Ac3);

        desc.audio_channels = None;
        assert_eq!(
            select_audio_codec(&desc, StreamAction::PassThrough),
            AudioCodec::Ac3
        );

        desc.audio_codec = "ac3".into();
        desc.audio_channels = Some(6);
        assert_eq!(
            select_audio_codec(&desc, StreamAction::PassThrough),
            AudioCodec::Copy
        );
    }

    #[test]
    fn audio_extras_when_reencoding() {
        let mut desc = mkv();
        desc.audio_sample_rate = "44100".into();
        desc.audio_channels = Some(8);
        let s = joined(&build(&desc, &sd(), OutputFormat::ProgramStream));
        assert!(s.contains("-ar 44100 -ac 6"));
    }

    #[test]
    fn language_preference_changes_map() {
        let mut profile = sd();
        profile.audio_languages = vec!["fre".into()];
        assert_eq!(map_args(&mkv(), &profile), vec!["-map", "0:0", "-map", "0:2"]);

        let mut desc = mkv();
        desc.video_stream = None;
        assert!(map_args(&desc, &profile).is_empty());
    }

    #[test]
    fn encoder_params_are_appended() {
        let mut profile = sd();
        profile.encoder_params = Some("-threads 2  -g 15".into());
        let args = build(&mkv(), &profile, OutputFormat::ProgramStream);
        let tail: Vec<&str> = args.iter().rev().take(7).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["-threads", "2", "-g", "15", "-f", "vob", "-"]);
    }

    #[test]
    fn deterministic() {
        let a = build(&mkv(), &sd(), OutputFormat::ProgramStream);
        let b = build(&mkv(), &sd(), OutputFormat::ProgramStream);
        assert_eq!(a, b);
    }

    #[test]
    fn input_prefix() {
        let args = encoder_args(Path::new("/media/a.mkv"), vec!["-f".into()]);
        assert_eq!(args, vec!["-i", "/media/a.mkv", "-f"]);
    }
}
