//! Sidecar override files.
//!
//! Text files next to a source can force descriptor fields with
//! `Override_<field> : <value>` lines, which fixes files the prober
//! misreports. Any override also marks the descriptor supported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use setbox_core::{AudioStream, PixelAspectRatio, SourceDescriptor};

const OVERRIDE_PREFIX: &str = "Override_";
const BOM: char = '\u{feff}';

/// Files consulted for `path`, in the order they are applied (later wins).
///
/// Every `default.txt` from the filesystem root down to the file's directory,
/// then `<stem>.properties`, `<file>.txt`, `.meta/default.txt` and
/// `.meta/<file>.txt`.
pub fn search_paths(path: &Path) -> Vec<PathBuf> {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut paths: Vec<PathBuf> = path
        .ancestors()
        .skip(1)
        .map(|ancestor| ancestor.join("default.txt"))
        .collect();
    paths.reverse();

    paths.push(dir.join(format!("{stem}.properties")));
    paths.push(dir.join(format!("{name}.txt")));
    paths.push(dir.join(".meta").join("default.txt"));
    paths.push(dir.join(".meta").join(format!("{name}.txt")));
    paths
}

/// Read all key/value pairs for `path`. Unreadable files are skipped.
pub fn read_sidecars(path: &Path) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for file in search_paths(path) {
        let Ok(text) = std::fs::read_to_string(&file) else {
            continue;
        };
        let separator = if file.extension().is_some_and(|e| e == "properties") {
            '='
        } else {
            ':'
        };
        tracing::trace!(file = %file.display(), "reading sidecar");
        parse_sidecar(&text, separator, &mut values);
    }
    values
}

fn parse_sidecar(text: &str, separator: char, values: &mut BTreeMap<String, String>) {
    for line in text.lines() {
        let line = line.trim_start_matches(BOM);
        if line.trim_start().starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(separator) else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        values.insert(key.to_string(), value.to_string());
    }
}

/// Apply the `Override_` entries of `values` to `desc`.
///
/// Returns whether anything was overridden. Field names are the descriptor's
/// own (`Override_video_codec`); the short legacy names (`Override_vCodec`)
/// found in existing sidecar collections are accepted too.
pub fn apply_overrides(desc: &mut SourceDescriptor, values: &BTreeMap<String, String>) -> bool {
    let mut applied = false;
    for (key, value) in values {
        let Some(field) = key.strip_prefix(OVERRIDE_PREFIX) else {
            continue;
        };
        desc.supported = true;
        applied = true;
        if !set_field(desc, field, value) {
            tracing::debug!(field, value, "ignoring unknown or malformed override");
        }
    }
    applied
}

fn set_field(desc: &mut SourceDescriptor, field: &str, value: &str) -> bool {
    match field {
        "container" => desc.container = value.to_string(),
        "video_codec" | "vCodec" => desc.video_codec = value.to_string(),
        "audio_codec" | "aCodec" => desc.audio_codec = value.to_string(),
        "frame_rate" | "vFps" => desc.frame_rate = value.to_string(),
        "audio_sample_rate" | "aFreq" => desc.audio_sample_rate = value.to_string(),
        "video_stream" | "mapVideo" => desc.video_stream = Some(value.to_string()),
        "display_aspect_ratio" | "dar1" => desc.display_aspect_ratio = Some(value.to_string()),
        "video_width" | "vWidth" => return set_parsed(&mut desc.video_width, value),
        "video_height" | "vHeight" => return set_parsed(&mut desc.video_height, value),
        "duration_millis" | "millisecs" => return set_parsed(&mut desc.duration_millis, value),
        "video_kbps" | "kbps" => return set_parsed_opt(&mut desc.video_kbps, value),
        "audio_kbps" | "aKbps" => return set_parsed_opt(&mut desc.audio_kbps, value),
        "audio_channels" | "aCh" => return set_parsed_opt(&mut desc.audio_channels, value),
        "pixel_aspect_ratio" | "par1" => match PixelAspectRatio::parse(value) {
            Some(par) => desc.pixel_aspect_ratio = Some(par),
            None => return false,
        },
        "audio_streams" | "mapAudio" => merge_audio_streams(desc, value),
        _ => return false,
    }
    true
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) -> bool {
    match value.parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

fn set_parsed_opt<T: std::str::FromStr>(slot: &mut Option<T>, value: &str) -> bool {
    match value.parse() {
        Ok(v) => {
            *slot = Some(v);
            true
        }
        Err(_) => false,
    }
}

/// `<id> <description> <id> <description> ...`, with shell-style quoting.
/// Pairs replace detected streams with the same id; the result is ordered by
/// id.
fn merge_audio_streams(desc: &mut SourceDescriptor, value: &str) {
    let words = split_quoted(value);
    let mut streams: BTreeMap<String, String> = desc
        .audio_streams
        .drain(..)
        .map(|s| (s.id, s.description))
        .collect();
    for pair in words.chunks_exact(2) {
        streams.insert(pair[0].clone(), pair[1].clone());
    }
    desc.audio_streams = streams
        .into_iter()
        .map(|(id, description)| AudioStream::new(id, description))
        .collect();
}

/// Split on whitespace, honouring single and double quotes and backslash
/// escapes outside single quotes.
fn split_quoted(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_order_runs_root_to_leaf_then_specific_files() {
        let paths = search_paths(Path::new("/media/tv/show.mkv"));
        let expected: Vec<PathBuf> = [
            "/default.txt",
            "/media/default.txt",
            "/media/tv/default.txt",
            "/media/tv/show.properties",
            "/media/tv/show.mkv.txt",
            "/media/tv/.meta/default.txt",
            "/media/tv/.meta/show.mkv.txt",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn later_files_win_and_comments_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("show.mpg");
        std::fs::write(&media, b"").unwrap();
        std::fs::write(
            dir.path().join("default.txt"),
            "\u{feff}Override_vCodec : mpeg2video\n# Override_aCodec : mp2\nnoseparator\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("show.properties"), "Override_aCodec=ac3\n").unwrap();
        std::fs::create_dir(dir.path().join(".meta")).unwrap();
        std::fs::write(
            dir.path().join(".meta").join("show.mpg.txt"),
            "Override_vCodec : h264\n",
        )
        .unwrap();

        let values = read_sidecars(&media);
        assert_eq!(values.get("Override_vCodec").map(String::as_str), Some("h264"));
        assert_eq!(values.get("Override_aCodec").map(String::as_str), Some("ac3"));
        assert!(!values.contains_key("noseparator"));
    }

    #[test]
    fn overrides_force_support() {
        let mut desc = SourceDescriptor::unsupported();
        let values = BTreeMap::from([
            ("title".to_string(), "Ignored".to_string()),
            ("Override_millisecs".to_string(), "120000".to_string()),
            ("Override_video_codec".to_string(), "mpeg2video".to_string()),
            ("Override_par1".to_string(), "10:11".to_string()),
        ]);
        assert!(apply_overrides(&mut desc, &values));
        assert!(desc.supported);
        assert_eq!(desc.duration_millis, 120_000);
        assert_eq!(desc.video_codec, "mpeg2video");
        assert_eq!(desc.pixel_aspect_ratio.unwrap().label(), "10:11");
    }

    #[test]
    fn no_overrides_leaves_descriptor_alone() {
        let mut desc = SourceDescriptor::unsupported();
        let values = BTreeMap::from([("title".to_string(), "Show".to_string())]);
        assert!(!apply_overrides(&mut desc, &values));
        assert!(!desc.supported);
    }

    #[test]
    fn audio_map_override_merges_and_sorts() {
        let mut desc = SourceDescriptor::unsupported();
        desc.audio_streams = vec![
            AudioStream::new("0:2", "(fre): ac3"),
            AudioStream::new("0:1", "(eng): dts"),
        ];
        set_field(&mut desc, "mapAudio", "0:1 '(eng): ac3 commentary' 0:3 \"(spa): mp2\"");
        let streams: Vec<(&str, &str)> = desc
            .audio_streams
            .iter()
            .map(|s| (s.id.as_str(), s.description.as_str()))
            .collect();
        assert_eq!(
            streams,
            vec![
                ("0:1", "(eng): ac3 commentary"),
                ("0:2", "(fre): ac3"),
                ("0:3", "(spa): mp2"),
            ]
        );
    }

    #[test]
    fn quoted_split() {
        assert_eq!(split_quoted(r#"a "b c" 'd e' f\ g"#), vec!["a", "b c", "d e", "f g"]);
        assert!(split_quoted("   ").is_empty());
        assert_eq!(split_quoted("''"), vec![""]);
    }
}
