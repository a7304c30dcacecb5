use setbox_core::AudioStream;

/// Pick the audio track that best matches a language preference list.
///
/// Each token narrows the candidates to the tracks whose description contains
/// it (the stream id counts as part of the description, so `0:2` names a
/// track directly). A single match wins outright; several matches become the candidates
/// for the next token, the first of them provisionally selected. A token that
/// matches nothing is skipped. Without a usable preference the first
/// detected track is used.
pub fn select_audio_track<'a>(
    streams: &'a [AudioStream],
    languages: &[String],
) -> Option<&'a AudioStream> {
    let mut selected = streams.first();
    let mut candidates: Vec<&AudioStream> = streams.iter().collect();

    for token in languages {
        let matched: Vec<&AudioStream> = candidates
            .iter()
            .copied()
            .filter(|stream| track_matches(stream, token))
            .collect();

        match matched.len() {
            0 => {}
            1 => {
                selected = Some(matched[0]);
                break;
            }
            _ => {
                selected = Some(matched[0]);
                candidates = matched;
            }
        }
    }

    selected
}

/// Whether a track's id or description mentions `token`, ignoring case and
/// spaces.
pub fn track_matches(stream: &AudioStream, token: &str) -> bool {
    let token = normalise(token);
    let text = normalise(&format!("{}{}", stream.id, stream.description));
    !token.is_empty() && text.contains(&token)
}

fn normalise(s: &str) -> String {
    s.replace(' ', "").to_lowercase()
}
