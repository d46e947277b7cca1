//! Audio/subtitle stream-mapping policy. A
//! Command-Builder collaborator: it decides which streams to keep and
//! whether to copy or transcode them, but has no effect on the scheduler's
//! state machine, concurrency model, or invariants.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AudioStream {
  pub index: u32,
  pub codec: String,
  pub bitrate_bps: Option<u64>,
  pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleStream {
  pub index: u32,
  pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioAction {
  Copy,
  Transcode { codec: &'static str, bitrate_bps: u64 },
}

#[derive(Debug, Clone)]
pub struct AudioPlan {
  pub stream_index: u32,
  pub action: AudioAction,
}

#[derive(Debug, Clone)]
pub struct SubtitlePlan {
  pub stream_index: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StreamPlan {
  pub audio: Vec<AudioPlan>,
  pub subtitles: Vec<SubtitlePlan>,
}

/// Codecs efficient enough to carry through unmodified when already under
/// the bitrate ceiling.
const COPY_ELIGIBLE_CODECS: &[&str] = &["aac", "opus", "ac3", "eac3"];
const COPY_BITRATE_CEILING_BPS: u64 = 256_000;
const TRANSCODE_TARGET_BITRATE_BPS: u64 = 128_000;

fn language_matches(track_lang: &Option<String>, preferred: &[String]) -> bool {
  if preferred.is_empty() {
    return true;
  }
  match track_lang {
    Some(lang) => preferred.iter().any(|p| p.eq_ignore_ascii_case(lang)),
    None => false,
  }
}

fn decide_audio_action(stream: &AudioStream) -> AudioAction {
  let under_ceiling = stream.bitrate_bps.map(|b| b <= COPY_BITRATE_CEILING_BPS).unwrap_or(false);
  if COPY_ELIGIBLE_CODECS.contains(&stream.codec.as_str()) && under_ceiling {
    AudioAction::Copy
  } else {
    AudioAction::Transcode { codec: "aac", bitrate_bps: TRANSCODE_TARGET_BITRATE_BPS }
  }
}

/// With no language preference configured, or none of the preferred
/// languages present, only the first audio track is kept rather than every
/// track — mirroring the default "first" track-selection policy.
fn select_audio_streams(streams: &[AudioStream], preferred_languages: &[String]) -> Vec<AudioStream> {
  if streams.is_empty() {
    return Vec::new();
  }
  let matching: Vec<AudioStream> = if preferred_languages.is_empty() {
    Vec::new()
  } else {
    streams.iter().filter(|s| language_matches(&s.language, preferred_languages)).cloned().collect()
  };
  if matching.is_empty() {
    vec![streams[0].clone()]
  } else {
    matching
  }
}

fn select_subtitle_streams(streams: &[SubtitleStream], allowed_languages: &[String]) -> Vec<SubtitleStream> {
  if allowed_languages.is_empty() {
    return streams.to_vec();
  }
  streams.iter().filter(|s| language_matches(&s.language, allowed_languages)).cloned().collect()
}

/// Builds the copy-vs-transcode / keep-vs-drop plan for every non-video
/// stream in a file.
pub fn build_stream_plan(
  audio_streams: &[AudioStream],
  subtitle_streams: &[SubtitleStream],
  preferred_audio_languages: &[String],
  allowed_subtitle_languages: &[String],
) -> StreamPlan {
  let audio = select_audio_streams(audio_streams, preferred_audio_languages)
    .into_iter()
    .map(|s| AudioPlan { stream_index: s.index, action: decide_audio_action(&s) })
    .collect();

  let subtitles = select_subtitle_streams(subtitle_streams, allowed_subtitle_languages)
    .into_iter()
    .map(|s| SubtitlePlan { stream_index: s.index })
    .collect();

  StreamPlan { audio, subtitles }
}

/// Translates a [`StreamPlan`] into ffmpeg `-map`/codec argv fragments,
/// appended after the Command Builder's video-encode arguments.
pub fn stream_plan_args(plan: &StreamPlan) -> Vec<String> {
  let mut args = vec!["-map".to_string(), "0:v:0".to_string()];
  for audio in &plan.audio {
    args.push("-map".to_string());
    args.push(format!("0:{}", audio.stream_index));
    match audio.action {
      AudioAction::Copy => {
        args.push(format!("-c:a:{}", audio.stream_index));
        args.push("copy".to_string());
      }
      AudioAction::Transcode { codec, bitrate_bps } => {
        args.push(format!("-c:a:{}", audio.stream_index));
        args.push(codec.to_string());
        args.push(format!("-b:a:{}", audio.stream_index));
        args.push(bitrate_bps.to_string());
      }
    }
  }
  for sub in &plan.subtitles {
    args.push("-map".to_string());
    args.push(format!("0:{}", sub.stream_index));
    args.push(format!("-c:s:{}", sub.stream_index));
    args.push("copy".to_string());
  }
  args
}

#[cfg(test)]
mod tests {
  use super::*;

  fn audio(index: u32, codec: &str, bitrate_bps: Option<u64>, language: Option<&str>) -> AudioStream {
    AudioStream { index, codec: codec.to_string(), bitrate_bps, language: language.map(String::from) }
  }

  #[test]
  fn efficient_low_bitrate_track_is_copied() {
    let action = decide_audio_action(&audio(1, "aac", Some(128_000), None));
    assert_eq!(action, AudioAction::Copy);
  }

  #[test]
  fn lossy_high_bitrate_track_is_transcoded() {
    let action = decide_audio_action(&audio(1, "dts", Some(1_500_000), None));
    assert_eq!(action, AudioAction::Transcode { codec: "aac", bitrate_bps: 128_000 });
  }

  #[test]
  fn language_preference_narrows_selection() {
    let streams = vec![audio(1, "aac", Some(128_000), Some("eng")), audio(2, "aac", Some(128_000), Some("jpn"))];
    let selected = select_audio_streams(&streams, &["jpn".to_string()]);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].index, 2);
  }

  #[test]
  fn no_matching_language_falls_back_to_first_track() {
    let streams = vec![audio(1, "aac", Some(128_000), Some("eng")), audio(2, "aac", Some(128_000), Some("fra"))];
    let selected = select_audio_streams(&streams, &["jpn".to_string()]);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].index, 1);
  }

  #[test]
  fn no_preference_configured_keeps_only_first_track() {
    let streams = vec![audio(1, "aac", Some(128_000), Some("eng")), audio(2, "aac", Some(128_000), Some("fra"))];
    let selected = select_audio_streams(&streams, &[]);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].index, 1);
  }

  #[test]
  fn stream_plan_args_include_video_map_first() {
    let plan = StreamPlan {
      audio: vec![AudioPlan { stream_index: 1, action: AudioAction::Copy }],
      subtitles: vec![],
    };
    let args = stream_plan_args(&plan);
    assert_eq!(&args[..2], &["-map".to_string(), "0:v:0".to_string()]);
  }
}
