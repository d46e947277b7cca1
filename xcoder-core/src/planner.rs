//! Stream Planner: decides the target video bitrate for one file.

use crate::config::BitrateConfig;
use crate::ffprobe::SourceMeta;

/// `min(short_side_threshold_max, r·b₀)` clamped below by `B_min`, or the
/// forced value verbatim if one was configured.
pub fn plan_bitrate(meta: &SourceMeta, config: &BitrateConfig) -> u64 {
  if config.forced != 0 {
    return config.forced;
  }

  let short_side = meta.width.min(meta.height);
  let bucket_max = bucket_max_for(short_side, &config.max_by_resolution);
  let ratio_target = (config.ratio * meta.bitrate_bps as f64).round() as u64;

  ratio_target.min(bucket_max).max(config.min)
}

/// Looks up the smallest threshold ≥ `short_side`; if `short_side` exceeds
/// every threshold, the highest bucket's maximum applies.
fn bucket_max_for(short_side: u32, table: &std::collections::BTreeMap<u32, u64>) -> u64 {
  table
    .iter()
    .find(|(threshold, _)| short_side <= **threshold)
    .map(|(_, max)| *max)
    .or_else(|| table.values().last().copied())
    .unwrap_or(9_000_000)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> BitrateConfig {
    BitrateConfig::default()
  }

  #[test]
  fn typical_1080p_source_targets_3mbps() {
    let meta = SourceMeta { bitrate_bps: 8_000_000, width: 1920, height: 1080, fps: 30.0 };
    assert_eq!(plan_bitrate(&meta, &config()), 3_000_000);
  }

  #[test]
  fn forced_override_wins() {
    let meta = SourceMeta { bitrate_bps: 8_000_000, width: 1920, height: 1080, fps: 30.0 };
    let mut cfg = config();
    cfg.forced = 7_000_000;
    assert_eq!(plan_bitrate(&meta, &cfg), 7_000_000);
  }

  #[test]
  fn low_bitrate_source_is_clamped_to_floor() {
    let meta = SourceMeta { bitrate_bps: 100_000, width: 1280, height: 720, fps: 30.0 };
    assert_eq!(plan_bitrate(&meta, &config()), 500_000);
  }

  #[test]
  fn above_highest_bucket_uses_max_bucket() {
    let meta = SourceMeta { bitrate_bps: 80_000_000, width: 3840, height: 2160, fps: 30.0 };
    assert_eq!(plan_bitrate(&meta, &config()), 9_000_000);
  }

  #[test]
  fn bitrate_always_within_bounds() {
    let cfg = config();
    for (w, h, b0) in [(3840u32, 2160u32, 50_000_000u64), (1280, 720, 10_000_000), (640, 480, 50_000)] {
      let meta = SourceMeta { bitrate_bps: b0, width: w, height: h, fps: 30.0 };
      let b = plan_bitrate(&meta, &cfg);
      let short_side = w.min(h);
      let bucket_max = bucket_max_for(short_side, &cfg.max_by_resolution);
      assert!(b >= cfg.min);
      assert!(b <= bucket_max);
      assert!(b <= (cfg.ratio * b0 as f64).round() as u64 || b == cfg.min);
    }
  }
}
