//! Live Configuration
//!
//! Operator-tunable settings read by every action. Patches are merged field
//! by field and each field is clamped into its valid range on write.

use serde::{Serialize, Deserialize};

/// Smallest accepted overlay pace.
pub const PACE_MS_MIN: u64 = 80;
/// Largest accepted overlay pace.
pub const PACE_MS_MAX: u64 = 800;
/// Smallest accepted effects level.
pub const FX_LEVEL_MIN: f64 = 0.3;
/// Largest accepted effects level.
pub const FX_LEVEL_MAX: f64 = 1.5;

/// Live, admin-mutable configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfig {
    /// Actions per global bonus cycle (>= 1).
    pub threshold: u64,
    /// Score credited on a global bonus.
    pub bonus_score: u64,
    /// Overlay animation pace in milliseconds.
    pub pace_ms: u64,
    /// Overlay effects intensity.
    pub fx_level: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            bonus_score: 500,
            pace_ms: 240,
            fx_level: 1.0,
        }
    }
}

/// Partial update to [`LiveConfig`]. Absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    /// New threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    /// New bonus score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_score: Option<i64>,
    /// New pace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace_ms: Option<i64>,
    /// New effects level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_level: Option<f64>,
}

impl ConfigPatch {
    /// True if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.threshold.is_none()
            && self.bonus_score.is_none()
            && self.pace_ms.is_none()
            && self.fx_level.is_none()
    }

    /// True if every present float field is finite.
    pub fn is_finite(&self) -> bool {
        self.fx_level.map_or(true, f64::is_finite)
    }
}

impl LiveConfig {
    /// Merge a patch, clamping each present field into range.
    ///
    /// A non-finite `fx_level` is ignored.
    pub fn merged(&self, patch: &ConfigPatch) -> LiveConfig {
        let mut next = *self;
        if let Some(threshold) = patch.threshold {
            next.threshold = threshold.max(1) as u64;
        }
        if let Some(bonus_score) = patch.bonus_score {
            next.bonus_score = bonus_score.max(0) as u64;
        }
        if let Some(pace_ms) = patch.pace_ms {
            next.pace_ms = pace_ms.clamp(PACE_MS_MIN as i64, PACE_MS_MAX as i64) as u64;
        }
        if let Some(fx_level) = patch.fx_level.filter(|f| f.is_finite()) {
            next.fx_level = fx_level.clamp(FX_LEVEL_MIN, FX_LEVEL_MAX);
        }
        next
    }

    /// Clamp every field into range.
    ///
    /// Used on values read back from a backing store.
    pub fn clamped(&self) -> LiveConfig {
        let fx_level = if self.fx_level.is_finite() {
            self.fx_level.clamp(FX_LEVEL_MIN, FX_LEVEL_MAX)
        } else {
            LiveConfig::default().fx_level
        };
        LiveConfig {
            threshold: self.threshold.max(1),
            bonus_score: self.bonus_score,
            pace_ms: self.pace_ms.clamp(PACE_MS_MIN, PACE_MS_MAX),
            fx_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_clamps_each_field() {
        let base = LiveConfig::default();
        let patch = ConfigPatch {
            threshold: Some(0),
            bonus_score: Some(-5),
            pace_ms: Some(5),
            fx_level: Some(9.0),
        };
        let merged = base.merged(&patch);
        assert_eq!(merged.threshold, 1);
        assert_eq!(merged.bonus_score, 0);
        assert_eq!(merged.pace_ms, PACE_MS_MIN);
        assert_eq!(merged.fx_level, FX_LEVEL_MAX);

        let patch = ConfigPatch {
            pace_ms: Some(10_000),
            fx_level: Some(0.0),
            ..Default::default()
        };
        let merged = base.merged(&patch);
        assert_eq!(merged.pace_ms, PACE_MS_MAX);
        assert_eq!(merged.fx_level, FX_LEVEL_MIN);
        assert_eq!(merged.threshold, base.threshold);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let base = LiveConfig {
            threshold: 10,
            bonus_score: 42,
            pace_ms: 300,
            fx_level: 0.7,
        };
        let merged = base.merged(&ConfigPatch {
            bonus_score: Some(1000),
            ..Default::default()
        });
        assert_eq!(merged, LiveConfig { bonus_score: 1000, ..base });
        assert_eq!(base.merged(&ConfigPatch::default()), base);
    }

    #[test]
    fn test_non_finite_fx_ignored() {
        let base = LiveConfig::default();
        let patch = ConfigPatch {
            fx_level: Some(f64::NAN),
            ..Default::default()
        };
        assert!(!patch.is_finite());
        assert_eq!(base.merged(&patch), base);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(LiveConfig::default()).unwrap();
        assert_eq!(json["threshold"], 100);
        assert_eq!(json["bonusScore"], 500);
        assert_eq!(json["paceMs"], 240);

        let patch: ConfigPatch = serde_json::from_str(r#"{"paceMs": 100}"#).unwrap();
        assert_eq!(patch.pace_ms, Some(100));
        assert!(patch.threshold.is_none());
    }
}
