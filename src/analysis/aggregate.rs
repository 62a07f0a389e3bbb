use super::face::FaceDetail;
use crate::storage::ItemKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Gender bucket for faces the vision service reports no gender for
pub const UNKNOWN_GENDER: &str = "Unknown";

/// Smallest low bound and largest high bound across all faces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallAgeRange {
    #[serde(rename = "Min")]
    pub min: Option<u32>,
    #[serde(rename = "Max")]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub overall_age_range: OverallAgeRange,
    pub gender_distribution: BTreeMap<String, u64>,
    pub emotion_counts: BTreeMap<String, u64>,
}

/// Demographics of one unit plus the number of faces seen in it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceSummary {
    pub demographics: Demographics,
    pub foot_impressions: u64,
}

/// Reduce per-face results to unit-level demographics.
///
/// Every face counts once towards the gender distribution, every reported
/// emotion counts once regardless of confidence. No faces yields empty maps.
pub fn aggregate(faces: &[FaceDetail]) -> FaceSummary {
    let mut demographics = Demographics::default();

    for face in faces {
        if let Some(age) = face.age_range {
            let range = &mut demographics.overall_age_range;
            range.min = Some(range.min.map_or(age.low, |m| m.min(age.low)));
            range.max = Some(range.max.map_or(age.high, |m| m.max(age.high)));
        }

        let gender = face.gender.as_deref().unwrap_or(UNKNOWN_GENDER);
        *demographics
            .gender_distribution
            .entry(gender.to_string())
            .or_insert(0) += 1;

        for emotion in &face.emotions {
            *demographics
                .emotion_counts
                .entry(emotion.label.clone())
                .or_insert(0) += 1;
        }
    }

    FaceSummary {
        demographics,
        foot_impressions: faces.len() as u64,
    }
}

/// One row of the analytics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub unit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub demographics: Demographics,
    pub foot_impressions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_count: Option<u64>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_time: Option<u64>,
}

impl AnalyticsRecord {
    pub fn new(
        source_id: impl Into<String>,
        unit_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        faces: &[FaceDetail],
    ) -> Self {
        let summary = aggregate(faces);
        Self {
            id: Uuid::new_v4(),
            timestamp,
            source_id: source_id.into(),
            unit_id: unit_id.into(),
            video_id: None,
            demographics: summary.demographics,
            foot_impressions: summary.foot_impressions,
            visitor_id: None,
            visit_count: None,
            dwell_time: None,
        }
    }

    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_visit(mut self, visitor_id: impl Into<String>, visit_count: u64, dwell_time: u64) -> Self {
        self.visitor_id = Some(visitor_id.into());
        self.visit_count = Some(visit_count);
        self.dwell_time = Some(dwell_time);
        self
    }

    /// Keyed by timestamp, then unit id
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.timestamp.to_rfc3339(), self.unit_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_faces() {
        let summary = aggregate(&[]);
        assert_eq!(summary.foot_impressions, 0);
        assert_eq!(summary.demographics, Demographics::default());

        let value = serde_json::to_value(&summary.demographics).unwrap();
        assert_eq!(
            value,
            json!({
                "overall_age_range": {"Min": null, "Max": null},
                "gender_distribution": {},
                "emotion_counts": {}
            })
        );
    }

    #[test]
    fn test_single_face() {
        let face = FaceDetail::new()
            .with_age(20, 30)
            .with_gender("Female")
            .with_emotion("HAPPY", 98.5);
        let summary = aggregate(&[face]);

        assert_eq!(summary.foot_impressions, 1);
        assert_eq!(
            serde_json::to_value(&summary.demographics).unwrap(),
            json!({
                "overall_age_range": {"Min": 20, "Max": 30},
                "gender_distribution": {"Female": 1},
                "emotion_counts": {"HAPPY": 1}
            })
        );
    }

    #[test]
    fn test_counts_sum_to_faces() {
        let faces = vec![
            FaceDetail::new()
                .with_age(25, 35)
                .with_gender("Male")
                .with_emotion("CALM", 80.0)
                .with_emotion("HAPPY", 5.0),
            FaceDetail::new().with_age(18, 24).with_emotion("HAPPY", 1.0),
            FaceDetail::new().with_gender("Male").with_emotion("SAD", 40.0),
        ];
        let summary = aggregate(&faces);

        assert_eq!(summary.foot_impressions, 3);
        assert_eq!(summary.demographics.overall_age_range.min, Some(18));
        assert_eq!(summary.demographics.overall_age_range.max, Some(35));
        assert_eq!(summary.demographics.gender_distribution.values().sum::<u64>(), 3);
        assert_eq!(summary.demographics.gender_distribution["Male"], 2);
        assert_eq!(summary.demographics.gender_distribution[UNKNOWN_GENDER], 1);
        assert_eq!(summary.demographics.emotion_counts.values().sum::<u64>(), 4);
        assert_eq!(summary.demographics.emotion_counts["HAPPY"], 2);
    }

    #[test]
    fn test_record_shape() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = AnalyticsRecord::new("booth", "42", ts, &[]).with_video_id("booth");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["unit_id"], "42");
        assert_eq!(value["video_id"], "booth");
        assert_eq!(value["foot_impressions"], 0);
        assert!(value.get("visitor_id").is_none());
        assert_eq!(record.key(), ItemKey::new("2024-05-01T10:00:00+00:00", "42"));

        let visit = record.with_visit("v-1", 2, 20);
        let value = serde_json::to_value(&visit).unwrap();
        assert_eq!(value["visitor_id"], "v-1");
        assert_eq!(value["visit_count"], 2);
        assert_eq!(value["dwell_time"], 20);
    }
}
