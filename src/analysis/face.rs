use serde::{Deserialize, Serialize};

/// Estimated age bracket of one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub low: u32,
    pub high: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: String,
    pub confidence: f32,
}

/// Attributes of one detected face, as reported by the vision service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceDetail {
    pub age_range: Option<AgeRange>,
    pub gender: Option<String>,
    pub emotions: Vec<EmotionScore>,
    /// Identifier the vision service assigned to the face, when it tracks faces
    pub face_id: Option<String>,
    /// Offset into the analysed media, in milliseconds
    pub timestamp_ms: Option<i64>,
}

impl FaceDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_age(mut self, low: u32, high: u32) -> Self {
        self.age_range = Some(AgeRange { low, high });
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_emotion(mut self, label: impl Into<String>, confidence: f32) -> Self {
        self.emotions.push(EmotionScore {
            label: label.into(),
            confidence,
        });
        self
    }

    pub fn with_face_id(mut self, face_id: impl Into<String>) -> Self {
        self.face_id = Some(face_id.into());
        self
    }
}
