pub mod aggregate;
pub mod face;
pub mod invoker;
pub mod visitor;

pub use aggregate::{aggregate, AnalyticsRecord, Demographics, FaceSummary, OverallAgeRange};
pub use face::{AgeRange, EmotionScore, FaceDetail};
pub use invoker::{AnalysisError, AnalysisInvoker, StreamProcessorSession};
pub use visitor::{identity_from_config, VisitorIdentity, VisitorRecord, VisitorTracker};
