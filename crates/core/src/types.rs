/// Scene identifiers are assigned by the upstream script/storyboard layer.
pub type SceneId = u32;

/// Zero-based index of one generated variant within a job.
pub type CopyIndex = u32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
