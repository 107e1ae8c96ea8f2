/// Engine-assigned prompt identifier; the Job Table key.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
