use serde::{Deserialize, Serialize};

/// One shared staging slot. The store key addressing the record is kept
/// outside the record itself and is never exposed in API responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagingRecord {
    pub hostname: String,
    pub name: String,
    pub ip: String,
    pub user: String,
    pub branch: String,
    pub timestamp: i64,
    #[serde(rename = "timeString")]
    pub time_string: String,
}

impl StagingRecord {
    /// The one-line rendering used by the list endpoint.
    pub fn status_line(&self) -> String {
        format!(
            "{} is using {} at {} for {} since {}",
            self.user, self.name, self.ip, self.branch, self.time_string
        )
    }
}

/// Field subset merged into an existing record by a partial update.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub user: Option<String>,
    pub branch: Option<String>,
    pub timestamp: Option<i64>,
    pub time_string: Option<String>,
}
