//! Database view models returned by repositories.
//!
//! Domain entities (`Channel`, `Record`) live in `crate::model`; the structs
//! here only describe bookkeeping rows.

/// One recorded sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    pub id: String,
    pub channel_id: i64,
    pub fetched: i64,
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
    pub removed: i64,
    pub finished: bool,
    pub error: Option<String>,
}

impl SyncRun {
    pub fn succeeded(&self) -> bool {
        self.finished && self.error.is_none()
    }
}
