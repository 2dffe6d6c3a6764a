use serde::{Deserialize, Serialize};

/// A double opt-in token as stored in `opt_in_tokens`.
///
/// Timestamps are unix seconds. `remove_on == 0` means the token never
/// expires; `confirmed_on == 0` means it has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptInToken {
    pub id: i64,
    pub last_modified: i64,
    pub token: String,
    pub created_on: i64,
    pub confirmed_on: i64,
    pub remove_on: i64,
    pub email: String,
    pub email_subject: String,
    pub email_text: String,
}

impl OptInToken {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_on > 0
    }

    /// Whether the token is past its removal date at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.remove_on > 0 && self.remove_on < now
    }
}

/// Caller-supplied fields for a token that has not been stored yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOptInToken {
    pub token: String,
    pub created_on: i64,
    pub remove_on: i64,
    pub email: String,
    pub email_subject: String,
    pub email_text: String,
}

/// Link from a token to a row in some other table (what the confirmation is for).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRecord {
    pub parent_id: i64,
    pub related_table: String,
    pub related_id: i64,
}
