//! Row mapping for the two opt-in tables.
//! `OptInToken` itself lives in optin-types so callers don't need rusqlite.

use optin_types::OptInToken;
use rusqlite::Row;

pub const TOKENS_TABLE: &str = "opt_in_tokens";
pub const RELATED_TABLE: &str = "opt_in_related";

/// Column list in the order `token_from_row` expects.
pub(crate) const TOKEN_SELECT: &str = "id, lastModified, token, createdOn, confirmedOn, removeOn, email, emailSubject, emailText";

/// Columns of `opt_in_tokens`, used by the generic finders and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenColumn {
    Id,
    LastModified,
    Token,
    CreatedOn,
    ConfirmedOn,
    RemoveOn,
    Email,
    EmailSubject,
    EmailText,
}

impl TokenColumn {
    pub const ALL: [TokenColumn; 9] = [
        TokenColumn::Id,
        TokenColumn::LastModified,
        TokenColumn::Token,
        TokenColumn::CreatedOn,
        TokenColumn::ConfirmedOn,
        TokenColumn::RemoveOn,
        TokenColumn::Email,
        TokenColumn::EmailSubject,
        TokenColumn::EmailText,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TokenColumn::Id => "id",
            TokenColumn::LastModified => "lastModified",
            TokenColumn::Token => "token",
            TokenColumn::CreatedOn => "createdOn",
            TokenColumn::ConfirmedOn => "confirmedOn",
            TokenColumn::RemoveOn => "removeOn",
            TokenColumn::Email => "email",
            TokenColumn::EmailSubject => "emailSubject",
            TokenColumn::EmailText => "emailText",
        }
    }
}

pub(crate) fn token_from_row(row: &Row<'_>) -> rusqlite::Result<OptInToken> {
    Ok(OptInToken {
        id: row.get(0)?,
        last_modified: row.get(1)?,
        token: row.get(2)?,
        created_on: row.get(3)?,
        confirmed_on: row.get(4)?,
        remove_on: row.get(5)?,
        email: row.get(6)?,
        email_subject: row.get(7)?,
        email_text: row.get(8)?,
    })
}
