use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::Utc;
use optin_types::{NewOptInToken, OptInToken, RelatedRecord};
use rusqlite::{Connection, OptionalExtension, Params, ToSql, TransactionBehavior, params};

use crate::Database;
use crate::error::{Result, StoreError};
use crate::models::{TOKEN_SELECT, TOKENS_TABLE, TokenColumn, token_from_row};
use crate::registry::Registry;

/// Shared handle to a loaded token. Two handles point at the same row object
/// iff `Rc::ptr_eq` holds.
pub type TokenRef = Rc<RefCell<OptInToken>>;

/// A unit of work over the opt-in tables.
///
/// Every token row loaded through a session is deduplicated by its registry,
/// so repeated lookups of the same row hand back the same `TokenRef`.
pub struct Session<'a> {
    db: &'a Database,
    registry: Registry<OptInToken>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry<OptInToken> {
        &self.registry
    }

    // -- Finders --

    pub fn find_by_id(&mut self, id: i64) -> Result<Option<TokenRef>> {
        if let Some(token) = self.registry.fetch(TOKENS_TABLE, id) {
            return Ok(Some(token));
        }
        self.find_one_by(TokenColumn::Id, id)
    }

    pub fn find_by_pk(&mut self, id: i64) -> Result<Option<TokenRef>> {
        self.find_by_id(id)
    }

    pub fn find_one_by_token(&mut self, token: &str) -> Result<Option<TokenRef>> {
        self.find_one_by(TokenColumn::Token, token)
    }

    pub fn find_one_by<V: ToSql>(&mut self, column: TokenColumn, value: V) -> Result<Option<TokenRef>> {
        let sql = format!(
            "SELECT {} FROM opt_in_tokens WHERE {} = ?1 ORDER BY id LIMIT 1",
            TOKEN_SELECT,
            column.as_str()
        );
        self.load_one(&sql, params![value])
    }

    pub fn find_by<V: ToSql>(&mut self, column: TokenColumn, value: V) -> Result<Vec<TokenRef>> {
        let sql = format!(
            "SELECT {} FROM opt_in_tokens WHERE {} = ?1 ORDER BY id",
            TOKEN_SELECT,
            column.as_str()
        );
        self.load_all(&sql, params![value])
    }

    /// Tokens with the given ids, in the order the ids are listed.
    /// Ids without a row are skipped.
    pub fn find_multiple_by_ids(&mut self, ids: &[i64]) -> Result<Vec<TokenRef>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT {} FROM opt_in_tokens WHERE id IN ({})",
            TOKEN_SELECT,
            placeholders.join(", ")
        );
        let mut found = self.load_all(&sql, rusqlite::params_from_iter(ids))?;

        found.sort_by_key(|t| {
            let id = t.borrow().id;
            ids.iter().position(|candidate| *candidate == id)
        });
        Ok(found)
    }

    pub fn find_all(&mut self) -> Result<Vec<TokenRef>> {
        let sql = format!("SELECT {} FROM opt_in_tokens ORDER BY id", TOKEN_SELECT);
        self.load_all(&sql, params![])
    }

    /// Tokens whose `removeOn` is set and lies before `now`.
    /// Tokens with `removeOn = 0` never expire.
    pub fn find_expired_tokens(&mut self, now: i64) -> Result<Vec<TokenRef>> {
        let sql = format!(
            "SELECT {} FROM opt_in_tokens WHERE removeOn > 0 AND removeOn < ?1 ORDER BY id",
            TOKEN_SELECT
        );
        self.load_all(&sql, params![now])
    }

    pub fn find_expired_tokens_now(&mut self) -> Result<Vec<TokenRef>> {
        self.find_expired_tokens(Utc::now().timestamp())
    }

    /// The token that owns the related record `(related_table, related_id)`.
    pub fn find_token_by_related_record(
        &mut self,
        related_table: &str,
        related_id: i64,
    ) -> Result<Option<TokenRef>> {
        let sql = format!(
            "SELECT {} FROM opt_in_tokens
             WHERE id IN (SELECT parentId FROM opt_in_related WHERE relatedTable = ?1 AND relatedId = ?2)
             ORDER BY id LIMIT 1",
            TOKEN_SELECT
        );
        self.load_one(&sql, params![related_table, related_id])
    }

    // -- Counters --

    pub fn count_by<V: ToSql>(&self, column: TokenColumn, value: V) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM opt_in_tokens WHERE {} = ?1", column.as_str());
        self.db
            .with_conn(|conn| Ok(conn.query_row(&sql, params![value], |row| row.get(0))?))
    }

    pub fn count_all(&self) -> Result<i64> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM opt_in_tokens", [], |row| row.get(0))?)
        })
    }

    // -- Writes --

    /// Insert a new token and register it with this session.
    pub fn create(&mut self, new: NewOptInToken) -> Result<TokenRef> {
        let now = Utc::now().timestamp();

        let id = self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO opt_in_tokens
                    (lastModified, token, createdOn, confirmedOn, removeOn, email, emailSubject, emailText)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7)",
                params![
                    now,
                    new.token,
                    new.created_on,
                    new.remove_on,
                    new.email,
                    new.email_subject,
                    new.email_text
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        let token = OptInToken {
            id,
            last_modified: now,
            token: new.token,
            created_on: new.created_on,
            confirmed_on: 0,
            remove_on: new.remove_on,
            email: new.email,
            email_subject: new.email_subject,
            email_text: new.email_text,
        };
        Ok(self.registry.register(TOKENS_TABLE, id, token))
    }

    /// Write all columns of `token` back to its row and bump `lastModified`.
    /// Returns the number of rows updated.
    pub fn save(&self, token: &TokenRef) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut t = token.borrow_mut();
        if t.id == 0 {
            return Err(StoreError::Unsaved);
        }

        let affected = self.db.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE opt_in_tokens
                 SET lastModified = ?1, token = ?2, createdOn = ?3, confirmedOn = ?4,
                     removeOn = ?5, email = ?6, emailSubject = ?7, emailText = ?8
                 WHERE id = ?9",
                params![
                    now,
                    t.token,
                    t.created_on,
                    t.confirmed_on,
                    t.remove_on,
                    t.email,
                    t.email_subject,
                    t.email_text,
                    t.id
                ],
            )?)
        })?;

        if affected > 0 {
            t.last_modified = now;
        }
        Ok(affected)
    }

    /// Mark the token as confirmed at `now`.
    /// Returns false if it was already confirmed or its row no longer exists.
    pub fn confirm(&self, token: &TokenRef, now: i64) -> Result<bool> {
        let previous = {
            let mut t = token.borrow_mut();
            if t.is_confirmed() {
                return Ok(false);
            }
            std::mem::replace(&mut t.confirmed_on, now)
        };

        // Nothing written means nothing confirmed; keep memory in line with the row.
        match self.save(token) {
            Ok(affected) if affected > 0 => Ok(true),
            Ok(_) => {
                token.borrow_mut().confirmed_on = previous;
                Ok(false)
            }
            Err(e) => {
                token.borrow_mut().confirmed_on = previous;
                Err(e)
            }
        }
    }

    /// Reload the in-memory token from its row. Returns false (and drops the
    /// token from the registry) if the row is gone.
    pub fn refresh(&mut self, token: &TokenRef) -> Result<bool> {
        let id = stored_id(token)?;
        let sql = format!("SELECT {} FROM opt_in_tokens WHERE id = ?1", TOKEN_SELECT);
        let row = self
            .db
            .with_conn(|conn| Ok(conn.query_row(&sql, [id], token_from_row).optional()?))?;

        match row {
            Some(row) => {
                *token.borrow_mut() = row;
                Ok(true)
            }
            None => {
                self.registry.unregister(TOKENS_TABLE, id);
                Ok(false)
            }
        }
    }

    /// Delete the token row only, leaving related records untouched.
    /// Returns the number of rows removed.
    pub fn delete(&mut self, token: &TokenRef) -> Result<usize> {
        let id = stored_id(token)?;
        let affected = self.db.with_conn_mut(|conn| delete_token_row(conn, id))?;
        // The row is gone either way
        self.registry.unregister(TOKENS_TABLE, id);
        Ok(affected)
    }

    /// Delete the token together with all of its related records.
    /// Returns the number of token rows removed (0 or 1).
    pub fn delete_token(&mut self, token: &TokenRef) -> Result<usize> {
        let id = stored_id(token)?;

        let affected = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM opt_in_related WHERE parentId = ?1", [id])?;
            let affected = delete_token_row(&tx, id)?;
            tx.commit()?;
            Ok(affected)
        })?;

        // The row is gone either way
        self.registry.unregister(TOKENS_TABLE, id);
        Ok(affected)
    }

    // -- Related records --

    /// Related records keyed by table name.
    ///
    /// If several records share a table, only the last one survives. Use
    /// [`Session::related_records`] to see all of them.
    pub fn get_related_records(&self, token: &TokenRef) -> Result<BTreeMap<String, i64>> {
        Ok(self
            .related_records(token)?
            .into_iter()
            .map(|r| (r.related_table, r.related_id))
            .collect())
    }

    /// All related records of `token` in insertion order.
    pub fn related_records(&self, token: &TokenRef) -> Result<Vec<RelatedRecord>> {
        let id = token.borrow().id;
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT parentId, relatedTable, relatedId FROM opt_in_related
                 WHERE parentId = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([id], |row| {
                    Ok(RelatedRecord {
                        parent_id: row.get(0)?,
                        related_table: row.get(1)?,
                        related_id: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Attach related records to a token. A token's related records can only
    /// be set once; later calls fail with [`StoreError::PreconditionViolation`].
    ///
    /// Repeated table names keep the last id given.
    pub fn set_related_records<I, K>(&self, token: &TokenRef, records: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let id = stored_id(token)?;
        let records: BTreeMap<String, i64> = records
            .into_iter()
            .map(|(table, related_id)| (table.into(), related_id))
            .collect();

        self.db.with_conn_mut(|conn| {
            // IMMEDIATE takes the write lock up front, so the check below
            // cannot race with another writer.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM opt_in_related WHERE parentId = ?1",
                [id],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Err(StoreError::PreconditionViolation {
                    token: token.borrow().token.clone(),
                });
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO opt_in_related (parentId, relatedTable, relatedId) VALUES (?1, ?2, ?3)",
                )?;
                for (table, related_id) in &records {
                    stmt.execute(params![id, table, related_id])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    // -- Helpers --

    fn load_one<P: Params>(&mut self, sql: &str, params: P) -> Result<Option<TokenRef>> {
        let row = self
            .db
            .with_conn(|conn| Ok(conn.query_row(sql, params, token_from_row).optional()?))?;
        Ok(row.map(|row| self.hydrate(row)))
    }

    fn load_all<P: Params>(&mut self, sql: &str, params: P) -> Result<Vec<TokenRef>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, token_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(|row| self.hydrate(row)).collect())
    }

    /// Return the registered instance for this row if there is one, otherwise
    /// register the freshly loaded row.
    fn hydrate(&mut self, row: OptInToken) -> TokenRef {
        self.registry.register(TOKENS_TABLE, row.id, row)
    }
}

fn stored_id(token: &TokenRef) -> Result<i64> {
    match token.borrow().id {
        0 => Err(StoreError::Unsaved),
        id => Ok(id),
    }
}

fn delete_token_row(conn: &Connection, id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM opt_in_tokens WHERE id = ?1", [id])?)
}
