use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use optin_db::Database;
use tracing::{debug, info, warn};

/// Background task that prunes expired opt-in tokens.
///
/// Runs on an interval, finds tokens whose `removeOn` has passed and deletes
/// them together with their related records.
pub async fn run_sweep_loop(db: Arc<Database>, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        match sweep_in_background(db.clone()).await {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: pruned {} expired opt-in tokens", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }
}

/// Run one sweep on the blocking pool, stamped with the current time.
pub async fn sweep_in_background(db: Arc<Database>) -> anyhow::Result<usize> {
    let now = Utc::now().timestamp();
    tokio::task::spawn_blocking(move || sweep_once(&db, now)).await?
}

/// Delete every token that is expired at `now`. Returns the number of token
/// rows removed.
pub fn sweep_once(db: &Database, now: i64) -> anyhow::Result<usize> {
    let mut session = db.session();
    let expired = session.find_expired_tokens(now)?;

    let mut removed = 0;
    for token in &expired {
        let affected = session.delete_token(token)?;
        debug!(token = %token.borrow().token, affected, "Deleted expired opt-in token");
        removed += affected;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use optin_db::NewOptInToken;

    fn seed(db: &Database, token: &str, remove_on: i64) {
        let mut session = db.session();
        let t = session
            .create(NewOptInToken {
                token: token.into(),
                remove_on,
                email: "reader@example.com".into(),
                ..Default::default()
            })
            .unwrap();
        session
            .set_related_records(&t, [("tl_newsletter_recipients", remove_on)])
            .unwrap();
    }

    #[test]
    fn sweep_removes_only_expired() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "forever", 0);
        seed(&db, "stale", 10);
        seed(&db, "fresh", 500);

        assert_eq!(sweep_once(&db, 100).unwrap(), 1);

        let mut session = db.session();
        assert!(session.find_one_by_token("stale").unwrap().is_none());
        assert!(session.find_one_by_token("forever").unwrap().is_some());
        assert!(session.find_one_by_token("fresh").unwrap().is_some());
        assert!(session
            .find_token_by_related_record("tl_newsletter_recipients", 10)
            .unwrap()
            .is_none());

        // Nothing left to do at the same instant
        assert_eq!(sweep_once(&db, 100).unwrap(), 0);
    }

    #[tokio::test]
    async fn background_sweep_uses_current_time() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, "ancient", 1);
        seed(&db, "forever", 0);

        assert_eq!(sweep_in_background(db.clone()).await.unwrap(), 1);
        assert_eq!(db.session().count_all().unwrap(), 1);
    }
}
