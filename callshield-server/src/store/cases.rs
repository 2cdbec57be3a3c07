//! Case provisioning: slug → protected phone number

use super::LiveStore;
use callshield_common::time::now_ms;
use callshield_common::{Error, Result};

/// One provisioned case
#[derive(Debug, Clone)]
pub struct CaseRow {
    pub slug: String,
    pub phone_number: Option<String>,
}

impl LiveStore {
    /// Create a case row if it does not exist yet.
    pub async fn create_case(&self, slug: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO cases (slug, created_at) VALUES (?1, ?2)")
            .bind(slug)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_case(&self, slug: &str) -> Result<Option<CaseRow>> {
        let row = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT slug, phone_number FROM cases WHERE slug = ?1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(slug, phone_number)| CaseRow { slug, phone_number }))
    }

    /// Store the protected number for a case. A different number already
    /// on file requires the override flag.
    pub async fn set_phone(&self, slug: &str, phone: &str, allow_override: bool) -> Result<()> {
        self.create_case(slug).await?;
        let existing = self.get_case(slug).await?.and_then(|c| c.phone_number);

        if let Some(current) = existing {
            if current != phone && !allow_override {
                return Err(Error::Conflict(
                    "A different number is already on file for this case.".into(),
                ));
            }
        }

        sqlx::query("UPDATE cases SET phone_number = ?2 WHERE slug = ?1")
            .bind(slug)
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::LiveStore;
    use callshield_common::events::event_channel;
    use callshield_common::Error;

    async fn test_store() -> (LiveStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = callshield_common::db::init_database(&dir.path().join("t.db"))
            .await
            .unwrap();
        (LiveStore::new(pool, event_channel(16)), dir)
    }

    #[tokio::test]
    async fn phone_save_and_conflict() {
        let (store, _dir) = test_store().await;
        store.set_phone("case-1", "+14155552671", false).await.unwrap();

        // Same number again is fine
        store.set_phone("case-1", "+14155552671", false).await.unwrap();

        // Different number without override conflicts
        let err = store.set_phone("case-1", "+14155550000", false).await;
        assert!(matches!(err, Err(Error::Conflict(_))));

        // Override replaces
        store.set_phone("case-1", "+14155550000", true).await.unwrap();
        let case = store.get_case("case-1").await.unwrap().unwrap();
        assert_eq!(case.phone_number.as_deref(), Some("+14155550000"));
    }
}
