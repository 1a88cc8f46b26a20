use crate::models::invite::{InviteRaw, InviteStatus};
use crate::services::states::db::{
    DataBaseError, DataBaseResult, SqliteBaseResultExt, SqliteQueryResultExt,
};
use sqlx::{Executor, Sqlite, query, query_as, query_scalar};
use time::OffsetDateTime;

pub struct InviteRepo<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    pub inner: &'a mut E,
}

impl<'a, E> InviteRepo<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    pub async fn create(&mut self, secret: &str, signer: &str) -> DataBaseResult<InviteRaw> {
        query_as::<_, InviteRaw>(
            // language=sql
            r#"
                INSERT INTO invites (secret, signer, status, update_date)
                VALUES (?, ?, ?, ?)
                RETURNING id, secret, signer, status, update_date
            "#,
        )
        .bind(secret)
        .bind(signer)
        .bind(InviteStatus::Unclaimed)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *self.inner)
        .await
        .resolve()
    }

    pub async fn get_by_id(&mut self, id: i64) -> DataBaseResult<InviteRaw> {
        query_as::<_, InviteRaw>(
            // language=sql
            "SELECT id, secret, signer, status, update_date FROM invites WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *self.inner)
        .await
        .resolve()
    }

    pub async fn get_by_secret<T>(&mut self, secret: T) -> DataBaseResult<Option<InviteRaw>>
    where
        T: AsRef<str>,
    {
        query_as::<_, InviteRaw>(
            // language=sql
            "SELECT id, secret, signer, status, update_date FROM invites WHERE secret = ?",
        )
        .bind(secret.as_ref())
        .fetch_optional(&mut *self.inner)
        .await
        .resolve()
    }

    pub async fn list_all(&mut self) -> DataBaseResult<Vec<InviteRaw>> {
        query_as::<_, InviteRaw>(
            // language=sql
            "SELECT id, secret, signer, status, update_date FROM invites ORDER BY id",
        )
        .fetch_all(&mut *self.inner)
        .await
        .resolve()
    }

    /// Overwrites status and update date. Transition legality is the caller's business.
    pub async fn set_status(&mut self, id: i64, status: InviteStatus) -> DataBaseResult<()> {
        query(
            // language=sql
            "UPDATE invites SET status = ?, update_date = ? WHERE id = ?",
        )
        .bind(status)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .execute(&mut *self.inner)
        .await
        .resolve_affected()?;
        Ok(())
    }

    pub async fn oldest_unclaimed_id(&mut self) -> DataBaseResult<Option<i64>> {
        query_scalar::<_, i64>(
            // language=sql
            "SELECT id FROM invites WHERE status = ? ORDER BY id LIMIT 1",
        )
        .bind(InviteStatus::Unclaimed)
        .fetch_optional(&mut *self.inner)
        .await
        .resolve()
    }

    /// Moves `id` from `none` to `pending` only if nobody else got there first.
    /// `Ok(None)` means the row was claimed concurrently.
    pub async fn try_claim(&mut self, id: i64) -> DataBaseResult<Option<InviteRaw>> {
        let res = query_as::<_, InviteRaw>(
            // language=sql
            r#"
                UPDATE invites
                SET status = ?, update_date = ?
                WHERE id = ? AND status = ?
                RETURNING id, secret, signer, status, update_date
            "#,
        )
        .bind(InviteStatus::Pending)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(InviteStatus::Unclaimed)
        .fetch_one(&mut *self.inner)
        .await
        .resolve();
        match res {
            Ok(invite) => Ok(Some(invite)),
            Err(DataBaseError::RowNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Selects the oldest `none` invite and claims it, reselecting whenever the
    /// conditional update loses a race.
    pub async fn select_next_available(&mut self) -> DataBaseResult<Option<InviteRaw>> {
        while let Some(id) = self.oldest_unclaimed_id().await? {
            match self.try_claim(id).await? {
                Some(invite) => return Ok(Some(invite)),
                None => tracing::debug!("Invite {id} claimed concurrently, reselecting"),
            }
        }
        Ok(None)
    }

    pub async fn oldest_pending(&mut self) -> DataBaseResult<Option<InviteRaw>> {
        query_as::<_, InviteRaw>(
            // language=sql
            r#"
                SELECT id, secret, signer, status, update_date
                FROM invites
                WHERE status = ?
                ORDER BY update_date, id
                LIMIT 1
            "#,
        )
        .bind(InviteStatus::Pending)
        .fetch_optional(&mut *self.inner)
        .await
        .resolve()
    }

    pub async fn count_all(&mut self) -> DataBaseResult<i64> {
        query_scalar::<_, i64>(
            // language=sql
            "SELECT COUNT(*) FROM invites",
        )
        .fetch_one(&mut *self.inner)
        .await
        .resolve()
    }

    pub async fn count_by_status(&mut self, status: InviteStatus) -> DataBaseResult<i64> {
        query_scalar::<_, i64>(
            // language=sql
            "SELECT COUNT(*) FROM invites WHERE status = ?",
        )
        .bind(status)
        .fetch_one(&mut *self.inner)
        .await
        .resolve()
    }
}
