mod invite;

pub use crate::services::states::db::invite::InviteRepo;
use invitee_macros::InviteeBusinessError;
use sqlx::sqlite::SqliteQueryResult;
use sqlx::{Acquire, Executor, Pool, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;

#[derive(Debug, thiserror::Error, InviteeBusinessError)]
pub enum DataBaseError {
    #[code(1001)]
    #[error("Row not found!")]
    RowNotFound,
    #[code(1002)]
    #[error("No affected rows!")]
    NoAffectedRows,
    #[code(1003)]
    #[error("Unique violation error! code: {code:?}, msg: {msg}")]
    UniqueViolation { code: Option<String>, msg: String },
    #[code(1004)]
    #[error("Check violation error! code: {code:?}, msg: {msg}")]
    CheckViolation { code: Option<String>, msg: String },
    #[error("sqlx error: {0}")]
    SqlxOther(#[from] sqlx::Error),
}

pub trait SqliteBaseResultExt<T> {
    fn resolve(self) -> DataBaseResult<T>;
}

impl<T> SqliteBaseResultExt<T> for Result<T, sqlx::Error> {
    fn resolve(self) -> DataBaseResult<T> {
        match self {
            Ok(result) => Ok(result),
            Err(sqlx::Error::RowNotFound) => Err(DataBaseError::RowNotFound),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DataBaseError::UniqueViolation {
                    code: e.code().map(|c| c.to_string()),
                    msg: e.message().to_string(),
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_check_violation() => {
                Err(DataBaseError::CheckViolation {
                    code: e.code().map(|c| c.to_string()),
                    msg: e.message().to_string(),
                })
            }
            Err(e) => Err(DataBaseError::SqlxOther(e)),
        }
    }
}

pub trait SqliteQueryResultExt {
    fn resolve_affected(self) -> DataBaseResult<SqliteQueryResult>;
}

impl SqliteQueryResultExt for Result<SqliteQueryResult, sqlx::Error> {
    fn resolve_affected(self) -> DataBaseResult<SqliteQueryResult> {
        match self {
            Ok(res) if res.rows_affected() == 0 => Err(DataBaseError::NoAffectedRows),
            other => other.resolve(),
        }
    }
}

pub type DataBaseResult<T> = Result<T, DataBaseError>;

pub struct DataBaseExecutor<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    inner: &'a mut E,
}

impl<'a, E> DataBaseExecutor<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    #[inline]
    pub fn invites(&mut self) -> InviteRepo<'_, E> {
        InviteRepo {
            inner: &mut *self.inner,
        }
    }
}

pub type InviteeDatabaseExecutor<'a> = DataBaseExecutor<'a, SqliteConnection>;

#[derive(Clone)]
pub struct DataBaseState {
    pool: Arc<Pool<Sqlite>>,
}

impl DataBaseState {
    pub async fn single<F, R, E>(&self, f: F) -> Result<R, E>
    where
        for<'q> F: AsyncFnOnce(InviteeDatabaseExecutor<'q>) -> Result<R, E> + Send,
        R: Send,
        E: Send + From<DataBaseError>,
    {
        let mut conn = self.pool.acquire().await.resolve()?;
        let exec = DataBaseExecutor { inner: &mut *conn };
        f(exec).await
    }

    pub async fn transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        for<'q> F: AsyncFnOnce(InviteeDatabaseExecutor<'q>) -> Result<R, E> + Send,
        R: Send,
        E: Send + From<DataBaseError>,
    {
        let mut conn = self.pool.acquire().await.resolve()?;
        let mut tx = conn.begin().await.resolve()?;
        let exec = DataBaseExecutor { inner: &mut *tx };
        let out = f(exec).await;
        match out {
            Ok(val) => {
                tx.commit().await.resolve()?;
                Ok(val)
            }
            Err(err) => {
                tx.rollback().await.resolve()?;
                Err(err)
            }
        }
    }
}

impl DataBaseState {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn close_conn(&self) {
        self.pool.close().await;
    }
}
