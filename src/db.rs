use std::str::FromStr;

use crate::models::{List, NewUser, Task, User};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// How long a login stays valid, as an SQLite `datetime` modifier.
pub const SESSION_MAX_AGE: &str = "-30 days";

/// True when the error came from a `UNIQUE` constraint, e.g. a taken email.
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Db { pool })
    }

    /// Private in-memory database. The pool keeps exactly one connection alive,
    /// since every new SQLite memory connection would start out empty.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Db { pool })
    }

    /// Stores the user and their first list in one transaction.
    pub async fn register_user(&self, user: &NewUser, list_name: &str) -> anyhow::Result<User> {
        let mut tx = self.pool.begin().await?;

        let user_id = sqlx::query("INSERT INTO users (name, email, password) VALUES (?, ?, ?)")
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        sqlx::query("INSERT INTO lists (name_of_list, user_id) VALUES (?, ?)")
            .bind(list_name)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(User {
            id: user_id,
            name: user.name.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
        })
    }

    pub async fn find_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Stores a new session and prunes every expired one.
    pub async fn create_session(&self, token: &str, user_id: i64) -> anyhow::Result<()> {
        let expired = sqlx::query("DELETE FROM sessions WHERE created_at <= datetime('now', ?)")
            .bind(SESSION_MAX_AGE)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if expired > 0 {
            tracing::debug!(expired, "pruned expired sessions");
        }

        sqlx::query("INSERT INTO sessions (token, user_id) VALUES (?, ?)")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn find_session_user(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT users.id, users.name, users.email, users.password
             FROM sessions JOIN users ON users.id = sessions.user_id
             WHERE sessions.token = ? AND sessions.created_at > datetime('now', ?)",
        )
        .bind(token)
        .bind(SESSION_MAX_AGE)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn current_list(&self, user_id: i64) -> anyhow::Result<Option<List>> {
        let list = sqlx::query_as::<_, List>(
            "SELECT id, name_of_list, user_id FROM lists WHERE user_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(list)
    }

    /// Returns the user's list, creating one labelled `list_name` if they have none.
    pub async fn ensure_current_list(&self, user_id: i64, list_name: &str) -> anyhow::Result<List> {
        if let Some(list) = self.current_list(user_id).await? {
            return Ok(list);
        }

        let id = sqlx::query("INSERT INTO lists (name_of_list, user_id) VALUES (?, ?)")
            .bind(list_name)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(List {
            id,
            name_of_list: Some(list_name.to_string()),
            user_id,
        })
    }

    /// Replaces the user's lists and all their tasks with one empty list.
    /// Runs as a single transaction, so a failure leaves the old list intact.
    pub async fn roll_over_list(&self, user_id: i64, list_name: &str) -> anyhow::Result<List> {
        let mut tx = self.pool.begin().await?;

        let removed_tasks = sqlx::query(
            "DELETE FROM tasks WHERE list_id IN (SELECT id FROM lists WHERE user_id = ?)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM lists WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let id = sqlx::query("INSERT INTO lists (name_of_list, user_id) VALUES (?, ?)")
            .bind(list_name)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        tx.commit().await?;

        tracing::debug!(user_id, removed_tasks, list_id = id, "rolled over list");

        Ok(List {
            id,
            name_of_list: Some(list_name.to_string()),
            user_id,
        })
    }

    pub async fn create_task(
        &self,
        description: &str,
        user_id: i64,
        list_id: i64,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO tasks (description, is_done, star, user_id, list_id) VALUES (?, 0, 0, ?, ?)",
        )
        .bind(description)
        .bind(user_id)
        .bind(list_id)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_task(&self, task_id: i64) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            "SELECT id, description, is_done, star, user_id, list_id FROM tasks WHERE id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    /// Starred tasks oldest first, followed by the rest newest first.
    pub async fn tasks_for_user(&self, user_id: i64) -> anyhow::Result<Vec<Task>> {
        let mut tasks = sqlx::query_as::<_, Task>(
            "SELECT id, description, is_done, star, user_id, list_id
             FROM tasks WHERE user_id = ? AND star = 1 ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let unstarred = sqlx::query_as::<_, Task>(
            "SELECT id, description, is_done, star, user_id, list_id
             FROM tasks WHERE user_id = ? AND star = 0 ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        tasks.extend(unstarred);

        Ok(tasks)
    }

    pub async fn set_task_done(&self, task_id: i64, is_done: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE tasks SET is_done = ? WHERE id = ?")
            .bind(is_done)
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_task_star(&self, task_id: i64, star: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE tasks SET star = ? WHERE id = ?")
            .bind(star)
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_task(&self, task_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    async fn db_with_user(email: &str) -> (Db, User) {
        let db = Db::in_memory().await.unwrap();
        let user = db
            .register_user(
                &NewUser {
                    name: "Ada".to_string(),
                    email: email.to_string(),
                    password: "hash".to_string(),
                },
                "2024-05-01",
            )
            .await
            .unwrap();
        (db, user)
    }

    #[rstest]
    #[tokio::test]
    async fn register_user_creates_first_list() {
        let (db, user) = db_with_user("ada@example.com").await;

        let list = db.current_list(user.id).await.unwrap().unwrap();
        assert_eq!(list.user_id, user.id);
        assert_eq!(list.name_of_list.as_deref(), Some("2024-05-01"));

        let found = db.find_user_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (db, _) = db_with_user("ada@example.com").await;

        let second = db
            .register_user(
                &NewUser {
                    name: "Other".to_string(),
                    email: "ada@example.com".to_string(),
                    password: "hash".to_string(),
                },
                "2024-05-01",
            )
            .await;

        assert!(is_unique_violation(&second.unwrap_err()));
    }

    #[rstest]
    fn other_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&anyhow::anyhow!("disk full")));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound.into()));
    }

    #[rstest]
    #[tokio::test]
    async fn starred_tasks_come_first_then_newest_unstarred() {
        let (db, user) = db_with_user("ada@example.com").await;
        let list = db.current_list(user.id).await.unwrap().unwrap();

        let a = db.create_task("A", user.id, list.id).await.unwrap();
        let b = db.create_task("B", user.id, list.id).await.unwrap();
        let c = db.create_task("C", user.id, list.id).await.unwrap();
        db.set_task_star(a, true).await.unwrap();

        let order: Vec<i64> = db
            .tasks_for_user(user.id)
            .await
            .unwrap()
            .iter()
            .map(|task| task.id)
            .collect();

        assert_eq!(order, vec![a, c, b]);
    }

    #[rstest]
    #[tokio::test]
    async fn new_task_starts_undone_and_unstarred() {
        let (db, user) = db_with_user("ada@example.com").await;
        let list = db.current_list(user.id).await.unwrap().unwrap();

        let id = db.create_task("write report", user.id, list.id).await.unwrap();
        let task = db.find_task(id).await.unwrap().unwrap();

        assert_eq!(task.description, "write report");
        assert!(!task.is_done);
        assert!(!task.star);
        assert_eq!(task.user_id, user.id);
        assert_eq!(task.list_id, list.id);
    }

    #[rstest]
    #[tokio::test]
    async fn flag_updates_touch_only_their_column() {
        let (db, user) = db_with_user("ada@example.com").await;
        let list = db.current_list(user.id).await.unwrap().unwrap();
        let id = db.create_task("water plants", user.id, list.id).await.unwrap();

        db.set_task_done(id, true).await.unwrap();
        let task = db.find_task(id).await.unwrap().unwrap();
        assert!(task.is_done);
        assert!(!task.star);
        assert_eq!(task.description, "water plants");

        db.set_task_star(id, true).await.unwrap();
        let task = db.find_task(id).await.unwrap().unwrap();
        assert!(task.is_done);
        assert!(task.star);
    }

    #[rstest]
    #[tokio::test]
    async fn roll_over_list_replaces_list_and_drops_tasks() {
        let (db, user) = db_with_user("ada@example.com").await;
        let old = db.current_list(user.id).await.unwrap().unwrap();
        let task = db.create_task("old task", user.id, old.id).await.unwrap();

        let new = db.roll_over_list(user.id, "2024-05-02").await.unwrap();

        assert_ne!(new.id, old.id);
        assert!(db.find_task(task).await.unwrap().is_none());
        assert!(db.tasks_for_user(user.id).await.unwrap().is_empty());

        let current = db.current_list(user.id).await.unwrap().unwrap();
        assert_eq!(current.id, new.id);
        assert_eq!(current.name_of_list.as_deref(), Some("2024-05-02"));
    }

    #[rstest]
    #[tokio::test]
    async fn roll_over_list_deletes_the_old_list_row() {
        let (db, user) = db_with_user("ada@example.com").await;
        let old = db.current_list(user.id).await.unwrap().unwrap();

        db.roll_over_list(user.id, "2024-05-02").await.unwrap();

        let (lists,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lists WHERE user_id = ?")
            .bind(user.id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(lists, 1);

        let (old_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lists WHERE id = ?")
            .bind(old.id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(old_rows, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn roll_over_leaves_other_users_alone() {
        let (db, ada) = db_with_user("ada@example.com").await;
        let bob = db
            .register_user(
                &NewUser {
                    name: "Bob".to_string(),
                    email: "bob@example.com".to_string(),
                    password: "hash".to_string(),
                },
                "2024-05-01",
            )
            .await
            .unwrap();
        let bob_list = db.current_list(bob.id).await.unwrap().unwrap();
        let bob_task = db.create_task("bob's", bob.id, bob_list.id).await.unwrap();

        db.roll_over_list(ada.id, "2024-05-02").await.unwrap();

        assert!(db.find_task(bob_task).await.unwrap().is_some());
        assert_eq!(db.current_list(bob.id).await.unwrap().unwrap().id, bob_list.id);
    }

    #[rstest]
    #[tokio::test]
    async fn ensure_current_list_recreates_missing_list() {
        let (db, user) = db_with_user("ada@example.com").await;
        sqlx::query("DELETE FROM lists WHERE user_id = ?")
            .bind(user.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let list = db.ensure_current_list(user.id, "2024-06-01").await.unwrap();

        assert_eq!(list.name_of_list.as_deref(), Some("2024-06-01"));
        assert_eq!(db.current_list(user.id).await.unwrap().unwrap().id, list.id);
    }

    #[rstest]
    #[tokio::test]
    async fn sessions_resolve_to_their_user_until_deleted() {
        let (db, user) = db_with_user("ada@example.com").await;

        db.create_session("token-1", user.id).await.unwrap();
        let found = db.find_session_user("token-1").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        db.delete_session("token-1").await.unwrap();
        assert!(db.find_session_user("token-1").await.unwrap().is_none());
    }

    async fn backdate_session(db: &Db, token: &str) {
        sqlx::query("UPDATE sessions SET created_at = '2000-01-01 00:00:00' WHERE token = ?")
            .bind(token)
            .execute(&db.pool)
            .await
            .unwrap();
    }

    #[rstest]
    #[tokio::test]
    async fn expired_session_no_longer_resolves() {
        let (db, user) = db_with_user("ada@example.com").await;
        db.create_session("old-token", user.id).await.unwrap();
        backdate_session(&db, "old-token").await;

        assert!(db.find_session_user("old-token").await.unwrap().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn new_session_prunes_expired_rows() {
        let (db, user) = db_with_user("ada@example.com").await;
        db.create_session("old-token", user.id).await.unwrap();
        backdate_session(&db, "old-token").await;

        db.create_session("new-token", user.id).await.unwrap();

        let tokens: Vec<(String,)> = sqlx::query_as("SELECT token FROM sessions")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(tokens, vec![("new-token".to_string(),)]);
        assert!(db.find_session_user("new-token").await.unwrap().is_some());
    }
}
