//! Persistence adapter.
//!
//! Each aggregate is one SQLite row holding a JSON document, so every
//! mutation of a course (including remedial-node splices) is a single atomic
//! statement, and artifacts that must never duplicate (quizzes, exams,
//! lesson content, progress records) are keyed upserts that converge under
//! concurrent calls. Progress-record creation races resolve by
//! upsert-then-refetch, not locking. Mapping only: no engine logic here.

use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::course::Course;
use crate::course::content::SubmoduleContent;
use crate::course::quiz::Assessment;
use crate::engine::progress::{ModuleProgress, SubmoduleProgress};
use crate::error::Result;
use crate::utils::now_utc;

const TABLES: &[&str] = &[
    "submodule_quiz",
    "module_exam",
    "submodule_content",
    "submodule_progress",
    "module_progress",
];

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Single-connection in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS course (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                doc TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        for table in TABLES {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    course_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    doc TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (course_id, node_id)
                )"
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // -- course aggregate ---------------------------------------------------

    pub async fn load_course(&self, course_id: &str) -> Result<Option<Course>> {
        let doc: Option<String> =
            sqlx::query_scalar("SELECT doc FROM course WHERE id = ?")
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Whole-document write; the one atomic primitive every course mutation
    /// (unlocks, remedial splices, pointer moves) goes through.
    pub async fn save_course(&self, course: &Course) -> Result<()> {
        sqlx::query(
            "INSERT INTO course (id, user_id, doc, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at",
        )
        .bind(&course.id)
        .bind(&course.user_id)
        .bind(serde_json::to_string(course)?)
        .bind(now_utc().unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deep composition: deleting a course removes everything keyed to it,
    /// progress records included.
    pub async fn delete_course(&self, course_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM course WHERE id = ?")
            .bind(course_id)
            .execute(&self.pool)
            .await?;
        for table in TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE course_id = ?"))
                .bind(course_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    // -- keyed documents ----------------------------------------------------

    async fn get_doc<T: DeserializeOwned>(
        &self,
        table: &str,
        course_id: &str,
        node_id: &str,
    ) -> Result<Option<T>> {
        let doc: Option<String> = sqlx::query_scalar(&format!(
            "SELECT doc FROM {table} WHERE course_id = ? AND node_id = ?"
        ))
        .bind(course_id)
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    async fn upsert_doc<T: Serialize>(
        &self,
        table: &str,
        course_id: &str,
        node_id: &str,
        doc: &T,
    ) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {table} (course_id, node_id, doc, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(course_id, node_id) DO UPDATE
             SET doc = excluded.doc, updated_at = excluded.updated_at"
        ))
        .bind(course_id)
        .bind(node_id)
        .bind(serde_json::to_string(doc)?)
        .bind(now_utc().unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert-if-absent, then read back whatever won the race.
    async fn ensure_doc<T: Serialize + DeserializeOwned>(
        &self,
        table: &str,
        course_id: &str,
        node_id: &str,
        fresh: T,
    ) -> Result<T> {
        sqlx::query(&format!(
            "INSERT INTO {table} (course_id, node_id, doc, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(course_id, node_id) DO NOTHING"
        ))
        .bind(course_id)
        .bind(node_id)
        .bind(serde_json::to_string(&fresh)?)
        .bind(now_utc().unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(self
            .get_doc(table, course_id, node_id)
            .await?
            .unwrap_or(fresh))
    }

    pub async fn quiz(&self, course_id: &str, sub_module_id: &str) -> Result<Option<Assessment>> {
        self.get_doc("submodule_quiz", course_id, sub_module_id).await
    }

    pub async fn upsert_quiz(
        &self,
        course_id: &str,
        sub_module_id: &str,
        quiz: &Assessment,
    ) -> Result<()> {
        self.upsert_doc("submodule_quiz", course_id, sub_module_id, quiz)
            .await
    }

    pub async fn exam(&self, course_id: &str, module_id: &str) -> Result<Option<Assessment>> {
        self.get_doc("module_exam", course_id, module_id).await
    }

    pub async fn upsert_exam(
        &self,
        course_id: &str,
        module_id: &str,
        exam: &Assessment,
    ) -> Result<()> {
        self.upsert_doc("module_exam", course_id, module_id, exam).await
    }

    pub async fn content(
        &self,
        course_id: &str,
        sub_module_id: &str,
    ) -> Result<Option<SubmoduleContent>> {
        self.get_doc("submodule_content", course_id, sub_module_id).await
    }

    pub async fn upsert_content(&self, content: &SubmoduleContent) -> Result<()> {
        self.upsert_doc(
            "submodule_content",
            &content.course_id,
            &content.sub_module_id,
            content,
        )
        .await
    }

    // -- progress records ---------------------------------------------------

    pub async fn submodule_progress(
        &self,
        course_id: &str,
        sub_module_id: &str,
    ) -> Result<Option<SubmoduleProgress>> {
        self.get_doc("submodule_progress", course_id, sub_module_id).await
    }

    pub async fn ensure_submodule_progress(
        &self,
        user_id: &str,
        course_id: &str,
        module_id: &str,
        sub_module_id: &str,
    ) -> Result<SubmoduleProgress> {
        self.ensure_doc(
            "submodule_progress",
            course_id,
            sub_module_id,
            SubmoduleProgress::new(user_id, course_id, module_id, sub_module_id),
        )
        .await
    }

    pub async fn save_submodule_progress(&self, progress: &SubmoduleProgress) -> Result<()> {
        self.upsert_doc(
            "submodule_progress",
            &progress.course_id,
            &progress.sub_module_id,
            progress,
        )
        .await
    }

    /// All submodule progress records for a course (module health check).
    pub async fn course_submodule_progress(
        &self,
        course_id: &str,
    ) -> Result<Vec<SubmoduleProgress>> {
        let docs: Vec<String> =
            sqlx::query_scalar("SELECT doc FROM submodule_progress WHERE course_id = ?")
                .bind(course_id)
                .fetch_all(&self.pool)
                .await?;
        docs.into_iter()
            .map(|d| Ok(serde_json::from_str(&d)?))
            .collect()
    }

    pub async fn module_progress(
        &self,
        course_id: &str,
        module_id: &str,
    ) -> Result<Option<ModuleProgress>> {
        self.get_doc("module_progress", course_id, module_id).await
    }

    pub async fn ensure_module_progress(
        &self,
        user_id: &str,
        course_id: &str,
        module_id: &str,
    ) -> Result<ModuleProgress> {
        self.ensure_doc(
            "module_progress",
            course_id,
            module_id,
            ModuleProgress::new(user_id, course_id, module_id),
        )
        .await
    }

    pub async fn save_module_progress(&self, progress: &ModuleProgress) -> Result<()> {
        self.upsert_doc(
            "module_progress",
            &progress.course_id,
            &progress.module_id,
            progress,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::outline_fixture;
    use crate::course::quiz::fallback_quiz;

    #[tokio::test]
    async fn course_round_trips_and_replaces_atomically() {
        let store = Store::in_memory().await.unwrap();
        let mut course = Course::from_outline("user-1", "Rust", "Beginner", outline_fixture());
        store.save_course(&course).await.unwrap();

        course.modules[0].sub_modules[0].unlock();
        store.save_course(&course).await.unwrap();

        let loaded = store.load_course(&course.id).await.unwrap().unwrap();
        assert!(!loaded.modules[0].sub_modules[0].locked);
        assert!(loaded.modules[0].sub_modules[1].locked);
    }

    #[tokio::test]
    async fn quiz_upsert_converges_to_one_document() {
        let store = Store::in_memory().await.unwrap();
        let first = fallback_quiz("Rust", "Ownership");
        let second = fallback_quiz("Rust", "Ownership v2");
        store.upsert_quiz("c1", "s1", &first).await.unwrap();
        store.upsert_quiz("c1", "s1", &second).await.unwrap();

        let stored = store.quiz("c1", "s1").await.unwrap().unwrap();
        assert_eq!(stored.title, "Quiz: Ownership v2");
        // a different key is untouched
        assert!(store.quiz("c1", "s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_progress_keeps_the_first_writer() {
        let store = Store::in_memory().await.unwrap();
        let mut progress = store
            .ensure_submodule_progress("user-1", "c1", "m1", "s1")
            .await
            .unwrap();
        progress.record_attempt(55.0, false, vec![], vec![], vec![]);
        store.save_submodule_progress(&progress).await.unwrap();

        // a second first-access must not reset the record
        let again = store
            .ensure_submodule_progress("user-1", "c1", "m1", "s1")
            .await
            .unwrap();
        assert_eq!(again.test_attempts, 1);
        assert_eq!(again.fail_count, 1);
    }

    #[tokio::test]
    async fn deleting_a_course_cascades() {
        let store = Store::in_memory().await.unwrap();
        let course = Course::from_outline("user-1", "Rust", "Beginner", outline_fixture());
        store.save_course(&course).await.unwrap();
        store
            .upsert_quiz(&course.id, "s1", &fallback_quiz("Rust", "Ownership"))
            .await
            .unwrap();
        store
            .ensure_submodule_progress("user-1", &course.id, "m1", "s1")
            .await
            .unwrap();

        store.delete_course(&course.id).await.unwrap();
        assert!(store.load_course(&course.id).await.unwrap().is_none());
        assert!(store.quiz(&course.id, "s1").await.unwrap().is_none());
        assert!(
            store
                .submodule_progress(&course.id, "s1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
