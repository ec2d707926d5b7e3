use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use surrealdb::engine::local::{Db, File, Mem};
use surrealdb::Surreal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    common::{PaginatedResponse, PaginationQuery},
    course::Course,
    payment::{Payment, PaymentListQuery, PaymentStatus},
    user::User,
};

type UserLocks = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Db>,
    user_locks: UserLocks,
}

impl DatabaseService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = if database_url.starts_with("memory://") {
            Surreal::new::<Mem>(()).await?
        } else if let Some(path) = database_url.strip_prefix("file://") {
            Surreal::new::<File>(path).await?
        } else {
            return Err(anyhow!("Unsupported database URL: {}", database_url));
        };

        db.use_ns("lms").use_db("main").await?;

        let service = Self {
            db,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db
            .query(
                "
            DEFINE TABLE users SCHEMALESS;
            DEFINE INDEX unique_user_id ON users COLUMNS user_id UNIQUE;
            DEFINE INDEX unique_email ON users COLUMNS email UNIQUE;

            DEFINE TABLE payments SCHEMALESS;
            DEFINE INDEX unique_payment_id ON payments COLUMNS payment_id UNIQUE;

            DEFINE TABLE courses SCHEMALESS;
            DEFINE INDEX unique_course_id ON courses COLUMNS course_id UNIQUE;
        ",
            )
            .await?
            .check()?;

        log::info!("Database schema initialized");
        Ok(())
    }

    /// Serialization point for subscription mutations: all orchestrator
    /// operations on the same user queue behind this lock.
    pub async fn lock_user(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.user_locks.lock().await;
            // An entry whose Arc is only held by the map has no guard or
            // waiter outstanding, so it can be dropped; this keeps the map
            // bounded by the number of in-flight operations.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Starts a staged transaction for one user. Holds the per-user lock for
    /// its whole lifetime; staged statements are applied atomically on
    /// `commit`, and dropping the value without committing applies nothing.
    pub async fn begin_user_txn(&self, user_id: Uuid) -> UserTxn<'_> {
        let guard = self.lock_user(user_id).await;
        UserTxn {
            db: self,
            _guard: guard,
            statements: Vec::new(),
            binds: Vec::new(),
        }
    }

    // User operations

    pub async fn create_user(&self, user: &User) -> Result<User> {
        let mut created: Vec<User> = self
            .db
            .query("CREATE users CONTENT $data")
            .bind(("data", user))
            .await?
            .take(0)?;

        created
            .pop()
            .ok_or_else(|| anyhow!("Failed to create user"))
    }

    pub async fn get_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let user: Option<User> = self
            .db
            .query("SELECT * FROM users WHERE user_id = $user_id")
            .bind(("user_id", user_id))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user: Option<User> = self
            .db
            .query("SELECT * FROM users WHERE email = $email")
            .bind(("email", email.to_lowercase()))
            .await?
            .take(0)?;
        Ok(user)
    }

    // Profile mutations are targeted SET statements on purpose: writing a
    // whole read-modify-write snapshot back would race the orchestrator and
    // could revert `subscription`, which only the orchestrator owns.

    pub async fn update_user_name(&self, user_id: Uuid, name: &str) -> Result<Option<User>> {
        let mut updated: Vec<User> = self
            .db
            .query("UPDATE users SET name = $name, updated_at = $now WHERE user_id = $user_id")
            .bind(("name", name))
            .bind(("now", chrono::Utc::now()))
            .bind(("user_id", user_id))
            .await?
            .take(0)?;
        Ok(updated.pop())
    }

    pub async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>> {
        let mut updated: Vec<User> = self
            .db
            .query(
                "UPDATE users SET password_hash = $password_hash, updated_at = $now \
                 WHERE user_id = $user_id",
            )
            .bind(("password_hash", password_hash))
            .bind(("now", chrono::Utc::now()))
            .bind(("user_id", user_id))
            .await?
            .take(0)?;
        Ok(updated.pop())
    }

    pub async fn count_users(&self) -> Result<u64> {
        let rows: Vec<serde_json::Value> = self
            .db
            .query("SELECT count() FROM users GROUP ALL")
            .await?
            .take(0)?;
        Ok(extract_count(&rows))
    }

    pub async fn count_subscribed_users(&self) -> Result<u64> {
        let rows: Vec<serde_json::Value> = self
            .db
            .query("SELECT count() FROM users WHERE subscription.status = 'active' GROUP ALL")
            .await?
            .take(0)?;
        Ok(extract_count(&rows))
    }

    // Payment operations

    pub async fn get_payment(&self, payment_id: &Uuid) -> Result<Option<Payment>> {
        let payment: Option<Payment> = self
            .db
            .query("SELECT * FROM payments WHERE payment_id = $payment_id")
            .bind(("payment_id", payment_id))
            .await?
            .take(0)?;
        Ok(payment)
    }

    /// Newest completed payment for a provider subscription, i.e. the one a
    /// refund would apply to.
    pub async fn latest_completed_payment(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Payment>> {
        let payment: Option<Payment> = self
            .db
            .query(
                "SELECT * FROM payments \
                 WHERE provider_subscription_id = $sub_id AND status = 'completed' \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("sub_id", provider_subscription_id))
            .await?
            .take(0)?;
        Ok(payment)
    }

    pub async fn list_payments(&self, query: &PaymentListQuery) -> Result<PaginatedResponse<Payment>> {
        let pagination = PaginationQuery {
            page: query.page,
            limit: query.limit,
        };

        let filter = match query.status {
            Some(PaymentStatus::Completed) => "WHERE status = 'completed'",
            Some(PaymentStatus::Refunded) => "WHERE status = 'refunded'",
            None => "",
        };

        let rows: Vec<serde_json::Value> = self
            .db
            .query(format!("SELECT count() FROM payments {filter} GROUP ALL"))
            .await?
            .take(0)?;
        let total = extract_count(&rows) as u32;

        let payments: Vec<Payment> = self
            .db
            .query(format!(
                "SELECT * FROM payments {filter} ORDER BY created_at DESC \
                 LIMIT $limit START $offset"
            ))
            .bind(("limit", pagination.limit()))
            .bind(("offset", pagination.offset()))
            .await?
            .take(0)?;

        Ok(PaginatedResponse::new(payments, total, &pagination))
    }

    // Course operations

    pub async fn create_course(&self, course: &Course) -> Result<Course> {
        let mut created: Vec<Course> = self
            .db
            .query("CREATE courses CONTENT $data")
            .bind(("data", course))
            .await?
            .take(0)?;

        created
            .pop()
            .ok_or_else(|| anyhow!("Failed to create course"))
    }

    pub async fn get_course(&self, course_id: &Uuid) -> Result<Option<Course>> {
        let course: Option<Course> = self
            .db
            .query("SELECT * FROM courses WHERE course_id = $course_id")
            .bind(("course_id", course_id))
            .await?
            .take(0)?;
        Ok(course)
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        let courses: Vec<Course> = self
            .db
            .query("SELECT * FROM courses ORDER BY created_at DESC")
            .await?
            .take(0)?;
        Ok(courses)
    }

    pub async fn update_course(&self, course: &Course) -> Result<Course> {
        let mut updated: Vec<Course> = self
            .db
            .query("UPDATE courses MERGE $data WHERE course_id = $course_id")
            .bind(("data", course))
            .bind(("course_id", course.id))
            .await?
            .take(0)?;

        updated
            .pop()
            .ok_or_else(|| anyhow!("Failed to update course"))
    }

    pub async fn delete_course(&self, course_id: &Uuid) -> Result<()> {
        self.db
            .query("DELETE FROM courses WHERE course_id = $course_id")
            .bind(("course_id", course_id))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}

/// Staged mutations for a single user, applied atomically in one
/// `BEGIN/COMMIT TRANSACTION` script. Nothing touches the database until
/// `commit`; dropping the value aborts with no side effects. The per-user
/// lock held by this value serializes concurrent subscription operations on
/// the same user.
pub struct UserTxn<'a> {
    db: &'a DatabaseService,
    _guard: OwnedMutexGuard<()>,
    statements: Vec<String>,
    binds: Vec<(String, serde_json::Value)>,
}

impl UserTxn<'_> {
    pub fn stage(&mut self, statement: &str) {
        let statement = statement.trim_end();
        if statement.ends_with(';') {
            self.statements.push(statement.to_string());
        } else {
            self.statements.push(format!("{statement};"));
        }
    }

    pub fn bind<T: Serialize>(&mut self, name: &str, value: T) -> Result<()> {
        self.binds
            .push((name.to_string(), serde_json::to_value(value)?));
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        if self.statements.is_empty() {
            return Ok(());
        }

        let script = format!(
            "BEGIN TRANSACTION;\n{}\nCOMMIT TRANSACTION;",
            self.statements.join("\n")
        );

        let mut query = self.db.db.query(script);
        for (name, value) in self.binds {
            query = query.bind((name, value));
        }

        query.await?.check()?;
        Ok(())
    }
}

fn extract_count(rows: &[serde_json::Value]) -> u64 {
    rows.first()
        .and_then(|v| v.get("count"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::course::{AddLectureRequest, CreateCourseRequest};
    use crate::models::user::{SubscriptionInfo, SubscriptionStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;

    async fn memory_db() -> DatabaseService {
        DatabaseService::new("memory://").await.unwrap()
    }

    fn sample_user(email: &str) -> User {
        User::new("Test User".to_string(), email.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn test_user_operations() {
        let db = memory_db().await;

        let user = db.create_user(&sample_user("john@example.com")).await.unwrap();
        assert_eq!(user.email, "john@example.com");

        let by_id = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Test User");

        let by_email = db.get_user_by_email("JOHN@example.com").await.unwrap();
        assert!(by_email.is_some());

        let stored = db.update_user_name(user.id, "Renamed").await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");

        let stored = db
            .update_user_password(user.id, "new-hash")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.password_hash.as_deref(), Some("new-hash"));

        // Unknown users update nothing.
        assert!(db
            .update_user_name(Uuid::new_v4(), "Ghost")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_profile_updates_do_not_touch_subscription() {
        let db = memory_db().await;

        let mut user = sample_user("state@example.com");
        user.subscription = SubscriptionInfo {
            id: Some("sub_123".to_string()),
            status: SubscriptionStatus::Active,
            ..Default::default()
        };
        db.create_user(&user).await.unwrap();

        db.update_user_name(user.id, "Renamed").await.unwrap();
        db.update_user_password(user.id, "new-hash").await.unwrap();

        let stored = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.subscription.status, SubscriptionStatus::Active);
        assert_eq!(stored.subscription.id.as_deref(), Some("sub_123"));
    }

    #[tokio::test]
    async fn test_idle_user_locks_are_pruned() {
        let db = memory_db().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        drop(db.lock_user(first).await);
        let guard = db.lock_user(second).await;
        assert_eq!(db.user_locks.lock().await.len(), 1);

        drop(guard);
        drop(db.lock_user(first).await);
        assert_eq!(db.user_locks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = memory_db().await;
        db.create_user(&sample_user("dup@example.com")).await.unwrap();
        assert!(db.create_user(&sample_user("dup@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_counts() {
        let db = memory_db().await;

        let mut active = sample_user("active@example.com");
        active.subscription = SubscriptionInfo {
            id: Some("sub_123".to_string()),
            status: SubscriptionStatus::Active,
            ..Default::default()
        };
        db.create_user(&active).await.unwrap();
        db.create_user(&sample_user("free@example.com")).await.unwrap();

        assert_eq!(db.count_users().await.unwrap(), 2);
        assert_eq!(db.count_subscribed_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_staged_txn_commit_and_abort() {
        let db = memory_db().await;
        let user = db.create_user(&sample_user("txn@example.com")).await.unwrap();

        let payment = Payment::completed(
            user.id,
            "pay_1".to_string(),
            "sub_123".to_string(),
            "sig".to_string(),
            Decimal::new(49900, 2),
            "INR".to_string(),
        );

        // Dropped without commit: nothing applied.
        {
            let mut txn = db.begin_user_txn(user.id).await;
            txn.stage("CREATE payments CONTENT $payment");
            txn.bind("payment", &payment).unwrap();
        }
        assert!(db.get_payment(&payment.id).await.unwrap().is_none());

        // Committed: both statements applied together.
        let mut txn = db.begin_user_txn(user.id).await;
        txn.stage("CREATE payments CONTENT $payment");
        txn.stage(
            "UPDATE users SET subscription.status = 'active', updated_at = $now \
             WHERE user_id = $user_id",
        );
        txn.bind("payment", &payment).unwrap();
        txn.bind("now", Utc::now()).unwrap();
        txn.bind("user_id", user.id).unwrap();
        txn.commit().await.unwrap();

        assert!(db.get_payment(&payment.id).await.unwrap().is_some());
        let stored = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.subscription.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_latest_completed_payment_ordering() {
        let db = memory_db().await;
        let user = db.create_user(&sample_user("pay@example.com")).await.unwrap();

        let mut older = Payment::completed(
            user.id,
            "pay_old".to_string(),
            "sub_123".to_string(),
            "sig".to_string(),
            Decimal::new(49900, 2),
            "INR".to_string(),
        );
        older.created_at = Utc::now() - chrono::Duration::days(30);
        let newer = Payment::completed(
            user.id,
            "pay_new".to_string(),
            "sub_123".to_string(),
            "sig".to_string(),
            Decimal::new(49900, 2),
            "INR".to_string(),
        );

        for payment in [&older, &newer] {
            let mut txn = db.begin_user_txn(user.id).await;
            txn.stage("CREATE payments CONTENT $payment");
            txn.bind("payment", payment).unwrap();
            txn.commit().await.unwrap();
        }

        let latest = db.latest_completed_payment("sub_123").await.unwrap().unwrap();
        assert_eq!(latest.provider_payment_id, "pay_new");

        assert!(db
            .latest_completed_payment("sub_other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_course_operations() {
        let db = memory_db().await;
        let admin = db.create_user(&sample_user("admin@example.com")).await.unwrap();

        let mut course = Course::new(
            CreateCourseRequest {
                title: "Intro to Rust".to_string(),
                description: "Ownership, borrowing and the rest".to_string(),
                category: "Programming".to_string(),
                thumbnail_url: None,
            },
            admin.id,
        );
        db.create_course(&course).await.unwrap();

        course.add_lecture(AddLectureRequest {
            title: "Lesson one".to_string(),
            description: "Variables and bindings".to_string(),
            video_url: "https://cdn.example.com/videos/1.mp4".to_string(),
        });
        db.update_course(&course).await.unwrap();

        let stored = db.get_course(&course.id).await.unwrap().unwrap();
        assert_eq!(stored.lectures.len(), 1);
        assert_eq!(db.list_courses().await.unwrap().len(), 1);

        db.delete_course(&course.id).await.unwrap();
        assert!(db.get_course(&course.id).await.unwrap().is_none());
    }
}
