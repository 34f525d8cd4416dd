use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use civic_config::civic_dir;
use civic_core::{
    Category, Department, EmailContent, GeoPoint, Issue, NotificationMessage, Status, User,
};
use rusqlite::types::{Type, Value};
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params, params_from_iter,
};
use thiserror::Error;

pub const DATABASE_FILE_NAME: &str = "civic.sqlite";
const MAX_LIST_LIMIT: u32 = 1_000;

const ISSUE_COLUMNS: &str = "id, title, description, category, department, photo, lat, lng, \
    created_at, acknowledged_at, resolved_at, status, user_id, user_email, username, rating, feedback";
const USER_COLUMNS: &str = "id, username, email, password_hash, is_admin, department, \
    password_reset_token, password_reset_expires";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Filters for issue listings. Unset fields match everything; no limit
/// returns every match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    pub department: Option<Department>,
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub user_id: Option<String>,
    pub text: Option<String>,
    pub limit: Option<u32>,
}

impl IssueQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_department(department: Department) -> Self {
        Self {
            department: Some(department),
            ..Self::default()
        }
    }

    pub fn for_reporter(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }
}

pub trait Store {
    fn insert_issue(&self, issue: &Issue) -> Result<(), StoreError>;
    fn save_issue(&self, issue: &Issue) -> Result<(), StoreError>;
    fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>, StoreError>;
    fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, StoreError>;

    /// Reads, mutates and writes back one issue under a write lock, so
    /// concurrent callers see each other's changes. `Ok(None)` when the issue
    /// does not exist. An `Err` from `apply` discards the change; an issue
    /// left untouched by `apply` is not rewritten.
    fn modify_issue<T, E, F>(&self, issue_id: &str, apply: F) -> Result<Option<(Issue, T)>, E>
    where
        F: FnOnce(&mut Issue) -> Result<T, E>,
        E: From<StoreError>;

    fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    fn save_user(&self, user: &User) -> Result<(), StoreError>;
    fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    fn find_admin_by_department(&self, department: Department)
    -> Result<Option<User>, StoreError>;
    fn list_users(&self) -> Result<Vec<User>, StoreError>;

    fn push_notification(
        &self,
        user_id: &str,
        notification: &NotificationMessage,
    ) -> Result<(), StoreError>;
    fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationMessage>, StoreError>;
    fn mark_notifications_read(&self, user_id: &str) -> Result<usize, StoreError>;
    fn unread_notification_count(&self, user_id: &str) -> Result<usize, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
    civic_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let civic_dir = civic_dir(root);
        let sqlite_path = civic_dir.join(DATABASE_FILE_NAME);

        fs::create_dir_all(&civic_dir)?;

        let conn = Connection::open(&sqlite_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;
        tracing::trace!(path = %sqlite_path.display(), "opened civic store");

        Ok(Self { conn, civic_dir })
    }

    pub fn civic_dir(&self) -> &Path {
        &self.civic_dir
    }

    pub fn database_path(&self) -> PathBuf {
        self.civic_dir.join(DATABASE_FILE_NAME)
    }

    fn query_one_user(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1 LIMIT 1");
        let user = self
            .conn
            .query_row(&sql, params![value], user_from_row)
            .optional()?;
        Ok(user)
    }
}

impl Store for SqliteStore {
    fn insert_issue(&self, issue: &Issue) -> Result<(), StoreError> {
        if self.get_issue(&issue.id)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "issue '{}' already exists",
                issue.id
            )));
        }
        self.save_issue(issue)
    }

    fn save_issue(&self, issue: &Issue) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO issues (
                id, title, description, category, department, photo, lat, lng,
                created_at, acknowledged_at, resolved_at, status, user_id, user_email,
                username, rating, feedback
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                category = excluded.category,
                department = excluded.department,
                photo = excluded.photo,
                lat = excluded.lat,
                lng = excluded.lng,
                created_at = excluded.created_at,
                acknowledged_at = excluded.acknowledged_at,
                resolved_at = excluded.resolved_at,
                status = excluded.status,
                user_id = excluded.user_id,
                user_email = excluded.user_email,
                username = excluded.username,
                rating = excluded.rating,
                feedback = excluded.feedback
            "#,
            params![
                issue.id,
                issue.title,
                issue.description,
                issue.category.as_str(),
                issue.department.as_str(),
                issue.photo,
                issue.location.lat,
                issue.location.lng,
                issue.created_at,
                issue.acknowledged_at,
                issue.resolved_at,
                issue.status.as_str(),
                issue.user_id,
                issue.user_email,
                issue.username,
                issue.rating,
                issue.feedback,
            ],
        )?;

        Ok(())
    }

    fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>, StoreError> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
        let issue = self
            .conn
            .query_row(&sql, params![issue_id.trim()], issue_from_row)
            .optional()?;
        Ok(issue)
    }

    fn modify_issue<T, E, F>(&self, issue_id: &str, apply: F) -> Result<Option<(Issue, T)>, E>
    where
        F: FnOnce(&mut Issue) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let Some(mut issue) = self.get_issue(issue_id)? else {
            return Ok(None);
        };

        let before = issue.clone();
        let outcome = apply(&mut issue)?;
        if issue != before {
            self.save_issue(&issue)?;
        }
        tx.commit().map_err(StoreError::from)?;

        Ok(Some((issue, outcome)))
    }

    fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(department) = query.department {
            values.push(Value::Text(department.as_str().to_owned()));
            clauses.push(format!("department = ?{}", values.len()));
        }
        if let Some(status) = query.status {
            values.push(Value::Text(status.as_str().to_owned()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(category) = query.category {
            values.push(Value::Text(category.as_str().to_owned()));
            clauses.push(format!("category = ?{}", values.len()));
        }
        if let Some(user_id) = query.user_id.as_deref() {
            values.push(Value::Text(user_id.to_owned()));
            clauses.push(format!("user_id = ?{}", values.len()));
        }
        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            values.push(Value::Text(contains_pattern(text)));
            let index = values.len();
            clauses.push(format!(
                "(LOWER(id) LIKE ?{index} ESCAPE '\\' \
                 OR LOWER(title) LIKE ?{index} ESCAPE '\\' \
                 OR LOWER(description) LIKE ?{index} ESCAPE '\\')"
            ));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit_clause = match query.limit {
            Some(limit) => {
                values.push(Value::Integer(i64::from(limit.clamp(1, MAX_LIST_LIMIT))));
                format!("LIMIT ?{}", values.len())
            }
            None => String::new(),
        };

        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues {where_clause} \
             ORDER BY created_at DESC, rowid DESC {limit_clause}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), issue_from_row)?;
        let issues = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE id = ?1 OR email = ?2 OR LOWER(username) = LOWER(?3) LIMIT 1",
                params![user.id, user.email, user.username],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::Conflict(format!(
                "an account with email '{}' or username '{}' already exists",
                user.email, user.username
            )));
        }
        self.save_user(user)
    }

    fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO users (
                id, username, email, password_hash, is_admin, department,
                password_reset_token, password_reset_expires
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                password_hash = excluded.password_hash,
                is_admin = excluded.is_admin,
                department = excluded.department,
                password_reset_token = excluded.password_reset_token,
                password_reset_expires = excluded.password_reset_expires
            "#,
            params![
                user.id,
                user.username,
                user.email,
                user.password_hash,
                user.is_admin,
                user.department.map(Department::as_str),
                user.password_reset_token,
                user.password_reset_expires,
            ],
        )?;

        Ok(())
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.query_one_user("id", user_id.trim())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.query_one_user("email", email.trim().to_lowercase().as_str())
    }

    fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        self.query_one_user("password_reset_token", token)
    }

    fn find_admin_by_department(
        &self,
        department: Department,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_admin = 1 AND department = ?1 \
             ORDER BY rowid ASC LIMIT 1"
        );
        let user = self
            .conn
            .query_row(&sql, params![department.as_str()], user_from_row)
            .optional()?;
        Ok(user)
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY rowid ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], user_from_row)?;
        let users = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn push_notification(
        &self,
        user_id: &str,
        notification: &NotificationMessage,
    ) -> Result<(), StoreError> {
        let email_json = notification
            .email
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT INTO notifications (
                id, user_id, message, read, created_at, kind, delivery, email_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                notification.id,
                user_id,
                notification.message,
                notification.read,
                notification.created_at,
                notification.kind.as_str(),
                notification.delivery.as_str(),
                email_json,
            ],
        )?;

        Ok(())
    }

    fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationMessage>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, message, read, created_at, kind, delivery, email_json
            FROM notifications
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;

        let rows = stmt.query_map(params![user_id], notification_from_row)?;
        let notifications = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    fn mark_notifications_read(&self, user_id: &str) -> Result<usize, StoreError> {
        let updated = self.conn.execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            params![user_id],
        )?;
        Ok(updated)
    }

    fn unread_notification_count(&self, user_id: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// `%text%` for a case-insensitive LIKE, with the text's own `%`, `_` and
/// `\` matched literally.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn parse_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err.into()))
}

fn parse_optional_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    let raw: Option<String> = row.get(index)?;
    raw.map(|value| {
        value.parse::<T>().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err.into())
        })
    })
    .transpose()
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: parse_column(row, 3)?,
        department: parse_column(row, 4)?,
        photo: row.get(5)?,
        location: GeoPoint {
            lat: row.get(6)?,
            lng: row.get(7)?,
        },
        created_at: row.get(8)?,
        acknowledged_at: row.get(9)?,
        resolved_at: row.get(10)?,
        status: parse_column(row, 11)?,
        user_id: row.get(12)?,
        user_email: row.get(13)?,
        username: row.get(14)?,
        rating: row.get(15)?,
        feedback: row.get(16)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_admin: row.get(4)?,
        department: parse_optional_column(row, 5)?,
        password_reset_token: row.get(6)?,
        password_reset_expires: row.get(7)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationMessage> {
    let email_json: Option<String> = row.get(6)?;
    let email = email_json
        .map(|raw| {
            serde_json::from_str::<EmailContent>(&raw).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(err))
            })
        })
        .transpose()?;

    Ok(NotificationMessage {
        id: row.get(0)?,
        message: row.get(1)?,
        read: row.get(2)?,
        created_at: row.get(3)?,
        kind: parse_column(row, 4)?,
        delivery: parse_column(row, 5)?,
        email,
    })
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS issues (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            department TEXT NOT NULL,
            photo TEXT NOT NULL,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            created_at INTEGER NOT NULL,
            acknowledged_at INTEGER,
            resolved_at INTEGER,
            status TEXT NOT NULL,
            user_id TEXT NOT NULL,
            user_email TEXT NOT NULL,
            username TEXT NOT NULL,
            rating INTEGER,
            feedback TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_issues_department ON issues(department);
        CREATE INDEX IF NOT EXISTS idx_issues_user_id ON issues(user_id);

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            department TEXT,
            password_reset_token TEXT,
            password_reset_expires INTEGER
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            message TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            kind TEXT NOT NULL,
            delivery TEXT NOT NULL,
            email_json TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user_id ON notifications(user_id);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use civic_core::{CallToAction, DeliveryMethod, NotificationKind};
    use tempfile::tempdir;

    use super::*;

    fn issue(id: &str, created_at: i64) -> Issue {
        Issue {
            id: id.to_owned(),
            title: "Overflowing bin".to_owned(),
            description: "Garbage bin at the park entrance is overflowing".to_owned(),
            category: Category::Garbage,
            department: Department::Sanitation,
            photo: "https://img.example/bin.jpg".to_owned(),
            location: GeoPoint {
                lat: 35.6895,
                lng: 139.6917,
            },
            created_at,
            acknowledged_at: None,
            resolved_at: None,
            status: Status::Pending,
            user_id: "user-alice".to_owned(),
            user_email: "alice@example.com".to_owned(),
            username: "alice".to_owned(),
            rating: None,
            feedback: None,
        }
    }

    fn user(id: &str, username: &str, email: &str) -> User {
        User {
            id: id.to_owned(),
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: "sha256$salt$digest".to_owned(),
            is_admin: false,
            department: None,
            password_reset_token: None,
            password_reset_expires: None,
        }
    }

    #[test]
    fn store_creates_layout_and_round_trips_issues_across_reopen() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();

        let store = SqliteStore::open(root).expect("open store");
        assert!(store.civic_dir().exists());
        assert!(store.database_path().exists());

        let mut record = issue("issue-1", 1_000);
        store.insert_issue(&record).expect("insert issue");

        record.status = Status::InProgress;
        record.acknowledged_at = Some(2_000);
        store.save_issue(&record).expect("save issue");

        drop(store);

        let reopened = SqliteStore::open(root).expect("reopen store");
        let loaded = reopened.get_issue("issue-1").expect("get issue");
        assert_eq!(loaded, Some(record));
        assert_eq!(reopened.get_issue("missing").expect("get missing"), None);
    }

    #[test]
    fn insert_issue_rejects_duplicate_ids() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");

        store.insert_issue(&issue("issue-1", 1_000)).expect("insert");
        let err = store
            .insert_issue(&issue("issue-1", 2_000))
            .expect_err("duplicate insert");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn list_issues_filters_and_orders_newest_first() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");

        let older = issue("issue-older", 1_000);
        let mut newer = issue("issue-newer", 2_000);
        newer.title = "Street lamp flickering".to_owned();
        newer.category = Category::Streetlight;
        newer.department = Department::Electrical;
        newer.status = Status::Resolved;
        newer.resolved_at = Some(3_000);
        let mut other_user = issue("issue-bob", 1_500);
        other_user.user_id = "user-bob".to_owned();

        for item in [&older, &newer, &other_user] {
            store.insert_issue(item).expect("insert issue");
        }

        let all = store.list_issues(&IssueQuery::all()).expect("list all");
        let ids: Vec<_> = all.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["issue-newer", "issue-bob", "issue-older"]);

        let sanitation = store
            .list_issues(&IssueQuery::for_department(Department::Sanitation))
            .expect("list sanitation");
        assert_eq!(sanitation.len(), 2);

        let resolved = store
            .list_issues(&IssueQuery {
                status: Some(Status::Resolved),
                ..IssueQuery::default()
            })
            .expect("list resolved");
        assert_eq!(resolved, vec![newer.clone()]);

        let mine = store
            .list_issues(&IssueQuery::for_reporter("user-bob"))
            .expect("list bob");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "issue-bob");

        let by_text = store
            .list_issues(&IssueQuery {
                text: Some("LAMP".to_owned()),
                ..IssueQuery::default()
            })
            .expect("search text");
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].id, "issue-newer");

        let by_id_fragment = store
            .list_issues(&IssueQuery {
                text: Some("older".to_owned()),
                category: Some(Category::Garbage),
                ..IssueQuery::default()
            })
            .expect("search id");
        assert_eq!(by_id_fragment.len(), 1);

        let limited = store
            .list_issues(&IssueQuery {
                limit: Some(1),
                ..IssueQuery::default()
            })
            .expect("limited");
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "issue-newer");
    }

    #[test]
    fn text_search_matches_wildcards_literally() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");

        let mut percent = issue("issue-percent", 1_000);
        percent.title = "Bin 50% full".to_owned();
        let mut plain = issue("issue-plain", 2_000);
        plain.title = "Bin 500 litres".to_owned();
        plain.description = "Overflowing on main st".to_owned();
        let mut underscore = issue("issue-underscore", 3_000);
        underscore.title = "Sign reads main_st".to_owned();
        for item in [&percent, &plain, &underscore] {
            store.insert_issue(item).expect("insert issue");
        }

        let search = |text: &str| {
            store
                .list_issues(&IssueQuery {
                    text: Some(text.to_owned()),
                    ..IssueQuery::default()
                })
                .expect("search")
                .into_iter()
                .map(|item| item.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(search("50%"), vec!["issue-percent".to_owned()]);
        assert_eq!(search("n_s"), vec!["issue-underscore".to_owned()]);
        assert!(search("\\").is_empty());
    }

    #[test]
    fn modify_issue_commits_changes_and_discards_failures() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        store.insert_issue(&issue("issue-1", 1_000)).expect("insert");

        let missing: Result<Option<(Issue, ())>, StoreError> =
            store.modify_issue("missing", |_| Ok(()));
        assert!(missing.expect("modify missing").is_none());

        let failed: Result<Option<(Issue, ())>, StoreError> =
            store.modify_issue("issue-1", |issue| {
                issue.status = Status::Resolved;
                Err(StoreError::Conflict("rejected".to_owned()))
            });
        assert!(matches!(failed, Err(StoreError::Conflict(_))));
        let unchanged = store.get_issue("issue-1").expect("get").expect("exists");
        assert_eq!(unchanged.status, Status::Pending);

        let (updated, previous) = store
            .modify_issue("issue-1", |issue| -> Result<_, StoreError> {
                let previous = issue.status;
                issue.status = Status::InProgress;
                issue.acknowledged_at = Some(2_000);
                Ok(previous)
            })
            .expect("modify")
            .expect("issue exists");
        assert_eq!(previous, Status::Pending);
        assert_eq!(updated.status, Status::InProgress);

        let reopened = SqliteStore::open(temp.path()).expect("reopen store");
        assert_eq!(reopened.get_issue("issue-1").expect("get"), Some(updated));
    }

    #[test]
    fn users_are_unique_by_email_and_username() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");

        store
            .insert_user(&user("user-1", "alice", "alice@example.com"))
            .expect("insert alice");

        let same_email = store.insert_user(&user("user-2", "alice2", "alice@example.com"));
        assert!(matches!(same_email, Err(StoreError::Conflict(_))));

        let same_name = store.insert_user(&user("user-3", "ALICE", "other@example.com"));
        assert!(matches!(same_name, Err(StoreError::Conflict(_))));

        let found = store
            .find_user_by_email(" Alice@Example.com ")
            .expect("find by email");
        assert_eq!(found.map(|u| u.id), Some("user-1".to_owned()));
    }

    #[test]
    fn admin_lookup_and_reset_token_lookup() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");

        let mut admin = user("user-admin", "Water", "water@city.gov");
        admin.is_admin = true;
        admin.department = Some(Department::Water);
        store.insert_user(&admin).expect("insert admin");

        let mut citizen = user("user-c", "carol", "carol@example.com");
        citizen.password_reset_token = Some("tok-123".to_owned());
        citizen.password_reset_expires = Some(99);
        store.insert_user(&citizen).expect("insert citizen");

        assert_eq!(
            store
                .find_admin_by_department(Department::Water)
                .expect("find admin"),
            Some(admin)
        );
        assert_eq!(
            store
                .find_admin_by_department(Department::Roads)
                .expect("find none"),
            None
        );
        assert_eq!(
            store
                .find_user_by_reset_token("tok-123")
                .expect("find by token"),
            Some(citizen)
        );
        assert_eq!(store.find_user_by_reset_token("").expect("empty"), None);
        assert_eq!(store.list_users().expect("list users").len(), 2);
    }

    #[test]
    fn notifications_are_newest_first_and_can_be_marked_read() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");

        let first = NotificationMessage::in_app(NotificationKind::StatusUpdate, "first", 1_000);
        let second = NotificationMessage::email(
            NotificationKind::Email,
            "second",
            EmailContent {
                subject: "Resolved".to_owned(),
                body: "Your report was resolved".to_owned(),
                cta: Some(CallToAction {
                    text: "Leave feedback".to_owned(),
                    link: "/issues/issue-1/feedback".to_owned(),
                }),
            },
            2_000,
        );
        store.push_notification("user-1", &first).expect("push first");
        store
            .push_notification("user-1", &second)
            .expect("push second");
        store
            .push_notification(
                "user-2",
                &NotificationMessage::in_app(NotificationKind::General, "other", 3_000),
            )
            .expect("push other user");

        let listed = store.list_notifications("user-1").expect("list");
        assert_eq!(listed, vec![second.clone(), first.clone()]);
        assert_eq!(listed[0].delivery, DeliveryMethod::Email);
        assert_eq!(store.unread_notification_count("user-1").expect("unread"), 2);

        assert_eq!(store.mark_notifications_read("user-1").expect("mark"), 2);
        assert_eq!(store.mark_notifications_read("user-1").expect("mark again"), 0);
        assert_eq!(store.unread_notification_count("user-1").expect("unread"), 0);
        assert_eq!(store.unread_notification_count("user-2").expect("unread"), 1);
        assert!(
            store
                .list_notifications("user-1")
                .expect("list")
                .iter()
                .all(|item| item.read)
        );
    }
}
