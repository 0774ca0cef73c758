use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::user::User,
};

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        google_subject: row.try_get("google_subject").map_err(|_| AppError::MissingData("google_subject".to_string()))?,
        email: row.try_get("email").map_err(|_| AppError::MissingData("email".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
    })
}

/// Creates the user for a Google subject, or refreshes its email if it exists.
pub async fn upsert_by_subject(
    pool: &Pool,
    google_subject: &str,
    email: Option<&str>,
) -> Result<User> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO users (id, google_subject, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (google_subject) DO UPDATE
            SET email = COALESCE(EXCLUDED.email, users.email),
                updated_at = NOW()
            RETURNING id, google_subject, email, created_at, updated_at
            "#,
            &[&Uuid::new_v4(), &google_subject, &email],
        )
        .await?;
    row_to_user(&row)
}

