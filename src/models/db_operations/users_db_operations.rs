use crate::models::db_operations::{content_db_operations, parse_id, DbError};
use crate::models::{Role, User};
use chrono::{DateTime, Utc};
use redb::Database;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, roles, active, created";

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn roles_to_column(roles: &[Role]) -> String {
    roles.iter().map(Role::as_str).collect::<Vec<_>>().join(",")
}

fn user_from_row(row: &Row) -> Result<User, rusqlite::Error> {
    let id: String = row.get(0)?;
    let roles: String = row.get(5)?;
    let created: String = row.get(7)?;

    let roles = roles
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| conversion_error(5, e))?;

    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        roles,
        active: row.get(6)?,
        created: DateTime::parse_from_rfc3339(&created)
            .map_err(|e| conversion_error(7, e))?
            .with_timezone(&Utc),
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation)
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DbError> {
    let result = conn.execute(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, roles, active, created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id.to_string(),
            user.first_name,
            user.last_name,
            user.email,
            user.password_hash,
            roles_to_column(&user.roles),
            user.active,
            user.created.to_rfc3339(),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(DbError::Duplicate(format!("email '{}'", user.email))),
        Err(e) => Err(e.into()),
    }
}

pub fn find_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [id.to_string()], user_from_row).optional()?)
}

pub fn get_user(conn: &Connection, id: &str) -> Result<User, DbError> {
    let id = parse_id(id)?;
    find_user(conn, &id)?.ok_or_else(|| DbError::NotFound(format!("user {}", id)))
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1 COLLATE NOCASE", USER_COLUMNS);
    Ok(conn.query_row(&sql, [email.trim()], user_from_row).optional()?)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, DbError> {
    let sql = format!("SELECT {} FROM users ORDER BY created", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Updates profile fields and roles; the password hash is left alone.
pub fn update_user(conn: &Connection, user: &User) -> Result<(), DbError> {
    let result = conn.execute(
        "UPDATE users SET first_name = ?1, last_name = ?2, email = ?3, roles = ?4, active = ?5 WHERE id = ?6",
        params![
            user.first_name,
            user.last_name,
            user.email,
            roles_to_column(&user.roles),
            user.active,
            user.id.to_string(),
        ],
    );
    match result {
        Ok(0) => Err(DbError::NotFound(format!("user {}", user.id))),
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(DbError::Duplicate(format!("email '{}'", user.email))),
        Err(e) => Err(e.into()),
    }
}

pub fn update_password_hash(conn: &Connection, id: &Uuid, password_hash: &str) -> Result<(), DbError> {
    let updated = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, id.to_string()],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("user {}", id)));
    }
    Ok(())
}

/// Deletes a user unless some content still lists them as an author.
pub fn delete_user(conn: &Connection, db: &Database, id: &str) -> Result<(), DbError> {
    let id = parse_id(id)?;
    if content_db_operations::count_by_author(db, id)? > 0 {
        return Err(DbError::DependentContentExists(format!("user {}", id)));
    }
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
    if deleted == 0 {
        return Err(DbError::NotFound(format!("user {}", id)));
    }
    Ok(())
}
