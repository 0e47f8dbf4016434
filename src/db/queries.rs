use chrono::Utc;
use rusqlite::{Connection, ErrorCode, TransactionBehavior, params};

use crate::error::{AppError, Result, msg};
use crate::models::User;

use super::from_row::{USER_COLS, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// ============ Users ============

/// Insert a user with `is_paid = false`. Emails are stored trimmed and lower-cased.
pub fn create_user(conn: &Connection, email: &str, password_hash: &str) -> Result<User> {
    let email = email.trim().to_lowercase();
    let created_at = now();

    conn.execute(
        "INSERT INTO users (email, password_hash, is_paid, created_at) VALUES (?1, ?2, 0, ?3)",
        params![&email, password_hash, created_at],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::BadRequest(msg::EMAIL_ALREADY_REGISTERED.into())
        } else {
            e.into()
        }
    })?;

    Ok(User {
        id: conn.last_insert_rowid(),
        email,
        password_hash: password_hash.to_string(),
        is_paid: false,
        payment_gateway: None,
        customer_reference: None,
        paid_at: None,
        created_at,
    })
}

pub fn get_user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

// ============ Entitlements ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPaidOutcome {
    /// The user was unpaid and is now paid.
    Granted,
    /// The user was already paid; only a new customer reference may have been recorded.
    AlreadyPaid,
    UserNotFound,
}

/// Grant the paid entitlement to `user_id`.
///
/// Load, mutate and commit happen in one IMMEDIATE transaction so concurrent
/// readers see either the old row or the fully updated one. Calling this again
/// for a paid user changes nothing except an updated customer reference.
/// The first grant's `payment_gateway` and `paid_at` are kept.
pub fn mark_paid(
    conn: &mut Connection,
    user_id: i64,
    gateway: &str,
    customer_reference: Option<&str>,
) -> Result<MarkPaidOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(user) = query_one::<User>(
        &tx,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&user_id],
    )?
    else {
        return Ok(MarkPaidOutcome::UserNotFound);
    };

    let outcome = if user.is_paid {
        if let Some(reference) = customer_reference {
            tx.execute(
                "UPDATE users SET customer_reference = ?1 WHERE id = ?2",
                params![reference, user_id],
            )?;
        }
        MarkPaidOutcome::AlreadyPaid
    } else {
        tx.execute(
            "UPDATE users
             SET is_paid = 1,
                 payment_gateway = COALESCE(payment_gateway, ?1),
                 customer_reference = COALESCE(?2, customer_reference),
                 paid_at = COALESCE(paid_at, ?3)
             WHERE id = ?4",
            params![gateway, customer_reference, now(), user_id],
        )?;
        MarkPaidOutcome::Granted
    };

    tx.commit()?;
    Ok(outcome)
}
