//! Row mapping for ledger queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::User;

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

pub const USER_COLS: &str =
    "id, email, password_hash, is_paid, payment_gateway, customer_reference, paid_at, created_at";

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            is_paid: row.get::<_, i64>(3)? != 0,
            payment_gateway: row.get(4)?,
            customer_reference: row.get(5)?,
            paid_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}
