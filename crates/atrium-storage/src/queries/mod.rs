// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each async function issues its statements through
//! [`crate::Database`]; synchronous helpers take a connection or transaction
//! so they can be composed inside one atomic unit.

pub mod attendance;
pub mod channels;
pub mod contacts;
pub mod conversations;
pub mod inbound;
pub mod messages;

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;

/// Reads a text column and parses it into a strum-backed enum.
pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Same as [`enum_col`] for nullable columns.
pub(crate) fn opt_enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
