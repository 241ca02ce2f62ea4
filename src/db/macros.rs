//! Database dispatch macros for reducing code duplication.
//!
//! Each sqlx backend has its own pool and row types. These macros generate the
//! backend-specific code from a single body, so the parallel implementations cannot
//! drift apart. They expand at compile time with zero runtime overhead.

/// Macro for generating database dispatch match arms.
///
/// Arms may carry attributes, which lets feature-gated backends take part.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => p.close().await,
///     Postgres(p) => p.close().await,
///     SQLite(p) => p.close().await,
///     #[cfg(feature = "firebird")]
///     Firebird(p) => p.close(),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($(#[$meta:meta])* $variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $(#[$meta])*
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Generates `run_in_transaction` for one sqlx pool type.
///
/// The generated function begins a transaction, streams every result of `sql` through
/// the simple query protocol into a [`ResultBuilder`](crate::db::normalize::ResultBuilder)
/// and commits. Each await before the commit races the cancellation token; once the
/// commit is sent it runs to completion.
///
/// On a query error the transaction is rolled back and the rows read so far are
/// returned alongside the error. On cancellation the transaction is dropped, which
/// queues the rollback on the connection without waiting for it.
#[macro_export]
macro_rules! impl_transaction_runner {
    ($pool_ty:ty) => {
        pub async fn run_in_transaction(
            pool: &$pool_ty,
            sql: &str,
            cancel: &::tokio_util::sync::CancellationToken,
        ) -> $crate::db::executor::Execution {
            use ::futures_util::StreamExt;
            use $crate::db::executor::Execution;
            use $crate::error::DbError;

            let mut tx = ::tokio::select! {
                biased;
                _ = cancel.cancelled() => return Execution::failed(DbError::Cancelled, None),
                begun = pool.begin() => match begun {
                    Ok(tx) => tx,
                    Err(e) => return Execution::failed(e.into(), None),
                },
            };

            let mut builder = $crate::db::normalize::ResultBuilder::new();
            let outcome: Result<(), DbError> = {
                let mut stream = ::sqlx::raw_sql(sql).fetch_many(&mut *tx);
                loop {
                    let next = ::tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Err(DbError::Cancelled),
                        next = stream.next() => next,
                    };
                    match next {
                        None => break Ok(()),
                        Some(Ok(::sqlx::Either::Left(_))) => builder.end_result_set(),
                        Some(Ok(::sqlx::Either::Right(row))) => builder.push(&row),
                        Some(Err(e)) => break Err(e.into()),
                    }
                }
            };

            match outcome {
                // A commit that was sent cannot be taken back, so it is never raced.
                Ok(()) if cancel.is_cancelled() => {
                    drop(tx);
                    Execution::failed(DbError::Cancelled, Some(builder.finish()))
                }
                Ok(()) => match tx.commit().await {
                    Ok(()) => Execution::succeeded(builder.finish()),
                    Err(e) => Execution::failed(e.into(), Some(builder.finish())),
                },
                Err(DbError::Cancelled) => {
                    drop(tx);
                    Execution::failed(DbError::Cancelled, Some(builder.finish()))
                }
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        $crate::db::executor::log_rollback_failure(&rollback_err);
                    }
                    Execution::failed(e, Some(builder.finish()))
                }
            }
        }
    };
}

pub use impl_db_dispatch;
pub use impl_transaction_runner;
