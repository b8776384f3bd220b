/// Errors raised by the shared message model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A channel, message or user id that is not a decimal snowflake.
    #[error("invalid snowflake id: {value:?}")]
    InvalidId { value: String },
}

impl Error {
    #[must_use]
    pub fn invalid_id(value: impl Into<String>) -> Self {
        Self::InvalidId {
            value: value.into(),
        }
    }
}

/// Error types that can carry a bare context message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Expands to a crate-local `Context` trait adding `.context()` and
/// `.with_context()` to any `Result` whose error implements `Display`.
///
/// The calling module must define `Error: FromMessage` and a one-parameter
/// `Result<T>` alias.
///
/// ```ignore
/// // crates/store/src/error.rs
/// impl mirror_common::FromMessage for Error {
///     fn from_message(message: String) -> Self {
///         Self::Message { message }
///     }
/// }
///
/// mirror_common::impl_context!();
///
/// // crates/store/src/document.rs
/// fs::rename(&backup, &path)
///     .await
///     .with_context(|| format!("restore {}", backup.display()))?;
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message(format!("{}: {source}", f().into()))
                })
            }
        }
    };
}
