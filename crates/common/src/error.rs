//! Base error type and the `Context` helper every crate generates for its
//! own error enum.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{command} failed to start: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can be built from a plain message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

/// `<context>: <source>`
#[doc(hidden)]
pub fn join_context(context: impl Into<String>, source: impl std::fmt::Display) -> String {
    format!("{}: {source}", context.into())
}

/// Define a crate-local `Context` trait adding `.context()` and
/// `.with_context()` to `Result` and `Option`.
///
/// The invoking module must have `Error: FromMessage` and a `Result<T>`
/// alias in scope:
///
/// ```ignore
/// skillet_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;

            fn context(self, context: impl Into<String>) -> Result<T>
            where
                Self: Sized,
            {
                let context = context.into();
                self.with_context(move || context)
            }
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message($crate::error::join_context(
                        f(),
                        source,
                    ))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
