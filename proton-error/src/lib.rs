#![deny(missing_docs)]
#![feature(error_generic_member_access)]

//! This crate defines error & result types for the Proton native driver.
//! It also contains a variety of useful macros for error handling.

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{env, fmt, io};

pub use ext::*;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

#[allow(clippy::fallible_impl_from)]
impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    #[allow(clippy::panic)]
    fn from(msg: T) -> Self {
        if env::var("PROTON_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for the driver.
///
/// The variants follow the error taxonomy of the native protocol: type-name and registry
/// failures, data errors raised while encoding or decoding a column, protocol and stream
/// failures raised by the byte source, and configuration errors raised by format overrides.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum ProtonError {
    /// A type name could not be parsed.
    #[error("Can not parse type name: {0}\nBacktrace:\n{1}")]
    Parse(ErrString, Backtrace),
    /// A type name parsed, but its base is not a known type.
    #[error("{0}\nBacktrace:\n{1}")]
    UnknownType(ErrString, Backtrace),
    /// A value could not be encoded or decoded for its column type.
    #[error("{0}\nBacktrace:\n{1}")]
    Data(ErrString, Backtrace),
    /// The wire data did not follow the native block format.
    #[error("protocol error: {0}\nBacktrace:\n{1}")]
    Protocol(ErrString, Backtrace),
    /// The byte stream ended before a value was complete.
    #[error("stream ended unexpectedly: {0}\nBacktrace:\n{1}")]
    StreamComplete(ErrString, Backtrace),
    /// The byte stream ended early and carried a server error message.
    #[error("{0}\nBacktrace:\n{1}")]
    StreamFailure(ErrString, Backtrace),
    /// An unrecognized or inapplicable format or setting was requested.
    #[error("configuration error: {0}\nBacktrace:\n{1}")]
    Config(ErrString, Backtrace),
    /// An invalid argument was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// The requested operation is not supported by the type.
    #[error("function {0} not implemented for {1}\nBacktrace:\n{2}")]
    NotImplemented(ErrString, ErrString, Backtrace),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<ProtonError>),
    /// A wrapper for IO errors.
    #[error(transparent)]
    IOError(
        #[from]
        #[backtrace]
        io::Error,
    ),
    /// A wrapper for JSON errors.
    #[error(transparent)]
    JsonError(
        #[from]
        #[backtrace]
        serde_json::Error,
    ),
    /// A wrapper for date and time errors.
    #[error(transparent)]
    JiffError(#[from] jiff::Error),
    /// A wrapper for UUID parse errors.
    #[error(transparent)]
    UuidError(#[from] uuid::Error),
}

impl ProtonError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        ProtonError::Context(msg.into(), Box::new(self))
    }

    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &ProtonError {
        match self {
            ProtonError::Context(_, inner) => inner.root(),
            other => other,
        }
    }

    /// True for errors raised because a value did not fit its column type.
    pub fn is_data_error(&self) -> bool {
        matches!(self.root(), ProtonError::Data(..))
    }
}

impl Debug for ProtonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return ProtonErrors as their error type.
pub type ProtonResult<T> = Result<T, ProtonError>;

/// A trait for unwrapping a ProtonResult.
pub trait ProtonUnwrap {
    /// The type of the value being unwrapped.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug
    /// (programmer error).
    fn proton_unwrap(self) -> Self::Output;
}

impl<T, E> ProtonUnwrap for Result<T, E>
where
    E: Into<ProtonError>,
{
    type Output = T;

    #[inline(always)]
    fn proton_unwrap(self) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|err| proton_panic!(err))
    }
}

/// A trait for expect-ing a ProtonResult or an Option.
pub trait ProtonExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug
    /// (programmer error).
    fn proton_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> ProtonExpect for Result<T, E>
where
    E: Into<ProtonError>,
{
    type Output = T;

    #[inline(always)]
    fn proton_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| proton_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> ProtonExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn proton_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = ProtonError::InvalidArgument(msg.to_string().into(), Backtrace::capture());
            proton_panic!(err)
        })
    }
}

/// A convenient macro for creating a ProtonError.
#[macro_export]
macro_rules! proton_err {
    (NotImplemented: $func:expr, $by_whom:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::ProtonError::NotImplemented(
                $func.into(),
                format!("{}", $by_whom).into(),
                Backtrace::capture(),
            )
        )
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::__private::must_use(
            $crate::ProtonError::Context($msg.into(), Box::new($err))
        )
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::ProtonError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($variant:ident: $err:expr $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::ProtonError::$variant($err.into(), Backtrace::capture())
        )
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::proton_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a ProtonError.
#[macro_export]
macro_rules! proton_bail {
    ($($tt:tt)+) => {
        return Err($crate::proton_err!($($tt)+))
    };
}

/// A convenient macro for panicking with a ProtonError in the presence of a programmer error
/// (e.g., an invariant has been violated).
#[macro_export]
macro_rules! proton_panic {
    (Context: $msg:literal, $err:expr) => {{
        $crate::proton_panic!($crate::proton_err!(Context: $msg, $err))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::proton_panic!($crate::proton_err!($variant: $fmt, $($arg),*))
    };
    ($err:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err: $crate::ProtonError = $err;
        panic!("{}", err.with_context(format!($fmt, $($arg),*)))
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::proton_panic!($crate::proton_err!($fmt, $($arg),*))
    };
    ($err:expr) => {{
        let err: $crate::ProtonError = $err;
        panic!("{}", err)
    }};
}

#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(error: crate::ProtonError) -> crate::ProtonError {
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_width(width: &str) -> ProtonResult<u8> {
        width
            .parse::<u8>()
            .map_err(|e| proton_err!(Config: "invalid width {width}: {e}"))
    }

    #[test]
    fn macro_variants() {
        let err = proton_err!(Data: "value {} exceeds column size {}", "ff 01", 1);
        assert!(matches!(err, ProtonError::Data(..)));
        assert!(err.to_string().starts_with("value ff 01 exceeds column size 1"));

        let err = proton_err!("bare message");
        assert!(matches!(err, ProtonError::InvalidArgument(..)));
    }

    #[test]
    fn context_keeps_root() {
        let err = proton_err!(Data: "bad value").with_context("Invalid data in column `a`");
        assert!(err.is_data_error());
        assert!(err.to_string().starts_with("Invalid data in column `a`: bad value"));
    }

    #[test]
    fn bail_returns_error() {
        fn fails() -> ProtonResult<()> {
            proton_bail!(Protocol: "malformed header");
        }
        assert!(matches!(fails(), Err(ProtonError::Protocol(..))));
        assert!(matches!(parse_width("huh"), Err(ProtonError::Config(..))));
    }

    #[test]
    fn io_errors_convert() {
        fn read() -> ProtonResult<()> {
            let res: Result<(), io::Error> =
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
            res?;
            Ok(())
        }
        assert!(matches!(read(), Err(ProtonError::IOError(..))));
    }
}
