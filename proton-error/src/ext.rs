use crate::{ErrString, ProtonResult};

/// Extension trait for ProtonResult
pub trait ResultExt<T>: private::Sealed {
    /// Flatten a nested [`ProtonResult`].
    ///
    /// Helper function until <https://github.com/rust-lang/rust/issues/70142> is stabilized.
    fn flatten(self) -> ProtonResult<T>
    where
        T: Sized;
}

/// Extension trait attaching context to a failed [`ProtonResult`].
pub trait ContextExt<T>: private::Sealed {
    /// Wraps the error, if any, with a lazily built context message.
    fn with_context<F, S>(self, msg: F) -> ProtonResult<T>
    where
        F: FnOnce() -> S,
        S: Into<ErrString>;
}

mod private {
    use crate::ProtonResult;

    pub trait Sealed {}

    impl<T> Sealed for ProtonResult<T> {}
}

impl<T> ResultExt<T> for ProtonResult<ProtonResult<T>> {
    fn flatten(self) -> ProtonResult<T> {
        match self {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}

impl<T> ContextExt<T> for ProtonResult<T> {
    fn with_context<F, S>(self, msg: F) -> ProtonResult<T>
    where
        F: FnOnce() -> S,
        S: Into<ErrString>,
    {
        self.map_err(|e| e.with_context(msg()))
    }
}
