use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn already_closed(what: impl Into<String>) -> Error {
        Error(ErrorKind::AlreadyClosed { what: what.into() }.into())
    }

    /// Wraps `cause` as an aborting failure: every document buffered since the last
    /// successful flush has been discarded.
    ///
    /// Wrapping an error that already is a writer fault returns it unchanged.
    pub fn writer_fault(cause: Error) -> Error {
        if cause.is_writer_fault() {
            return cause;
        }
        Error(ErrorKind::WriterFault { source: cause }.into())
    }

    pub fn tokenization(field: impl Into<String>, source: StdErrorBoxed) -> Error {
        Error(
            ErrorKind::Tokenization {
                field: field.into(),
                source,
            }
            .into(),
        )
    }

    pub fn is_writer_fault(&self) -> bool {
        matches!(self.kind(), ErrorKind::WriterFault { .. })
    }

    pub fn is_already_closed(&self) -> bool {
        matches!(self.kind(), ErrorKind::AlreadyClosed { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("invalid index format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("{what} is closed")]
    AlreadyClosed { what: String },

    #[error("token stream for field '{field}' failed: {source}")]
    Tokenization {
        field: String,
        source: StdErrorBoxed,
    },

    #[error("indexing aborted, buffered documents were discarded: {source}")]
    WriterFault { source: Error },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_fault_wraps_once() {
        let cause = Error::io("_0.frq", std::io::Error::other("disk full"));
        let fault = Error::writer_fault(cause);
        assert!(fault.is_writer_fault());
        let again = Error::writer_fault(fault);
        match again.into_kind() {
            ErrorKind::WriterFault { source } => assert!(!source.is_writer_fault()),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_error_messages() {
        let e = Error::invalid_arg("ram_buffer_size_mb", "must be positive");
        assert_eq!(
            e.to_string(),
            "invalid argument ram_buffer_size_mb: must be positive"
        );
        let e = Error::already_closed("index writer");
        assert!(e.is_already_closed());
        assert_eq!(e.to_string(), "index writer is closed");
    }
}
