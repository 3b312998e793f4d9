//! Error type for transport failures.

use core::fmt;
use std::error;
use std::sync::Arc;

//------------ Error ---------------------------------------------------------

/// A transport-level failure of an outstanding request.
///
/// Values of this type are produced by the registry and delivered to a
/// request verbatim through
/// [`deliver_error`][crate::request::Request::deliver_error]. A deadline
/// that passes or an explicit cancellation is not an error; those surface
/// as their own [`Event`][crate::request::Event] variants.
#[derive(Clone, Debug)]
pub enum Error {
    /// The connection to the server was closed before a response arrived.
    ConnectionClosed,

    /// Sending the request gave an error.
    Send(Arc<std::io::Error>),

    /// Receiving the response gave an error.
    Receive(Arc<std::io::Error>),

    /// The registry could not assign an identifier to the request.
    TooManyOutstandingQueries,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::Send(_) => write!(f, "error sending request"),
            Error::Receive(_) => write!(f, "error receiving response"),
            Error::TooManyOutstandingQueries => {
                write!(f, "too many outstanding queries")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::ConnectionClosed => None,
            Error::Send(e) => Some(e),
            Error::Receive(e) => Some(e),
            Error::TooManyOutstandingQueries => None,
        }
    }
}
