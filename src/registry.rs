//! The trait for transport registries.

use crate::request::Request;

//------------ Registry ------------------------------------------------------

/// A collaborator that transmits requests and routes responses back.
///
/// The registry owns everything this crate deliberately does not: message
/// identifier assignment, socket management per
/// [`Transport`][crate::conf::Transport], and the multiplexing of inbound
/// datagrams or stream frames back to the matching outstanding request.
///
/// A well-behaved registry, handed a request through [`send`][Self::send],
/// assigns an identifier with
/// [`set_identifier`][Request::set_identifier], transmits the question to
/// [`Request::server`], and later resolves the request through exactly one
/// of [`Request::deliver_answer`] or [`Request::deliver_error`] – unless
/// the request was removed first. The request does not rely on this:
/// late or duplicate deliveries are dropped on its side, so a racy or
/// misbehaving registry cannot produce a second outcome.
pub trait Registry<Q> {
    /// Takes over a request for transmission.
    ///
    /// The request handle is a clone; the registry keeps it until it
    /// delivers an outcome or is asked to remove the request.
    fn send(&self, request: Request<Q>);

    /// Stops tracking a request.
    ///
    /// Called by the request itself on every terminal transition, while
    /// its identifier is still set. Must be idempotent; removing a request
    /// that was never sent or is already gone does nothing.
    fn remove(&self, request: &Request<Q>);
}
