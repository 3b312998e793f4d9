//! Outstanding-request lifecycle management for DNS clients.
//!
//! This crate provides the bookkeeping for a single in-flight DNS query: a
//! deadline timer, an identifier registered with a transport registry, and
//! the guarantee that exactly one terminal outcome – an answer, a timeout,
//! a cancellation, or a transport error – is reported to the caller, no
//! matter in which order the completion triggers arrive.
//!
//! Driving a query to completion consists of three steps:
//! 1) Creating a [`Request`][request::Request],
//! 2) Sending it through a [`Registry`][registry::Registry], and
//! 3) Receiving the outcome from the [`Events`][request::Events] channel.
//!
//! The request is created from an opaque question, a per-request
//! [`Config`][request::Config], and the already loaded resolver
//! configuration:
//!
//! ```rust
//! use dns_request::conf::ResolvConf;
//! use dns_request::request::{Config, Request};
//!
//! let mut conf = ResolvConf::new();
//! conf.push_server("9.9.9.9");
//! let mut config = Config::new();
//! config.set_server("1.2.3.4");
//! let (_request, _events) = Request::new(b"example.com.".to_vec(), config, &conf);
//! ```
//!
//! The registry is the collaborator that owns identifier assignment, the
//! actual network transmission, and the matching of inbound responses to
//! outstanding requests. It is not part of this crate; anything that
//! implements [`Registry`][registry::Registry] will do. After
//! [`send`][request::Request::send], the registry resolves the request
//! through [`deliver_answer`][request::Request::deliver_answer] or
//! [`deliver_error`][request::Request::deliver_error], the deadline timer
//! may fire first, or the caller may [`cancel`][request::Request::cancel].
//! Whichever happens first wins; the others become silent no-ops.
//!
//! The caller observes the outcome as a typed [`Event`][request::Event] on
//! the channel returned at construction time: at most one of `Answer`,
//! `Timeout`, `Cancelled`, or `Error`, followed by `End` once the request
//! has left the registry.
//!
//! What this crate does not do: it never parses or composes DNS messages,
//! never touches a socket, never retries against another server, and never
//! caches. Those concerns belong to the registry and to the layers built on
//! top.

#![warn(missing_docs)]

pub mod conf;
pub mod error;
pub mod registry;
pub mod request;

pub use self::conf::{ResolvConf, ServerConf, ServerSpec, Transport};
pub use self::error::Error;
pub use self::registry::Registry;
pub use self::request::{Event, Events, Request};
