//! Turning an [`App`] into an address we can send requests to.
//!
//! `endpoint::Endpoint` is the "front-end": it either borrows the address of an application that
//! is already listening or owns the lifecycle of an ephemeral `hyper` server, defined in the
//! `hyper` sub-module, started around an unbound handler.
//!
//! One request gets one `Endpoint`: we never share an ephemeral server between requests.
//!
//! [`App`]: crate::App
mod endpoint;
mod hyper;

pub(crate) use endpoint::{bind, Endpoint};
