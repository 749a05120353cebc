//! portgate agent library.
//!
//! Reconciles declared port orders with a remote ordering API: the
//! [`scheduler::Driver`] runs one serialized pass per resource, the
//! [`connector::Connector`] resolves credentials into a per-pass HTTP
//! client, and the [`controller`] state machine decides whether an order
//! needs to be placed.

pub mod connector;
pub mod controller;
pub mod credentials;
pub mod provider;
pub mod resource;
pub mod scheduler;
pub mod state;
