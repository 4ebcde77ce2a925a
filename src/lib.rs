//! Passive citation extraction from chat-service conversation streams.
//!
//! [`intercept::Interceptor`] wraps a [`fetch::Fetch`] primitive, tees
//! in-scope event-stream responses and mines the copy for citations, which
//! reach the UI through the [`bridge`].

pub mod bridge;
pub mod citations;
pub mod fetch;
pub mod intercept;
pub mod service;
pub mod sink;
pub mod state;
