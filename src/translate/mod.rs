//! API translation between the `OpenAI` and native backend formats.
//!
//! Requests are translated by a pure function; responses are rewritten write by
//! write through [`relay::ResponseRelay`].

pub mod native_types;
pub mod openai_types;
pub mod relay;
pub mod request;
pub mod response;
