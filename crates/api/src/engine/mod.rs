//! Job relay engine.
//!
//! Contains the relay service that submits workflows and owns job state,
//! the input stager, the materializer that turns finished prompts into
//! base64 artifacts, and the consumer task that applies stream events.

pub mod consumer;
pub mod materializer;
pub mod relay;
pub mod stager;
