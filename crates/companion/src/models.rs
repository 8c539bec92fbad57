//! These models represent the objects passed around by the agent
//!
//! There are three formats we need to interact with:
//! - openai chat messages/tools, sent from the agent to the LLM
//! - display messages, sent from the agent to whichever adapter is driving it
//! - tool calls, dispatched from the agent to the tool registry
//!
//! We always immediately convert the openai format into the internal structs using the
//! helpers in `providers::utils`, so the internal models are not an exact match for it.
pub mod display;
pub mod message;
pub mod role;
pub mod tool;
