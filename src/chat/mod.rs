//! The chat flow: message preparation, prompt assembly and the pipeline
//! that ties retrieval to generation.

pub mod messages;
pub mod pipeline;
pub mod prompt;

pub use pipeline::{into_events, ChatEvent, ChatPipeline, ChatReply, APOLOGY_MESSAGE};
