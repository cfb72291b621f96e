//! # agent-core
//!
//! Core logic for a local coding agent: conversation state, a provider
//! abstraction over the inference server, and two file tools the model
//! drives through XML-like markup in its replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Agent                               │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────┐  │
//! │  │ Conversation│  │    Markup    │  │   LlmProvider       │  │
//! │  │    Loop     │──│  + FileTools │──│   (Strategy)        │  │
//! │  └─────────────┘  └──────────────┘  └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod markup;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use error::{AgentError, Result, ToolError};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, TurnOutcome};
pub use session::Session;
pub use tool::{FileTools, ToolExecution, ToolInvocation, ToolResult};
