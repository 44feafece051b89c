//! Conversational front end for the device-automation engine.
//!
//! An operator turn flows through:
//! 1. **Collaborator** (`llm`, `prompt`) - the transcript plus system
//!    instructions go to a text-completion service.
//! 2. **Reply validation** (`reply`) - the reply becomes either a validated
//!    intent or raw text that is shown and never executed.
//! 3. **Execution gate** (`guardrails`) - unknown capabilities, missing
//!    required values and unconfirmed intents stop here.
//! 4. **Dispatch** (`dispatch`) - a confirmed intent runs its capability,
//!    out of process by default.
//! 5. **Session state** (`conversation`) - transcripts and the last
//!    successful run are kept per session id.
//!
//! # Safety Principle
//!
//! The collaborator is strictly a translator. Its output is untrusted: it
//! never runs anything by itself, and `confirmed` is only honoured after the
//! registry contract has been checked.

pub mod audit;
pub mod conversation;
pub mod dispatch;
pub mod guardrails;
pub mod llm;
pub mod prompt;
pub mod reply;

pub use conversation::{ConversationManager, ConversationSession, SessionStore, TurnReply};
pub use dispatch::{ExecutionDispatcher, ProcessCapability};
pub use llm::{ChatMessage, LlmClient, OpenAiCompatibleClient};
