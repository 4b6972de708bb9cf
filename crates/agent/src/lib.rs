//! Language understanding for hrdesk.
//!
//! Turns a free-text message into a [`intents::Classification`]: one intent
//! from a closed set plus the slots that intent needs. Keyword shortcuts run
//! first, then a hosted model if one is configured. The model is a
//! translator only; it never decides balances, approvals or account data.
//!
//! - `shortcuts` - deterministic trigger phrases
//! - `slots` - per-intent slot parsing from text and model entities
//! - `classifier` - resolution order, retry and timeout
//! - `guardrails` - confidence gate before a workflow starts
//! - `runtime` - fallback chat replies

pub mod classifier;
pub mod guardrails;
pub mod intents;
pub mod llm;
pub mod runtime;
pub mod shortcuts;
pub mod slots;

pub use classifier::{ClassifierContext, IntentClassifier};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use intents::{Classification, ClassificationSource, Intent};
pub use llm::{LlmClient, ScriptedLlmClient};
pub use runtime::ChatResponder;
pub use slots::{CandidateSlots, LeaveSlots, MeetingSlots, ScheduleSlots, Slots};
