//! Conversation layer of hrdesk.
//!
//! Every inbound message or button click goes through [`Router::route`]:
//!
//! ```text
//! InboundEnvelope → Router → classifier / token codec → Workflow
//!                      ↓                                    ↓
//!          ConversationState (loaded once, saved once)    render → OutboundMessage
//! ```
//!
//! - **Workflows** (`workflows`) - onboarding, time off, calendar and chat
//! - **Cards** (`blocks`) - message builders for approval and proposal cards
//! - **Capabilities** (`capability`) - timeout wrappers around directory,
//!   calendar and notifier adapters
//! - **Transport** (`transport`) - proactive delivery and typing indicators

pub mod audit;
pub mod blocks;
pub mod capability;
pub mod dispatch;
pub mod events;
pub mod render;
pub mod router;
pub mod services;
pub mod transport;
pub mod turn;
pub mod workflows;

pub use audit::TracingAuditSink;
pub use events::{InboundEnvelope, InboundEvent, UserClaim};
pub use render::{OutboundKind, OutboundMessage};
pub use router::Router;
pub use services::{BotSettings, Capabilities, Services, Stores};
pub use transport::{RecordingTransport, Transport};
