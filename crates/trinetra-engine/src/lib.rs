pub mod artifacts;
pub mod backend;
pub mod cancel;
pub mod client;
pub mod config;
pub mod dryrun;
pub mod encoder;
pub mod error;
pub mod gemini;
pub mod session;

use trinetra_contracts::events::{EventLog, EventPayload};

pub use cancel::CancelToken;
pub use client::GenAiClient;
pub use config::{BackendKind, EngineConfig, ModelChoice};
pub use error::{ConfigError, EncodeError, GenAiError, SessionError, CHAT_FALLBACK_REPLY};
pub use session::{ConversationSession, SessionStore};

/// Emits an event, downgrading write failures to a warning.
pub(crate) fn record_event(events: &EventLog, event_type: &str, payload: EventPayload) {
    if let Err(err) = events.emit(event_type, payload) {
        tracing::warn!(event_type, error = %err, "failed to write event");
    }
}
