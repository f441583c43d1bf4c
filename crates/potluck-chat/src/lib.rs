//! Realtime group chat on top of the backend interfaces.
//!
//! - [`MessageStream`] loads history and turns the insert change-feed into
//!   [`Message`]s.
//! - [`MessageTimeline`] merges both into one oldest-first list with at most
//!   one entry per message id.
//! - [`TypingTracker`] folds unreliable typing broadcasts into a
//!   self-expiring set of [`TypingUser`]s.
//! - [`TypingDebouncer`] turns local keystrokes into start/stop signals.
//! - [`ChatSession`] wires everything together for a UI.

pub mod debounce;
pub mod error;
pub mod message;
pub mod presence;
pub mod pump;
pub mod reconciler;
pub mod session;
pub mod timeline;
pub mod typing;

pub use debounce::TypingDebouncer;
pub use error::ChatError;
pub use message::{Message, RowError};
pub use presence::{TypingPublisher, TypingSubscription, TypingTracker};
pub use pump::SubscriptionTask;
pub use reconciler::MessageStream;
pub use session::{ChatEvent, ChatSession, ChatView};
pub use timeline::MessageTimeline;
pub use typing::{TypingEvent, TypingUser};
