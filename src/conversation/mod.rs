//! Intake conversations: domain types, the session controller, and its HTTP
//! surface.

pub mod controller;
pub mod model;
pub mod routes;

pub use controller::{
    ConversationView, MAX_MESSAGE_CHARS, SessionController, StartedConversation, TurnOutcome,
    UserSummary,
};
pub use model::{Conversation, ConversationMessage, ConversationMode, ConversationStatus, Role};
pub use routes::{ConversationRouteState, conversation_routes};
