//! Conversations with the RAG assistant
//!
//! - `state`: [`ChatState`] and the [`ChatAction`] reducer
//! - `store`: observable state holder
//! - `service`: backend flows that update the store
//! - `session`: the chat view's entry logic and user actions

pub mod service;
pub mod session;
pub mod state;
pub mod store;

pub use service::ChatService;
pub use session::{ChatSession, Entered};
pub use state::{ChatAction, ChatState};
pub use store::ChatStore;
