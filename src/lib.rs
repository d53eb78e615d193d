//! SignBridge: rule-based hand sign recognition and text-to-sign lookup.
//!
//! The recognition core lives in [`sign`]; [`service`] exposes it to local
//! clients over the s-expression IPC protocol in [`ipc`].

pub mod history;
pub mod ipc;
pub mod service;
pub mod sign;
pub mod state;

pub use history::{ConversationEntry, ConversationLog, EntryKind};
pub use service::ServiceConfig;
pub use sign::{
    classify, lookup, supported_gestures, Classification, GestureClassifier, Landmark,
    PhraseMatch, SignGesture,
};
