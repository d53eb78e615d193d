//! Sign recognition core.
//!
//! Provides:
//! - `landmarks`: 21-point hand pose model and s-expression parsing
//! - `gesture`: rule-based pose classifier
//! - `phrases`: text-to-animation lookup
//!
//! Everything here is pure and holds no mutable state.

pub mod gesture;
pub mod landmarks;
pub mod phrases;

pub use gesture::{
    classify, extended_fingers, supported_gestures, Classification, GestureClassifier,
    SignGesture, CONFIDENCE_CAP, CONFIDENCE_FLOOR, UNKNOWN_GESTURE,
};
pub use landmarks::{Finger, Hand, HandLandmark, Landmark, LANDMARK_COUNT};
pub use phrases::{catalog_phrases, lookup, MatchKind, PhraseCatalog, PhraseMatch, NOT_SUPPORTED_KEY};
