//! Lesson Memory: cross-session learning for mission runs.
//!
//! # Modules
//!
//! - [`store`]: MemoryService contract, LessonMatch, in-process lexical store
//! - [`errors`]: Memory failure taxonomy (always degrades, never aborts)
//! - [`correlator`]: Cross-platform friction correlation

pub mod correlator;
pub mod errors;
pub mod store;

pub use correlator::{CorrelatorConfig, CrossPlatformCorrelator};
pub use errors::MemoryError;
pub use store::{
    lesson_metadata, lessons_for_url, InMemoryLessonStore, LessonMatch, MemoryService,
    StoredLesson,
};
