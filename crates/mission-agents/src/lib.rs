//! Concrete collaborators and runtime wiring for persona-driven usability
//! missions.
//!
//! The deterministic core (state machine, escalation, correlation) lives in
//! the `coordination` crate; this crate supplies the I/O behind its traits:
//! an OpenAI-compatible dispatcher, an HTTP page scout, an HTML schema
//! mapper, a command-based automation driver, lesson stores, and the report
//! and telemetry sinks used by the `mission-agents` binary.

pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod memory_bridge;
pub mod persona_registry;
pub mod prompts;
pub mod runtime;
pub mod schema_mapper;
pub mod scout;
pub mod screenshots;
pub mod telemetry;

pub use config::PilotConfig;
pub use dispatcher::HttpDispatcher;
pub use driver::CommandDriver;
pub use memory_bridge::{FileLessonStore, HttpMemoryService};
pub use persona_registry::PersonaRegistry;
pub use schema_mapper::HtmlSchemaMapper;
pub use scout::HttpScout;
pub use screenshots::FileScreenshotSink;
