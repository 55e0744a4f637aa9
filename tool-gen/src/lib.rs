//! # Tool Generation
//!
//! This crate lets the runtime extend itself: given a natural-language
//! request it names a new tool, asks a text generator for an
//! implementation, validates the candidate in a sandbox and publishes it
//! into the hot-reload directory.
//!
//! - **Naming**: generator-suggested names, normalized, with a unique fallback
//! - **Sandboxing**: trial loads in a throwaway namespace, never the registry
//! - **Bounded Retries**: failed validations feed back into the next attempt
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Tool Generation                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  TextGenerator ──► NameSynthesizer                              │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  CodeSynthesisPipeline ──► SandboxRunner ──► hot directory      │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  SynthesisSession                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod llm;
pub mod naming;
pub mod pipeline;
pub mod prompt;
pub mod sandbox;
pub mod session;

pub use error::{GenerationError, Result};
pub use llm::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, Message, OpenAiCompatibleGenerator, Prompt, Role,
    ScriptedGenerator, TextGenerator,
};
pub use naming::{FALLBACK_PREFIX, NameSynthesizer, fallback_name};
pub use pipeline::{CodeSynthesisPipeline, DEFAULT_MAX_RETRIES, PipelineState};
pub use sandbox::{SandboxRunner, Trial, Validation};
pub use session::{GenerationAttempt, SessionStatus, SynthesisSession};
