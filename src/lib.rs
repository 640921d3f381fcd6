//! # Quote Compare
//!
//! Compares two insurance quotes with a hosted chat-completion model.
//!
//! Each quote document is turned into text (locally, or through Azure
//! Document Intelligence when configured), the two texts are substituted
//! into a user prompt template, and the prompt is sent along with a system
//! message. Results can be kept as JSON records and browsed later.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌─────────────┐
//! │  Extract   │──▶│  Compose   │──▶│ Completion │──▶│ completions │
//! │ local/DI   │   │ {quote1/2} │   │ Azure OAI  │   │  *.json     │
//! └────────────┘   └────────────┘   └────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! quotecmp init                          # create working directories
//! quotecmp data                          # list documents in ./data
//! quotecmp compare acme.pdf globex.pdf --save
//! quotecmp history list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`extract`] | Text extraction by file type |
//! | [`remote`] | Azure Document Intelligence client |
//! | [`prompt`] | `{quote1}` / `{quote2}` template substitution |
//! | [`templates`] | Named system messages and user prompts |
//! | [`completion`] | Chat-completion provider |
//! | [`compare`] | The comparison workflow |
//! | [`store`] | Completion record files |
//! | [`naming`] | Record labels from file names |
//! | [`history`] | Saved-completion commands |
//! | [`models`] | Core data types |

pub mod compare;
pub mod completion;
pub mod config;
pub mod extract;
pub mod history;
pub mod models;
pub mod naming;
pub mod prompt;
pub mod remote;
pub mod store;
pub mod templates;
