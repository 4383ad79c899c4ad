/*!
 * # docflow - document translation workflow
 *
 * Translates uploaded documents section by section. Each run validates the
 * document, translates its sections in parallel with context retrieved from
 * a translation memory, merges the sections in order and optionally e-mails
 * a time-limited download link.
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `app_controller`: Wires the workflow to its collaborators
 * - `workflow`: Validator, translator, combiner, notifier, coordinator and
 *   upload dispatcher
 * - `bootstrap`: Idempotent reconciliation of grants and environment
 * - `memory`: Translation memory index and TMX ingestion
 * - `storage`: Blob store abstraction with local and in-memory backends
 * - `providers`: Embedding, generation and mail clients
 * - `database`: SQLite persistence for memory, policies, environments and runs
 * - `language_utils`: ISO language code utilities
 * - `errors`: Error types
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod app_config;
pub mod app_controller;
pub mod bootstrap;
pub mod database;
pub mod errors;
pub mod language_utils;
pub mod memory;
pub mod providers;
pub mod storage;
pub mod workflow;

pub use app_config::Config;
pub use app_controller::{Controller, Services};
pub use errors::{AppError, ProviderError, WorkflowError};
pub use workflow::{CombinedDocument, RunInput, WorkflowCoordinator};
