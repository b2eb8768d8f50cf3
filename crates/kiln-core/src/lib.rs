//! # Kiln Core
//!
//! Core library for the Kiln asset pipeline: named groups of style and script resources are
//! resolved from a reloadable model, run through a processor chain, and served from a cache
//! that is invalidated on a schedule.
//!
//! - **[`model`]**: Resource-group model snapshots, loaders, and the reloading provider.
//! - **[`processor`]**: Two-stage processor chain and the built-in steps.
//! - **[`cache`]**: Content cache with single-flight computation and epoch-based staleness.
//! - **[`scheduler`]**: Timer tasks raising the model and content staleness flags.
//! - **[`manager`]**: Per-request façade tying model, cache and chain together.
//! - **[`resource`]**: Readers fetching raw resource bytes.
//! - **[`metrics`]**: Event sinks for Prometheus counters and structured logs.
//! - **[`config`]**: Layered application configuration.
//! - **[`runtime`]**: Wiring and lifecycle of all of the above.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RequestManager                        │
//! │  ┌───────────────┐  ┌────────────────┐  ┌─────────────────┐  │
//! │  │ ModelProvider │  │  ContentCache  │  │ ProcessorChain  │  │
//! │  └───────┬───────┘  └───────┬────────┘  └────────┬────────┘  │
//! │          │                  │                    │           │
//! │  ┌───────▼───────┐  ┌───────▼────────┐  ┌────────▼────────┐  │
//! │  │  ModelLoader  │  │ in-flight cells│  │ pre: resource   │  │
//! │  │  model flag   │  │ content flag   │  │ post: merged    │  │
//! │  └───────▲───────┘  └───────▲────────┘  └─────────────────┘  │
//! └──────────┼──────────────────┼────────────────────────────────┘
//!            │                  │
//!        ┌───┴──────────────────┴───┐
//!        │  InvalidationScheduler   │
//!        └──────────────────────────┘
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! GET /assets/g1.css
//!       │
//!       ▼
//! ┌──────────────┐
//! │ GroupRequest │ ─── Invalid ──► 400
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Cache Check  │ ─── Fresh ──► Cached content
//! └──────┬───────┘
//!        │ Stale / missing
//!        ▼
//! ┌──────────────┐
//! │ Single-flight│ ─── In flight ──► wait, share result
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Model lookup │ ─── Unknown ──► 404
//! └──────┬───────┘
//!        ▼
//!  read → pre steps → concat → post steps → cache → response
//! ```
//!
//! ## Feature Flags
//!
//! - `verbose-logging`: Extra trace output on the cache hit path

pub mod cache;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod processor;
pub mod resource;
pub mod runtime;
pub mod scheduler;
