//! Financial Risk API Library
//!
//! Credit-risk ensemble scoring, stock investment assessment and financial statement
//! analysis behind an axum HTTP API, together with the market-data, news and narrative
//! collaborators those workflows call.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Analytical engines and workflows.
//! - `integrations`: External service clients.
//! - `artifacts`: Loading and checksum verification of pre-trained models.
//! - `chart`: Historical price chart rendering.
//! - `circuit_breaker`: Breaker for flaky upstreams.
//! - `classifiers`: Model artifact formats and inference.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and shared state.
//! - `investment`: Growth-rate heuristic and verdicts.
//! - `models`: Request and response payloads.
//! - `narrative`: Prose generation and prompts.
//! - `normalize`: Conversion of loose inputs into plain values.
//! - `orchestrator`: Request workflows.
//! - `ratios`: Statement analysis and liquidity ratios.
//! - `scoring`: Credit-risk ensemble.
//! - `services`: Market data, news and company directory clients.
//! - `table`: CSV statement tables.

pub mod api;
pub mod core;
pub mod integrations;

pub mod artifacts;
pub mod chart;
pub mod circuit_breaker;
pub mod classifiers;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod investment;
pub mod models;
pub mod narrative;
pub mod normalize;
pub mod orchestrator;
pub mod ratios;
pub mod scoring;
pub mod services;
pub mod table;
