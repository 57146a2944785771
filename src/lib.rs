//! # stripetrain
//!
//! Replicated multi-thread training and validation for supervised
//! feed-forward networks.
//!
//! ## Overview
//!
//! A dataset is partitioned across N worker threads by **striped** indices
//! (thread `i` takes samples `i, i + N, i + 2N, ...`). Each thread runs an
//! independent replica of the network over its slice; per-thread partial
//! errors and gradients are reduced deterministically into a single epoch
//! result. Dispatch and collection go through an instance-owned rendezvous
//! gate, so an epoch either fully completes for every thread or the
//! coordinator is torn down.
//!
//! On top of the coordinator sits a pattern-recognition driver that turns
//! labeled multi-class patterns into per-class weighted epoch errors and,
//! optionally, an SP signal/noise separation score for validation.
//!
//! ## Structure
//!
//! - [`core`] — Network capability trait, reference MLP, error type
//! - [`data`] — Owned sample buffers, striped views, pattern sets
//! - [`sync`] — Dispatch/park rendezvous between coordinator and workers
//! - [`training`] — The replicated coordinator and the pattern driver
//! - [`checkpoint`] — JSON save/load for the reference network

pub mod checkpoint;
pub mod core;
pub mod data;
pub mod sync;
pub mod training;

pub use crate::core::{Activation, MlpNetwork, SupervisedNetwork, TrainError, TrainResult};
pub use data::{PatternSet, SampleSet, Stripe};
pub use training::{PatternRecognition, ReplicatedTrainer};
