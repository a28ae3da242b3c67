//! # af-engine
//!
//! The media conversion job engine.
//!
//! A [`ConversionService`] validates requests and runs each [`Job`] on its
//! own task under a concurrency bound. The [`JobRunner`] owns a job from
//! `Created` to `Succeeded` or `Failed`: it stages remote pulls, drives the
//! [`af_av::Transcoder`] once, enforces the deadline and removes every
//! temporary artifact before publishing an [`Outcome`].

pub mod job;
pub mod lifecycle;
pub mod naming;
pub mod outcome;
pub mod service;
pub mod source;

pub use job::{Job, JobFailure, JobStatus, JobSummary};
pub use lifecycle::JobRunner;
pub use naming::ArtifactNamer;
pub use outcome::{download_ref, Outcome};
pub use service::{ConversionRequest, ConversionService, JobHandle, ServiceStats};
pub use source::InputSource;
