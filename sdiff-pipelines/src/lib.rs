//! Schedulers and the sampling loop for latent diffusion image generation.
//!
//! The [`pipeline::generate_latents`] loop owns a [`schedulers::Scheduler`]
//! instance and the evolving latent tensor; each iteration scales the model
//! input, queries an external [`pipeline::Denoiser`], composes the guided
//! noise prediction and delegates the numerical update to the scheduler.
//! Tokenization, text encoding, the denoising network itself and latent
//! decoding all live behind the `Denoiser` boundary.

pub mod euler_ancestral_discrete;
pub mod lms_discrete;
pub mod pipeline;
pub mod schedulers;

pub use pipeline::{generate_latents, Denoiser, SamplingRequest, Timestep, TimestepKind};
pub use schedulers::{BetaSchedule, Scheduler, SchedulerConfig, SchedulerKind};
