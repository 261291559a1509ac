#![allow(dead_code)]
//! Noise schedulers for the reverse-diffusion process.
//!
//! Schedulers convert raw denoising-model outputs into the next latent
//! sample across a discretized noise schedule. They are stateful and drive
//! exactly one sampling run at a time.
use sdiff_core::utils::{arange, interpolate, linspace};
use sdiff_core::{Result, Tensor};

use crate::euler_ancestral_discrete::EulerAncestralDiscreteScheduler;
use crate::lms_discrete::LmsDiscreteScheduler;

/// This trait represents a scheduler for the diffusion process.
///
/// A scheduler starts unconfigured; [`Scheduler::set_timesteps`] must be
/// called before [`Scheduler::scale_model_input`] or [`Scheduler::step`].
/// Calling `set_timesteps` again reconfigures the scheduler for a fresh run
/// and discards any multistep history.
pub trait Scheduler {
    /// The active timestep sequence, descending. Empty until configured.
    fn timesteps(&self) -> &[i32];

    /// The standard deviation of the initial noise distribution.
    fn init_noise_sigma(&self) -> f32;

    /// Configures the scheduler for a run of `num_inference_steps` steps,
    /// returning the new timesteps.
    fn set_timesteps(&mut self, num_inference_steps: usize) -> Result<&[i32]>;

    /// Scales the denoising model input for the given timestep. Must be
    /// applied before every call to the external model.
    fn scale_model_input(&self, sample: &mut Tensor<f32>, timestep: i32) -> Result<()>;

    /// Takes a diffusion step with the default order of 4, producing the next
    /// latent sample.
    fn step(
        &mut self,
        model_output: &Tensor<f32>,
        timestep: i32,
        sample: &Tensor<f32>,
    ) -> Result<Tensor<f32>> {
        self.step_with_order(model_output, timestep, sample, 4)
    }

    /// Takes a diffusion step with an explicit solver order.
    fn step_with_order(
        &mut self,
        model_output: &Tensor<f32>,
        timestep: i32,
        sample: &Tensor<f32>,
        order: usize,
    ) -> Result<Tensor<f32>>;
}

/// This represents how beta ranges from its minimum value to the maximum
/// during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaSchedule {
    /// Linear interpolation.
    Linear,
    /// Linear interpolation of the square root of beta.
    ScaledLinear,
}

/// Configuration shared by the scheduler variants.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Number of diffusion steps used to train the model.
    pub num_train_timesteps: usize,
    /// The value of beta at the beginning of training.
    pub beta_start: f32,
    /// The value of beta at the end of training.
    pub beta_end: f32,
    /// How beta evolved during training.
    pub beta_schedule: BetaSchedule,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_train_timesteps: 1000,
            beta_start: 0.00085,
            beta_end: 0.012,
            beta_schedule: BetaSchedule::ScaledLinear,
        }
    }
}

/// The set of available scheduler algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    /// A linear multi-step scheduler.
    Lms,
    /// An Euler Ancestral scheduler.
    EulerAncestral,
}

impl SchedulerKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Lms => "LMS",
            Self::EulerAncestral => "Euler Ancestral",
        }
    }

    /// The name to be used in image metadata.
    pub fn description_name(&self) -> &'static str {
        match self {
            Self::Lms => "LMS",
            Self::EulerAncestral => "Euler a",
        }
    }

    /// Builds an unconfigured scheduler, supplying a seed for any
    /// scheduler-local randomness.
    pub fn build(&self, config: SchedulerConfig, seed: u64) -> Result<Box<dyn Scheduler>> {
        let scheduler: Box<dyn Scheduler> = match self {
            Self::Lms => Box::new(LmsDiscreteScheduler::new(config)?),
            Self::EulerAncestral => Box::new(EulerAncestralDiscreteScheduler::new(config, seed)?),
        };
        Ok(scheduler)
    }
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// The training-time noise schedule shared by the scheduler variants.
///
/// Holds the cumulative alpha products and the per-step noise levels stored
/// reversed, so index 0 corresponds to the most noisy training step.
#[derive(Debug, Clone)]
pub(crate) struct NoiseSchedule {
    pub(crate) num_train_timesteps: usize,
    pub(crate) alphas_cumprod: Vec<f32>,
    pub(crate) initial_sigmas: Vec<f32>,
    pub(crate) init_noise_sigma: f32,
}

impl NoiseSchedule {
    pub(crate) fn new(config: &SchedulerConfig) -> Result<Self> {
        let n = config.num_train_timesteps;
        let betas = match config.beta_schedule {
            BetaSchedule::Linear => linspace(config.beta_start, config.beta_end, n, true)?,
            BetaSchedule::ScaledLinear => {
                linspace(config.beta_start.sqrt(), config.beta_end.sqrt(), n, true)?
                    .iter()
                    .map(|b| b * b)
                    .collect()
            }
        };

        let mut alphas_cumprod = Vec::with_capacity(n);
        let mut cum_prod = 1f32;
        for beta in betas {
            cum_prod *= 1.0 - beta;
            alphas_cumprod.push(cum_prod);
        }

        let initial_sigmas: Vec<f32> = alphas_cumprod
            .iter()
            .rev()
            .map(|&p| ((1.0 - p) / p).sqrt())
            .collect();
        let init_noise_sigma = initial_sigmas.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));

        Ok(Self {
            num_train_timesteps: n,
            alphas_cumprod,
            initial_sigmas,
            init_noise_sigma,
        })
    }

    /// Discretizes `num_inference_steps` positions over the training
    /// schedule, returning the descending integer timesteps and their
    /// interpolated sigmas.
    ///
    /// The sigma sequence carries a trailing 0.0 read by the multistep
    /// lookahead at the final step.
    pub(crate) fn inference_schedule(
        &self,
        num_inference_steps: usize,
    ) -> Result<(Vec<i32>, Vec<f32>)> {
        // A single step collapses the schedule to the most noisy timestep.
        if num_inference_steps == 1 {
            let timesteps = vec![(self.num_train_timesteps - 1) as i32];
            return Ok((timesteps, vec![self.init_noise_sigma, 0.0]));
        }
        let positions = linspace(
            0.0,
            (self.num_train_timesteps - 1) as f32,
            num_inference_steps,
            true,
        )?;
        let timesteps: Vec<i32> = positions.iter().rev().map(|&p| p as i32).collect();

        let range = arange(0.0, self.initial_sigmas.len() as f32, 1.0)?;
        let mut sigmas = interpolate(&positions, &range, &self.initial_sigmas);
        sigmas.push(0.0);
        Ok((timesteps, sigmas))
    }
}

/// Locates the step index for `timestep` in the active timestep list.
///
/// A linear scan resolving ties to the last match, as the descending order
/// rules out a binary search.
pub(crate) fn step_index(timesteps: &[i32], timestep: i32) -> Option<usize> {
    timesteps.iter().rposition(|&t| t == timestep)
}
