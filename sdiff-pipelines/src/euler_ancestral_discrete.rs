//! Ancestral sampling with Euler method steps.
//!
//! Based on the original [`k-diffusion` implementation by Katherine Crowson][kd].
//!
//! [kd]: https://github.com/crowsonkb/k-diffusion/blob/481677d114f6ea445aa009cf5bd7a9cdee909e47/k_diffusion/sampling.py#L72
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use sdiff_core::{Error, Result, Tensor};

use crate::schedulers::{step_index, NoiseSchedule, Scheduler, SchedulerConfig};

/// The Euler Ancestral discrete scheduler.
///
/// A single-step stochastic variant: each step advances deterministically
/// toward the predicted original sample and reinjects fresh Gaussian noise
/// drawn from a scheduler-local seeded generator, so runs are reproducible
/// for a fixed seed.
#[derive(Debug, Clone)]
pub struct EulerAncestralDiscreteScheduler {
    schedule: NoiseSchedule,
    timesteps: Vec<i32>,
    sigmas: Vec<f32>,
    rng: StdRng,
    pub config: SchedulerConfig,
}

impl EulerAncestralDiscreteScheduler {
    /// Creates an unconfigured Euler Ancestral scheduler from the training
    /// schedule parameters, seeding the noise generator from `seed`.
    pub fn new(config: SchedulerConfig, seed: u64) -> Result<Self> {
        let schedule = NoiseSchedule::new(&config)?;
        Ok(Self {
            schedule,
            timesteps: vec![],
            sigmas: vec![],
            rng: StdRng::seed_from_u64(seed),
            config,
        })
    }
}

impl Scheduler for EulerAncestralDiscreteScheduler {
    fn timesteps(&self) -> &[i32] {
        &self.timesteps
    }

    fn init_noise_sigma(&self) -> f32 {
        self.schedule.init_noise_sigma
    }

    fn set_timesteps(&mut self, num_inference_steps: usize) -> Result<&[i32]> {
        let (timesteps, sigmas) = self.schedule.inference_schedule(num_inference_steps)?;
        self.timesteps = timesteps;
        self.sigmas = sigmas;
        Ok(&self.timesteps)
    }

    /// Scales the denoising model input by `1 / sqrt(sigma^2 + 1)` for
    /// interchangeability with the multistep schedulers.
    fn scale_model_input(&self, sample: &mut Tensor<f32>, timestep: i32) -> Result<()> {
        if self.timesteps.is_empty() {
            return Err(Error::SchedulerNotConfigured {
                op: "scale_model_input",
            });
        }
        let step_index = step_index(&self.timesteps, timestep)
            .ok_or(Error::UnknownTimestep { timestep })?;
        let sigma = self.sigmas[step_index];
        sample.scale(1.0 / (sigma * sigma + 1.0).sqrt());
        Ok(())
    }

    /// Performs a backward step during inference. The solver order is
    /// ignored, this variant carries no multistep history.
    fn step_with_order(
        &mut self,
        model_output: &Tensor<f32>,
        timestep: i32,
        sample: &Tensor<f32>,
        _order: usize,
    ) -> Result<Tensor<f32>> {
        if self.timesteps.is_empty() {
            return Err(Error::SchedulerNotConfigured { op: "step" });
        }
        let step_index = step_index(&self.timesteps, timestep)
            .ok_or(Error::UnknownTimestep { timestep })?;
        let sigma_from = self.sigmas[step_index];
        let sigma_to = self.sigmas[step_index + 1];

        // Split the local noise level into the deterministic part of the step
        // and the magnitude reinjected as fresh noise.
        let sigma_up = (sigma_to.powi(2) * (sigma_from.powi(2) - sigma_to.powi(2))
            / sigma_from.powi(2))
        .sqrt();
        let sigma_down = (sigma_to.powi(2) - sigma_up.powi(2)).sqrt();
        let dt = sigma_down - sigma_from;

        let data: Vec<f32> = sample
            .as_slice()
            .iter()
            .zip(model_output.as_slice().iter())
            .map(|(&s, &m)| {
                // 1. compute predicted original sample (x_0) from sigma-scaled
                // predicted noise, 2. convert to an ODE derivative
                let pred_original_sample = s - sigma_from * m;
                let derivative = (s - pred_original_sample) / sigma_from;
                let noise: f32 = self.rng.sample(StandardNormal);
                s + derivative * dt + noise * sigma_up
            })
            .collect();
        Tensor::new(data, sample.shape())
    }
}
