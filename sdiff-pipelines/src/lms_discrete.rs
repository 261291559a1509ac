//! Linear multi-step scheduler.
//!
//! Integrates the probability-flow ODE with a linear multistep method,
//! weighting a bounded history of per-step derivatives by coefficients
//! obtained from integrating the Lagrange basis polynomials over the local
//! sigma interval.
use std::collections::VecDeque;

use sdiff_core::utils::integrate;
use sdiff_core::{Error, Result, Tensor};

use crate::schedulers::{step_index, NoiseSchedule, Scheduler, SchedulerConfig};

/// The LMS discrete scheduler.
///
/// Stateful and not safe for concurrent use; one instance drives exactly one
/// sampling run sequentially.
#[derive(Debug, Clone)]
pub struct LmsDiscreteScheduler {
    schedule: NoiseSchedule,
    timesteps: Vec<i32>,
    sigmas: Vec<f32>,
    derivatives: VecDeque<Tensor<f32>>,
    pub config: SchedulerConfig,
}

impl LmsDiscreteScheduler {
    /// Creates an unconfigured LMS scheduler from the training schedule
    /// parameters.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let schedule = NoiseSchedule::new(&config)?;
        Ok(Self {
            schedule,
            timesteps: vec![],
            sigmas: vec![],
            derivatives: VecDeque::new(),
            config,
        })
    }

    /// Computes the linear multistep coefficient for `current_order` at step
    /// `t` by integrating the matching Lagrange basis polynomial over
    /// `[sigmas[t + 1], sigmas[t]]`.
    ///
    /// The integral runs in reverse and is negated, as the quadrature only
    /// goes one way.
    fn lms_coefficient(&self, order: usize, t: usize, current_order: usize) -> f64 {
        let sigmas = &self.sigmas;
        let lms_derivative = |tau: f64| {
            let mut prod = 1.0;
            for k in 0..order {
                if current_order == k {
                    continue;
                }
                prod *= (tau - sigmas[t - k] as f64)
                    / (sigmas[t - current_order] as f64 - sigmas[t - k] as f64);
            }
            prod
        };
        -integrate(lms_derivative, sigmas[t + 1] as f64, sigmas[t] as f64)
    }
}

impl Scheduler for LmsDiscreteScheduler {
    fn timesteps(&self) -> &[i32] {
        &self.timesteps
    }

    fn init_noise_sigma(&self) -> f32 {
        self.schedule.init_noise_sigma
    }

    fn set_timesteps(&mut self, num_inference_steps: usize) -> Result<&[i32]> {
        self.derivatives.clear();
        let (timesteps, sigmas) = self.schedule.inference_schedule(num_inference_steps)?;
        self.timesteps = timesteps;
        self.sigmas = sigmas;
        Ok(&self.timesteps)
    }

    /// Scales the denoising model input by `1 / sqrt(sigma^2 + 1)` to match
    /// the K-LMS algorithm.
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

    fn step_with_order(
        &mut self,
        model_output: &Tensor<f32>,
        timestep: i32,
        sample: &Tensor<f32>,
        order: usize,
    ) -> Result<Tensor<f32>> {
        if self.timesteps.is_empty() {
            return Err(Error::SchedulerNotConfigured { op: "step" });
        }
        let step_index = step_index(&self.timesteps, timestep)
            .ok_or(Error::UnknownTimestep { timestep })?;
        let sigma = self.sigmas[step_index];

        // 1. compute predicted original sample (x_0) from sigma-scaled predicted noise
        let pred_original_sample: Vec<f32> = sample
            .as_slice()
            .iter()
            .zip(model_output.as_slice().iter())
            .map(|(&s, &m)| s - sigma * m)
            .collect();

        // 2. convert to an ODE derivative
        let derivative: Vec<f32> = sample
            .as_slice()
            .iter()
            .zip(pred_original_sample.iter())
            .map(|(&s, &p)| (s - p) / sigma)
            .collect();
        self.derivatives
            .push_back(Tensor::new(derivative, sample.shape())?);
        if self.derivatives.len() > order {
            self.derivatives.pop_front();
        }

        // 3. compute linear multistep coefficients
        let effective_order = usize::min(step_index + 1, order);
        let lms_coeffs: Vec<f64> = (0..effective_order)
            .map(|current_order| self.lms_coefficient(effective_order, step_index, current_order))
            .collect();

        // 4. compute previous sample based on the derivative path, weighting
        // the history most recent first
        let mut lms_der_sum = Tensor::zeros(sample.shape())?;
        for (coeff, derivative) in lms_coeffs.iter().zip(self.derivatives.iter().rev()) {
            let mut weighted = derivative.copy();
            weighted.scale(*coeff as f32);
            lms_der_sum.add(&weighted)?;
        }

        let mut prev_sample = sample.copy();
        prev_sample.add(&lms_der_sum)?;
        Ok(prev_sample)
    }
}
