//! The reverse-diffusion sampling loop.
//!
//! Drives an external denoising model across the scheduler's timestep
//! sequence: the loop owns the evolving latent tensor, duplicates the batch
//! for classifier-free guidance, scales the model input, composes the guided
//! noise prediction and delegates the numerical update to the scheduler.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use sdiff_core::{Error, Result, Shape, Tensor};

use crate::schedulers::{SchedulerConfig, SchedulerKind};

/// Number of latent channels produced by the diffusion process.
const LATENT_CHANNELS: i64 = 4;

/// The numeric representation the external model declares for its timestep
/// input, queried once at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestepKind {
    I32,
    I64,
    F32,
    F64,
}

/// A timestep value converted to the external model's declared kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestep {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl TimestepKind {
    pub fn timestep(&self, timestep: i32) -> Timestep {
        match self {
            Self::I32 => Timestep::I32(timestep),
            Self::I64 => Timestep::I64(i64::from(timestep)),
            Self::F32 => Timestep::F32(timestep as f32),
            Self::F64 => Timestep::F64(f64::from(timestep)),
        }
    }
}

/// The external denoising model: a black-box function from the current
/// sample, the text conditioning and the timestep to a noise prediction of
/// identical shape to the sample.
///
/// `text_embeds` and `time_ids` carry the auxiliary conditioning used by
/// SDXL-style models and are `None` for the regular path.
pub trait Denoiser {
    /// The numeric kind of the model's timestep input.
    fn timestep_kind(&self) -> TimestepKind;

    fn denoise(
        &mut self,
        sample: &Tensor<f32>,
        encoder_hidden_states: &Tensor<f32>,
        timestep: Timestep,
        text_embeds: Option<&Tensor<f32>>,
        time_ids: Option<&Tensor<f32>>,
    ) -> Result<Tensor<f32>>;
}

/// An immutable description of one sampling run.
#[derive(Debug, Clone)]
pub struct SamplingRequest {
    /// The number of denoising steps.
    pub steps: usize,
    /// The strength of the classifier-free guidance. Guidance is enabled
    /// when this is at least 1.0.
    pub guidance_scale: f32,
    /// The number of images generated simultaneously.
    pub batch_size: usize,
    /// The image height in pixels, a multiple of 8.
    pub height: usize,
    /// The image width in pixels, a multiple of 8.
    pub width: usize,
    /// The RNG seed for the initial latent and any scheduler randomness.
    pub seed: u64,
    /// The scheduler algorithm.
    pub scheduler: SchedulerKind,
    /// The training-schedule parameters for the scheduler.
    pub scheduler_config: SchedulerConfig,
    /// The text embedding batch. With guidance enabled this holds the
    /// unconditional embeddings first and the conditional ones second.
    pub text_embeddings: Tensor<f32>,
    /// Pooled text embeddings. When present the run uses the auxiliary
    /// SDXL-style conditioning path.
    pub pooled_text_embeddings: Option<Tensor<f32>>,
}

/// Applies the classifier-free guidance, mutating `noise_pred` into
/// `uncond + guidance_scale * (text - uncond)`.
pub fn apply_guidance(
    noise_pred: &mut Tensor<f32>,
    noise_pred_text: &Tensor<f32>,
    guidance_scale: f32,
) -> Result<()> {
    if noise_pred.shape() != noise_pred_text.shape() {
        return Err(Error::ShapeMismatchBinaryOp {
            lhs: noise_pred.shape().clone(),
            rhs: noise_pred_text.shape().clone(),
            op: "apply_guidance",
        });
    }
    for (u, &t) in noise_pred
        .as_mut_slice()
        .iter_mut()
        .zip(noise_pred_text.as_slice().iter())
    {
        *u += guidance_scale * (t - *u);
    }
    Ok(())
}

/// Samples the initial latent from a zero-mean Gaussian with the supplied
/// standard deviation.
fn sample_latent(
    rng: &mut StdRng,
    shape: Shape,
    initial_noise_std_dev: f32,
) -> Result<Tensor<f32>> {
    let elem_count = shape.elem_count()?;
    let data: Vec<f32> = (0..elem_count)
        .map(|_| rng.sample::<f32, _>(StandardNormal) * initial_noise_std_dev)
        .collect();
    Tensor::new(data, shape)
}

/// Duplicates the latent batch, unconditional half first, to match the text
/// embedding convention used with classifier-free guidance.
fn duplicate_batch(latents: &Tensor<f32>, guided_shape: &Shape) -> Result<Tensor<f32>> {
    let mut data = latents.to_vec();
    data.extend_from_slice(latents.as_slice());
    Tensor::new(data, guided_shape)
}

/// Builds the `[original size, crop position, target size]` conditioning
/// tensor for the auxiliary SDXL path, one row per batch entry (doubled when
/// guidance is enabled).
fn additional_image_conditions(
    batch_size: usize,
    height: usize,
    width: usize,
    guidance: bool,
) -> Result<Tensor<f32>> {
    let conditions = [height as f32, width as f32, 0.0, 0.0, height as f32, width as f32];
    let rows = if guidance { 2 * batch_size } else { batch_size };
    let mut data = Vec::with_capacity(rows * conditions.len());
    for _ in 0..rows {
        data.extend_from_slice(&conditions);
    }
    Tensor::new(data, (rows as i64, conditions.len() as i64))
}

/// Runs the reverse diffusion for the requested number of steps, returning
/// the final batch of latents.
///
/// `on_step` is invoked synchronously with `step_index + 1` after each
/// completed iteration. A failure from the denoising model aborts the run
/// and is surfaced unchanged.
pub fn generate_latents<F: FnMut(usize)>(
    model: &mut dyn Denoiser,
    request: &SamplingRequest,
    mut on_step: F,
) -> Result<Tensor<f32>> {
    let span = tracing::span!(tracing::Level::TRACE, "generate-latents");
    let _enter = span.enter();

    let mut rng = StdRng::seed_from_u64(request.seed);
    let scheduler_seed = rng.gen::<u64>();
    let mut scheduler = request
        .scheduler
        .build(request.scheduler_config, scheduler_seed)?;
    let timesteps = scheduler.set_timesteps(request.steps)?.to_vec();

    let batch_size = request.batch_size as i64;
    let latent_height = (request.height / 8) as i64;
    let latent_width = (request.width / 8) as i64;
    let unguided_shape = Shape::from((batch_size, LATENT_CHANNELS, latent_height, latent_width));
    let guided_shape = Shape::from((
        2 * batch_size,
        LATENT_CHANNELS,
        latent_height,
        latent_width,
    ));

    let mut latents = sample_latent(
        &mut rng,
        unguided_shape.clone(),
        scheduler.init_noise_sigma(),
    )?;

    let do_classifier_free_guidance = request.guidance_scale >= 1.0;
    tracing::debug!(
        scheduler = %request.scheduler,
        guidance = do_classifier_free_guidance,
        "starting sampling"
    );

    let additional_conditions = match &request.pooled_text_embeddings {
        Some(_) => {
            tracing::debug!("auxiliary conditioning enabled");
            Some(additional_image_conditions(
                request.batch_size,
                request.height,
                request.width,
                do_classifier_free_guidance,
            )?)
        }
        None => None,
    };

    let timestep_kind = model.timestep_kind();

    for (step_index, &timestep) in timesteps.iter().enumerate() {
        let mut latent_model_input = if do_classifier_free_guidance {
            // guidance uses two states, a positive latent value to move
            // towards and a negative latent value to move away from
            duplicate_batch(&latents, &guided_shape)?
        } else {
            latents.copy()
        };

        scheduler.scale_model_input(&mut latent_model_input, timestep)?;

        let noise_pred = model.denoise(
            &latent_model_input,
            &request.text_embeddings,
            timestep_kind.timestep(timestep),
            request.pooled_text_embeddings.as_ref(),
            additional_conditions.as_ref(),
        )?;
        if noise_pred.shape() != latent_model_input.shape() {
            return Err(Error::ShapeMismatchBinaryOp {
                lhs: latent_model_input.shape().clone(),
                rhs: noise_pred.shape().clone(),
                op: "denoise",
            });
        }

        let guided_pred = if do_classifier_free_guidance {
            let halves: [Tensor<f32>; 2] = noise_pred.split(&unguided_shape)?.try_into().map_err(
                |_: Vec<Tensor<f32>>| Error::ShapeMismatchSplit {
                    elem_count: noise_pred.elem_count(),
                    shape: unguided_shape.clone(),
                },
            )?;
            let [mut noise_pred_uncond, noise_pred_text] = halves;
            apply_guidance(&mut noise_pred_uncond, &noise_pred_text, request.guidance_scale)?;
            noise_pred_uncond
        } else {
            noise_pred
        };

        latents = scheduler.step(&guided_pred, timestep, &latents)?;
        tracing::debug!(step = step_index + 1, total = timesteps.len(), "step done");
        on_step(step_index + 1);
    }

    Ok(latents)
}
