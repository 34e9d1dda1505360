//! Integration tests for the quant-clip crate.
//!
//! These exercise the module inside training flows: optimizer steps on trainable
//! bounds, composition with other burn layers, checkpoint round-trips and the
//! range-fitting loop. All use the NdArray backend and synthetic data.

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::{Distribution, TensorData};
use tempfile::TempDir;

use quant_clip::training::checkpoint::{load_clip, save_checkpoint, CheckpointMeta};
use quant_clip::training::trainer::{train, ClipBatch, ClipTrainingConfig};
use quant_clip::{Clip, ClipBound, ClipConfig};

type TestBackend = NdArray<f32>;
type TestAutodiffBackend = Autodiff<NdArray<f32>>;

fn values<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap()
}

fn scalar<B: Backend, const D: usize>(t: Tensor<B, D>) -> f32 {
    t.into_scalar().elem()
}

fn trainable<B: Backend, const D: usize>(bound: &ClipBound<B, D>) -> &Param<Tensor<B, D>> {
    match bound {
        ClipBound::Trainable(param) => param,
        ClipBound::Constant(_) => panic!("expected a trainable bound"),
    }
}

// ---------------------------------------------------------------------------
// Test 1: fixed ReLU6-style range
// ---------------------------------------------------------------------------

#[test]
fn test_fixed_range_scenario() {
    let device = Default::default();
    let clip = ClipConfig::new(0.0, 6.0).init::<TestBackend, 1>(&device);
    let input = Tensor::<TestBackend, 1>::from_data(
        TensorData::from([-2.0_f32, 0.0, 3.0, 6.0, 10.0]),
        &device,
    );

    let output = clip.forward(input);
    assert_eq!(output.dims(), [5]);
    assert_eq!(values(output), vec![0.0, 0.0, 3.0, 6.0, 6.0]);
    assert_eq!(clip.num_params(), 0);
}

// ---------------------------------------------------------------------------
// Test 2: learnable lower bound moves under a gradient step, upper stays put
// ---------------------------------------------------------------------------

#[test]
fn test_learn_min_gradient_step() {
    let device = Default::default();
    let clip = ClipConfig::new(-1.0, 1.0)
        .with_learn_min(true)
        .init::<TestAutodiffBackend, 1>(&device);

    assert!(clip.lower().is_trainable());
    assert!(!clip.upper().is_trainable());
    assert_eq!(scalar(clip.lower_value()), -1.0);
    assert_eq!(clip.num_params(), 1);

    // -3.0 is pinned to the lower bound, so d(sum)/d(lower) = 1
    let input = Tensor::<TestAutodiffBackend, 1>::from_data(
        TensorData::from([-3.0_f32, 0.5, 2.0]),
        &device,
    );
    let loss = clip.forward(input).sum();
    let grads = GradientsParams::from_grads(loss.backward(), &clip);

    let lower_grad = grads
        .get::<NdArray<f32>, 1>(trainable(clip.lower()).id)
        .expect("lower bound should be in the gradient set");
    assert_eq!(values(lower_grad), vec![1.0]);

    let mut optim = SgdConfig::new().init();
    let clip = optim.step(0.1, clip, grads);

    let lower = scalar(clip.lower_value());
    assert!((lower - (-1.1)).abs() < 1e-6, "expected -1.1 after one step, got {lower}");
    assert_eq!(scalar(clip.upper_value()), 1.0);
}

// ---------------------------------------------------------------------------
// Test 3: clip inside a small model, gradients reach the linear layer and the
// trainable upper bound
// ---------------------------------------------------------------------------

#[derive(Module, Debug)]
struct ClippedLinear<B: Backend> {
    linear: Linear<B>,
    clip: Clip<B, 2>,
}

impl<B: Backend> ClippedLinear<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.clip.forward(self.linear.forward(x))
    }
}

#[test]
fn test_clip_composes_into_model() {
    let device = Default::default();
    let model = ClippedLinear {
        linear: LinearConfig::new(8, 4).init::<TestAutodiffBackend>(&device),
        clip: ClipConfig::new(-0.5, 0.5)
            .with_learn_max(true)
            .init(&device),
    };

    // Linear: 8*4 + 4, clip: one scalar upper bound
    assert_eq!(model.num_params(), 37);

    let input = Tensor::<TestAutodiffBackend, 2>::random(
        [16, 8],
        Distribution::Normal(0.0, 3.0),
        &device,
    );
    let loss = model.forward(input).sum();
    let grads = GradientsParams::from_grads(loss.backward(), &model);

    let upper_grad = grads
        .get::<NdArray<f32>, 2>(trainable(model.clip.upper()).id)
        .expect("upper bound should have gradient");
    assert!(
        scalar(upper_grad) > 0.0,
        "some outputs should be pinned to the upper bound"
    );
    assert!(grads.get::<NdArray<f32>, 2>(model.linear.weight.id).is_some());
}

// ---------------------------------------------------------------------------
// Test 4: per-channel bounds on a 4D activation
// ---------------------------------------------------------------------------

#[test]
fn test_per_channel_bounds_4d() {
    let device = Default::default();
    let lo = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.0_f32, -1.0]), &device)
        .reshape([1, 2, 1, 1]);
    let hi = Tensor::<TestBackend, 1>::from_data(TensorData::from([1.0_f32, 0.0]), &device)
        .reshape([1, 2, 1, 1]);
    let clip = Clip::from_tensors(lo, hi, true, false);
    assert_eq!(clip.num_params(), 2);

    let input = Tensor::<TestBackend, 4>::random(
        [3, 2, 4, 4],
        Distribution::Uniform(-5.0, 5.0),
        &device,
    );
    let output = clip.try_forward(input).unwrap();
    assert_eq!(output.dims(), [3, 2, 4, 4]);

    let channel0 = values(output.clone().slice([0..3, 0..1, 0..4, 0..4]));
    assert!(channel0.iter().all(|v| (0.0..=1.0).contains(v)));
    let channel1 = values(output.slice([0..3, 1..2, 0..4, 0..4]));
    assert!(channel1.iter().all(|v| (-1.0..=0.0).contains(v)));
}

// ---------------------------------------------------------------------------
// Test 5: fit a range, checkpoint it, and restore into a fresh module
// ---------------------------------------------------------------------------

#[test]
fn test_fit_checkpoint_restore() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let clip_config = ClipConfig::new(-0.5, 0.5)
        .with_learn_min(true)
        .with_learn_max(true);
    let clip = clip_config.init::<TestAutodiffBackend, 2>(&device);

    let training = ClipTrainingConfig::new()
        .with_total_steps(30)
        .with_lr(0.05)
        .with_log_interval(10);
    let mut sampler = |_step: usize| {
        Ok::<_, anyhow::Error>(ClipBatch::reconstruct(Tensor::random(
            [64, 4],
            Distribution::Uniform(-3.0, 3.0),
            &device,
        )))
    };
    let output = train(&training, clip, &mut sampler).unwrap();

    let lower = scalar(output.clip.lower_value());
    let upper = scalar(output.clip.upper_value());
    assert!(lower < -0.5, "lower bound should widen, got {lower}");
    assert!(upper > 0.5, "upper bound should widen, got {upper}");
    assert_eq!(output.history.len(), 3);
    let (_, last) = output.history.last().unwrap();
    assert!(last.clipped_fraction() > 0.0);

    let meta = CheckpointMeta {
        step: 30,
        trained_steps: output.trained_steps,
        skipped_steps: output.skipped_steps,
        lower_mean: lower as f64,
        upper_mean: upper as f64,
        learn_min: true,
        learn_max: true,
    };
    save_checkpoint(tmp.path(), &output.clip, &meta).unwrap();

    // Restore on the plain (non-autodiff) backend for inference
    let restored = load_clip::<TestBackend, 2>(tmp.path(), &clip_config, &device).unwrap();
    assert!((scalar(restored.lower_value()) - lower).abs() < 1e-6);
    assert!((scalar(restored.upper_value()) - upper).abs() < 1e-6);
    assert!(restored.check_range().is_ok());
}

// ---------------------------------------------------------------------------
// Test 6: inference copy of a trained module drops the autodiff graph
// ---------------------------------------------------------------------------

#[test]
fn test_valid_module_matches_forward() {
    use burn::module::AutodiffModule;

    let device = Default::default();
    let clip = ClipConfig::new(-2.0, 2.0)
        .with_learn_max(true)
        .init::<TestAutodiffBackend, 2>(&device);
    let inner: Clip<TestBackend, 2> = clip.valid();

    let data = TensorData::from([[-3.0_f32, 1.0, 5.0]]);
    let out_train = clip.forward(Tensor::from_data(data.clone(), &device));
    let out_valid = inner.forward(Tensor::from_data(data, &device));
    assert_eq!(values(out_train), values(out_valid));
    assert!(inner.upper().is_trainable());
}
