//! Burn modules for the voxel shape autoencoder.
//!
//! - `VoxelEncoder`: flattened occupancy grid to a latent shape code.
//! - `ImplicitDecoder`: (xyz, code) pairs to occupancy in `[0, 1]`.
//! - `ShapeAutoencoder`: encoder + decoder, trained across the whole dataset.
//! - `ShapeCodeModel`: a single learnable code plus a decoder, used when a
//!   pretrained model is fine-tuned on one shape.
//!
//! These are plain Burn modules; checkpoint handling and optimizers live in
//! the `training` crate.

use burn::module::{Module, Param};
use burn::nn;
use burn::tensor::activation::{leaky_relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use data_contracts::ExperimentSpecs;

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeAutoencoderConfig {
    pub voxel_resolution: usize,
    pub code_length: usize,
    pub encoder_hidden: usize,
    pub decoder_dims: Vec<usize>,
    pub leaky_slope: f64,
}

impl ShapeAutoencoderConfig {
    pub fn from_specs(specs: &ExperimentSpecs, voxel_resolution: usize) -> Self {
        Self {
            voxel_resolution,
            code_length: specs.code_length,
            encoder_hidden: specs.network_specs.encoder_hidden,
            decoder_dims: specs.network_specs.decoder_dims.clone(),
            leaky_slope: specs.network_specs.leaky_slope,
        }
    }

    pub fn voxel_len(&self) -> usize {
        self.voxel_resolution.pow(3)
    }
}

#[derive(Debug, Module)]
pub struct VoxelEncoder<B: Backend> {
    hidden: nn::Linear<B>,
    code: nn::Linear<B>,
    leaky_slope: f64,
}

impl<B: Backend> VoxelEncoder<B> {
    pub fn new(cfg: &ShapeAutoencoderConfig, device: &B::Device) -> Self {
        Self {
            hidden: nn::LinearConfig::new(cfg.voxel_len(), cfg.encoder_hidden).init(device),
            code: nn::LinearConfig::new(cfg.encoder_hidden, cfg.code_length).init(device),
            leaky_slope: cfg.leaky_slope,
        }
    }

    /// `[B, R³]` occupancy to `[B, code_length]`.
    pub fn forward(&self, voxels: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = leaky_relu(self.hidden.forward(voxels), self.leaky_slope);
        self.code.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct ImplicitDecoder<B: Backend> {
    layers: Vec<nn::Linear<B>>,
    out: nn::Linear<B>,
    leaky_slope: f64,
}

impl<B: Backend> ImplicitDecoder<B> {
    pub fn new(cfg: &ShapeAutoencoderConfig, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(cfg.decoder_dims.len());
        let mut width = 3 + cfg.code_length;
        for &dim in &cfg.decoder_dims {
            layers.push(nn::LinearConfig::new(width, dim).init(device));
            width = dim;
        }
        Self {
            layers,
            out: nn::LinearConfig::new(width, 1).init(device),
            leaky_slope: cfg.leaky_slope,
        }
    }

    /// `[B, N, 3 + code_length]` to occupancy `[B, N, 1]`.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = input;
        for layer in &self.layers {
            x = leaky_relu(layer.forward(x), self.leaky_slope);
        }
        sigmoid(self.out.forward(x))
    }

    /// Broadcast one code per batch entry over its `N` query points.
    pub fn decode(&self, code: Tensor<B, 2>, xyz: Tensor<B, 3>) -> Tensor<B, 3> {
        let n = xyz.dims()[1];
        let code = code.unsqueeze_dim::<3>(1).repeat(&[1, n, 1]);
        self.forward(Tensor::cat(vec![xyz, code], 2))
    }
}

#[derive(Debug, Module)]
pub struct ShapeAutoencoder<B: Backend> {
    pub encoder: VoxelEncoder<B>,
    pub decoder: ImplicitDecoder<B>,
}

impl<B: Backend> ShapeAutoencoder<B> {
    pub fn new(cfg: &ShapeAutoencoderConfig, device: &B::Device) -> Self {
        Self {
            encoder: VoxelEncoder::new(cfg, device),
            decoder: ImplicitDecoder::new(cfg, device),
        }
    }

    pub fn encode(&self, voxels: Tensor<B, 2>) -> Tensor<B, 2> {
        self.encoder.forward(voxels)
    }

    pub fn decode(&self, code: Tensor<B, 2>, xyz: Tensor<B, 3>) -> Tensor<B, 3> {
        self.decoder.decode(code, xyz)
    }

    pub fn forward(&self, voxels: Tensor<B, 2>, xyz: Tensor<B, 3>) -> Tensor<B, 3> {
        let code = self.encode(voxels);
        self.decode(code, xyz)
    }
}

/// A single trainable latent code `[1, code_length]`.
#[derive(Debug, Module)]
pub struct ShapeCode<B: Backend> {
    code: Param<Tensor<B, 2>>,
}

impl<B: Backend> ShapeCode<B> {
    pub fn new(code: Tensor<B, 2>) -> Self {
        Self {
            code: Param::from_tensor(code),
        }
    }

    pub fn zeros(code_length: usize, device: &B::Device) -> Self {
        Self::new(Tensor::zeros([1, code_length], device))
    }

    pub fn value(&self) -> Tensor<B, 2> {
        self.code.val()
    }
}

#[derive(Debug, Module)]
pub struct ShapeCodeModel<B: Backend> {
    pub code: ShapeCode<B>,
    pub decoder: ImplicitDecoder<B>,
}

impl<B: Backend> ShapeCodeModel<B> {
    /// Zero code and freshly initialized decoder; the shape used when loading a saved record.
    pub fn init(cfg: &ShapeAutoencoderConfig, device: &B::Device) -> Self {
        Self {
            code: ShapeCode::zeros(cfg.code_length, device),
            decoder: ImplicitDecoder::new(cfg, device),
        }
    }

    pub fn from_parts(code: ShapeCode<B>, decoder: ImplicitDecoder<B>) -> Self {
        Self { code, decoder }
    }

    pub fn forward(&self, xyz: Tensor<B, 3>) -> Tensor<B, 3> {
        self.decoder.decode(self.code.value(), xyz)
    }
}
