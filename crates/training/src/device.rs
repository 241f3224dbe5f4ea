use crate::TrainBackend;
use burn::tensor::backend::Backend;

pub type TrainDevice = <TrainBackend as Backend>::Device;

/// Device for the compiled backend; `gpu` picks the adapter ordinal on GPU builds.
#[cfg(feature = "backend-wgpu")]
pub fn select_device(gpu: usize) -> TrainDevice {
    tracing::info!(gpu, "using wgpu discrete adapter");
    burn_wgpu::WgpuDevice::DiscreteGpu(gpu)
}

#[cfg(not(feature = "backend-wgpu"))]
pub fn select_device(gpu: usize) -> TrainDevice {
    if gpu != 0 {
        tracing::info!(
            gpu,
            "built without backend-wgpu; ignoring --gpu and running on the CPU"
        );
    }
    burn_ndarray::NdArrayDevice::Cpu
}
