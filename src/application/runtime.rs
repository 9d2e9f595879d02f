// ============================================================
// Layer 2 — Run Configuration: Device and Backend
// ============================================================
// The device is picked once, in the run configuration, and the
// whole pipeline runs on the matching Burn backend:
//
//   DeviceKind::Cpu → Autodiff<NdArray>   (inner: NdArray)
//   DeviceKind::Gpu → Autodiff<Wgpu>      (inner: Wgpu)
//
// Use cases write their pipeline once, generic over
// `B: AutodiffBackend`, and `dispatch` picks the instantiation.
//
// Reference: Burn Book §2 (Backends)

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};

pub type CpuBackend = Autodiff<NdArray>;
pub type GpuBackend = Autodiff<Wgpu>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Gpu,
}

/// A pipeline body that can run on any autodiff backend.
pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<Self::Output>;
}

/// Seed the chosen backend and run `task` on it.
pub fn dispatch<T: BackendTask>(kind: DeviceKind, seed: u64, task: T) -> Result<T::Output> {
    match kind {
        DeviceKind::Cpu => {
            let device = NdArrayDevice::Cpu;
            tracing::info!("Using NdArray device: {:?}", device);
            CpuBackend::seed(seed);
            task.run::<CpuBackend>(device)
        }
        DeviceKind::Gpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            GpuBackend::seed(seed);
            task.run::<GpuBackend>(device)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(u32);

    impl BackendTask for Echo {
        type Output = (u32, bool);

        fn run<B: AutodiffBackend>(self, _device: B::Device) -> Result<Self::Output> {
            Ok((self.0, B::ad_enabled()))
        }
    }

    #[test]
    fn test_cpu_dispatch_runs_on_autodiff_backend() {
        let (value, autodiff) = dispatch(DeviceKind::Cpu, 42, Echo(7)).unwrap();
        assert_eq!(value, 7);
        assert!(autodiff);
    }

    #[test]
    fn test_device_kind_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&DeviceKind::Gpu).unwrap(), "\"gpu\"");
        let back: DeviceKind = serde_json::from_str("\"cpu\"").unwrap();
        assert_eq!(back, DeviceKind::Cpu);
    }
}
