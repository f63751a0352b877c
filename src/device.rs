//! Compute device selection for model-backed retrievers.

use candle_core::Device;

use crate::{
   config,
   error::{EmbeddingError, Error, Result},
};

/// Resolves a device preference: `auto`, `cpu`, `cuda`, `cuda:N`, `metal` or
/// `mps`. `disable_gpu` in the configuration forces the CPU.
pub fn select_device(preference: &str) -> Result<Device> {
   if config::get().disable_gpu {
      return Ok(Device::Cpu);
   }

   let preference = preference.trim().to_ascii_lowercase();
   let device = match preference.as_str() {
      "" | "auto" => {
         let device = Device::cuda_if_available(0)?;
         if device.is_cpu() { Device::metal_if_available(0)? } else { device }
      },
      "cpu" => Device::Cpu,
      "metal" | "mps" => Device::new_metal(0)
         .map_err(|_| EmbeddingError::DeviceUnavailable(preference.clone()))?,
      other => match parse_cuda_ordinal(other) {
         Some(ordinal) => Device::new_cuda(ordinal)
            .map_err(|_| EmbeddingError::DeviceUnavailable(preference.clone()))?,
         None => {
            return Err(Error::invalid(format!(
               "unknown device '{other}' (expected: auto|cpu|cuda[:N]|metal|mps)"
            )));
         },
      },
   };

   tracing::debug!(requested = %preference, device = ?device, "selected device");
   Ok(device)
}

fn parse_cuda_ordinal(preference: &str) -> Option<usize> {
   match preference.strip_prefix("cuda")? {
      "" => Some(0),
      rest => rest.strip_prefix(':')?.parse().ok(),
   }
}
