use candle_core::Device;

/// Select the device used to run the model.
///
/// Prefers the accelerator compiled in through the `cuda` or `metal` features and falls back
/// to the CPU when it cannot be opened. The returned device is meant to be kept for the
/// whole lifetime of the process.
///
/// # Arguments
///
/// * `force_cpu` - Skip the accelerator lookup and run on the CPU.
pub fn select_device(force_cpu: bool) -> Device {
    if force_cpu {
        log::info!("Running on CPU (forced)");
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    match Device::new_cuda(0) {
        Ok(device) => {
            log::info!("Running on CUDA device 0");
            return device;
        }
        Err(e) => log::warn!("CUDA not available, defaulting to CPU: {e}"),
    }

    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            log::info!("Running on Metal device 0");
            return device;
        }
        Err(e) => log::warn!("Metal not available, defaulting to CPU: {e}"),
    }

    log::info!("Running on CPU");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_cpu() {
        assert!(select_device(true).is_cpu());
    }
}
