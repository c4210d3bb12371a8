use candle_core::Device;
use tracing::info;
#[cfg(feature = "metal")]
use tracing::warn;

/// Metal when built with the `metal` feature and a GPU answers, otherwise CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(dev) => {
            info!(device = "metal", "selected compute device");
            return dev;
        }
        Err(e) => warn!(error = %e, "metal unavailable, falling back to cpu"),
    }
    info!(device = "cpu", "selected compute device");
    Device::Cpu
}
