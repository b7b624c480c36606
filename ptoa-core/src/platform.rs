//! Platform selection by name.

use std::sync::Arc;

use anyhow::{Context, Result};
use fletcher_runtime::{Platform, SimConfig, SimPlatform};
#[cfg(unix)]
use fletcher_runtime::{AwsSimInitOptions, InitData};
use tracing::info;

use crate::model::PtoaKernelModel;
use crate::{HarnessConfig, SIM_PLATFORM};

/// Fletcher's AWS F1 simulation platform.
pub const AWS_SIM_PLATFORM: &str = "aws_sim";

/// Create the platform named in the config. The platform is not initialized.
pub fn open_platform(config: &HarnessConfig) -> Result<Arc<dyn Platform>> {
    info!("Creating platform '{}'", config.platform);
    if config.platform == SIM_PLATFORM {
        let sim = SimPlatform::new(
            Box::new(PtoaKernelModel::new(config.reg_base)),
            SimConfig {
                busy_polls: config.sim_busy_polls,
                ..SimConfig::default()
            },
        )
        .context("Could not create Fletcher platform.")?;
        return Ok(Arc::new(sim));
    }
    open_library_platform(config)
}

/// Init options passed to a loaded platform library's `platformInit`.
#[cfg(unix)]
pub fn init_data(config: &HarnessConfig) -> InitData {
    if config.platform == AWS_SIM_PLATFORM {
        InitData::AwsSim(AwsSimInitOptions {
            no_ddr_init: i32::from(config.skip_ddr_init),
        })
    } else {
        InitData::None
    }
}

#[cfg(unix)]
fn open_library_platform(config: &HarnessConfig) -> Result<Arc<dyn Platform>> {
    use fletcher_runtime::DylibPlatform;

    let platform =
        DylibPlatform::load(&config.platform).context("Could not create Fletcher platform.")?;
    platform.set_init_data(init_data(config));
    Ok(Arc::new(platform))
}

#[cfg(not(unix))]
fn open_library_platform(config: &HarnessConfig) -> Result<Arc<dyn Platform>> {
    anyhow::bail!(
        "Could not create Fletcher platform. '{}' requires a Unix platform library",
        config.platform
    )
}
