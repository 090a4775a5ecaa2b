use log::info;
use std::path::Path;

use crate::error::ScopeError;
use crate::export;
use crate::scpi::Transport;
use crate::session::AcquisitionSession;
use crate::types::{AcquisitionResult, ChannelConfig, TriggerConfig, WaveformFormat};

/// Everything needed to take one single-shot capture
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    /// Clear status and reset before configuring
    pub reset: bool,
    pub channel: ChannelConfig,
    pub trigger: TriggerConfig,
    /// Acquisition window in seconds
    pub duration_s: f64,
    pub record_length: Option<u32>,
    pub format: WaveformFormat,
}

impl Default for AcquisitionPlan {
    fn default() -> Self {
        Self {
            reset: true,
            channel: ChannelConfig::default(),
            trigger: TriggerConfig::default(),
            duration_s: 0.05,
            record_length: Some(1_000_000),
            format: WaveformFormat::Real32,
        }
    }
}

impl AcquisitionPlan {
    /// Run the fixed setup, arm, wait and fetch sequence on `session`.
    ///
    /// Stops at the first error; nothing is rolled back on the instrument.
    pub fn execute<T: Transport>(
        &self,
        session: &mut AcquisitionSession<T>,
    ) -> Result<AcquisitionResult, ScopeError> {
        if self.reset {
            session.reset()?;
        }

        session.configure_timebase(self.duration_s)?;
        if let Some(points) = self.record_length {
            session.set_record_length(points)?;
        }
        session.configure_channel(&self.channel)?;
        session.configure_trigger(&self.trigger)?;
        session.wait_for_settings()?;

        session.start_single_acquisition()?;
        session.acquire(self.channel.channel, self.format)
    }
}

/// Execute `plan` and write the result to `csv_path`.
///
/// The file is only created once the waveform has been fetched.
pub fn acquire_to_csv<T: Transport>(
    session: &mut AcquisitionSession<T>,
    plan: &AcquisitionPlan,
    csv_path: &Path,
) -> Result<AcquisitionResult, ScopeError> {
    let result = plan.execute(session)?;
    info!(
        "Acquired {} samples from {} at {}",
        result.len(),
        result.channel,
        result.acquired_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    );
    export::to_csv(csv_path, result.time(), result.voltage())?;
    Ok(result)
}
