pub mod config;
pub mod error;
pub mod export;
pub mod plotting;
pub mod scpi;
pub mod sequence;
pub mod session;
pub mod types;

pub use config::{load_config, AppConfig};
pub use error::ScopeError;
pub use export::{timestamped_path, to_csv, write_csv};
pub use plotting::plot_waveform;
pub use scpi::{MockTransport, Reply, ResourceAddress, TcpTransport, Transport};
pub use sequence::{acquire_to_csv, AcquisitionPlan};
pub use session::{AcquisitionSession, AcquisitionSessionBuilder, SessionConfig, SessionState};
pub use types::{
    AcquisitionResult, ChannelConfig, ChannelIndex, Coupling, TriggerConfig, TriggerMode,
    TriggerSlope, TriggerType, WaveformFormat,
};
