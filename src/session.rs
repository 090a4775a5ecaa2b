use crate::error::ScopeError;
use crate::scpi::{Protocol, ResourceAddress, TcpTransport, Transport};
use crate::types::{
    AcquisitionResult, ChannelConfig, ChannelIndex, TriggerConfig, WaveformFormat,
};
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Timeouts applied by an [`AcquisitionSession`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use scope_acq::SessionConfig;
///
/// let config = SessionConfig {
///     acquisition_timeout: Duration::from_secs(60),
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.command_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for establishing the TCP connection
    pub connect_timeout: Duration,
    /// Timeout for ordinary command and query round trips
    pub command_timeout: Duration,
    /// Timeout for `*OPC?` after reset and configuration
    pub opc_timeout: Duration,
    /// Timeout for `*OPC?` after arming a single acquisition
    pub acquisition_timeout: Duration,
    /// Pause between `*CLS` and `*RST`
    pub reset_settle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            opc_timeout: Duration::from_secs(20),
            acquisition_timeout: Duration::from_secs(20),
            reset_settle: Duration::from_millis(500),
        }
    }
}

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Configured,
    Armed,
    Acquired,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connected => "Connected",
            SessionState::Configured => "Configured",
            SessionState::Armed => "Armed",
            SessionState::Acquired => "Acquired",
        };
        f.write_str(name)
    }
}

const SETUP_STATES: &[SessionState] = &[SessionState::Connected, SessionState::Configured];
const OPEN_STATES: &[SessionState] = &[
    SessionState::Connected,
    SessionState::Configured,
    SessionState::Armed,
    SessionState::Acquired,
];

/// Builder for [`AcquisitionSession`] over a TCP socket.
///
/// ```no_run
/// use std::time::Duration;
/// use scope_acq::AcquisitionSession;
///
/// let session = AcquisitionSession::builder()
///     .address("TCPIP::192.168.1.100::INSTR")
///     .opc_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct AcquisitionSessionBuilder {
    address: Option<String>,
    config: SessionConfig,
}

impl AcquisitionSessionBuilder {
    /// Instrument resource string, e.g. `TCPIP::<host>::INSTR`
    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn opc_timeout(mut self, timeout: Duration) -> Self {
        self.config.opc_timeout = timeout;
        self
    }

    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = timeout;
        self
    }

    /// Resolve the address, open the socket and return a connected session
    pub fn build(self) -> Result<AcquisitionSession<TcpTransport>, ScopeError> {
        let address = self.address.ok_or_else(|| ScopeError::Connection {
            address: String::new(),
            reason: "Address must be specified".to_string(),
        })?;

        let resource = ResourceAddress::parse(&address)?;
        let transport = TcpTransport::connect(
            &resource,
            self.config.connect_timeout,
            self.config.command_timeout,
        )?;
        info!("Connected to instrument at {address}");

        AcquisitionSession::with_transport(transport, self.config)
    }
}

/// One connection to an oscilloscope, driven through a single-shot capture.
///
/// The session owns its transport and closes it on [`disconnect`] or when
/// dropped, whichever comes first. Operations called in the wrong lifecycle
/// state fail with [`ScopeError::InvalidState`] without touching the
/// instrument.
///
/// ```no_run
/// use scope_acq::{AcquisitionSession, ChannelIndex, WaveformFormat};
///
/// let mut session = AcquisitionSession::connect("TCPIP::192.168.1.100::INSTR")?;
/// session.configure_timebase(0.05)?;
/// session.start_single_acquisition()?;
/// let result = session.acquire(ChannelIndex::new(1)?, WaveformFormat::Real32)?;
/// session.disconnect()?;
/// println!("{} samples", result.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// [`disconnect`]: AcquisitionSession::disconnect
pub struct AcquisitionSession<T: Transport = TcpTransport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    timebase_s: Option<f64>,
}

impl AcquisitionSession<TcpTransport> {
    /// Connect with default timeouts
    pub fn connect(address: &str) -> Result<Self, ScopeError> {
        Self::builder().address(address).build()
    }

    pub fn builder() -> AcquisitionSessionBuilder {
        AcquisitionSessionBuilder::default()
    }
}

impl<T: Transport> AcquisitionSession<T> {
    /// Wrap an already open transport
    pub fn with_transport(mut transport: T, config: SessionConfig) -> Result<Self, ScopeError> {
        transport.set_timeout(config.command_timeout)?;
        Ok(Self {
            transport,
            config,
            state: SessionState::Connected,
            timebase_s: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Acquisition window set by [`configure_timebase`](Self::configure_timebase)
    pub fn timebase(&self) -> Option<f64> {
        self.timebase_s
    }

    fn require(&self, allowed: &[SessionState], operation: &str) -> Result<(), ScopeError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        let expected = allowed
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(ScopeError::InvalidState {
            expected: format!("{expected} for {operation}"),
            actual: self.state.to_string(),
        })
    }

    fn write(&mut self, command: &str) -> Result<(), ScopeError> {
        debug!("Write: {command}");
        self.transport.write_line(command)
    }

    fn query(&mut self, command: &str) -> Result<String, ScopeError> {
        debug!("Query: {command}");
        let response = self.transport.query(command)?;
        debug!("Response: {response}");
        Ok(response)
    }

    /// Block on `*OPC?` with `timeout`, then restore the command timeout
    fn wait_opc(&mut self, timeout: Duration, what: &str) -> Result<(), ScopeError> {
        self.transport.set_timeout(timeout)?;
        let result = self.query("*OPC?");
        let restored = self.transport.set_timeout(self.config.command_timeout);

        let response = result.map_err(|e| match e {
            ScopeError::Timeout(_) => {
                ScopeError::Timeout(format!("{what} did not complete within {timeout:?}"))
            }
            other => other,
        })?;
        restored?;
        Protocol::check_opc(&response)
    }

    /// Query the `*IDN?` identification string
    pub fn identify(&mut self) -> Result<String, ScopeError> {
        self.require(OPEN_STATES, "identify")?;
        let idn = self.query("*IDN?")?;
        info!("Oscilloscope identification: {idn}");
        Ok(idn)
    }

    /// Clear status and reset the instrument to its default setup
    pub fn reset(&mut self) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "reset")?;
        self.write("*CLS")?;
        std::thread::sleep(self.config.reset_settle);
        self.write("*RST")?;
        self.wait_opc(self.config.opc_timeout, "Reset")?;
        self.timebase_s = None;
        self.state = SessionState::Connected;
        info!("Instrument reset");
        Ok(())
    }

    /// Apply range, offset, coupling and on/off state of one channel.
    ///
    /// Each setting is a separate command; a failure part way leaves the
    /// earlier settings applied.
    pub fn configure_channel(&mut self, channel: &ChannelConfig) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "configure_channel")?;
        if !channel.range_v.is_finite() || channel.range_v <= 0.0 {
            return Err(ScopeError::InvalidValue(format!(
                "Vertical range must be positive, got {}",
                channel.range_v
            )));
        }
        if !channel.offset_v.is_finite() {
            return Err(ScopeError::InvalidValue(format!(
                "Vertical offset must be finite, got {}",
                channel.offset_v
            )));
        }

        let ch = channel.channel;
        self.write(&format!("{ch}:RANG {}", channel.range_v))?;
        self.write(&format!("{ch}:POS {}", channel.offset_v))?;
        self.write(&format!("{ch}:COUP {}", channel.coupling.scpi_token()))?;
        self.write(&format!(
            "{ch}:STAT {}",
            if channel.enabled { "ON" } else { "OFF" }
        ))?;

        self.state = SessionState::Configured;
        info!(
            "{ch} configured: range {} V, offset {} V, coupling {}, {}",
            channel.range_v,
            channel.offset_v,
            channel.coupling.name(),
            if channel.enabled { "on" } else { "off" }
        );
        Ok(())
    }

    /// Show or hide a channel's trace on the instrument display
    pub fn set_channel_display(
        &mut self,
        channel: ChannelIndex,
        on: bool,
    ) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "set_channel_display")?;
        self.write(&format!("{channel}:DISP {}", if on { "ON" } else { "OFF" }))?;
        self.state = SessionState::Configured;
        Ok(())
    }

    pub fn configure_trigger(&mut self, trigger: &TriggerConfig) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "configure_trigger")?;
        if !trigger.level_v.is_finite() {
            return Err(ScopeError::InvalidValue(format!(
                "Trigger level must be finite, got {}",
                trigger.level_v
            )));
        }

        self.write(&format!("TRIG1:MODE {}", trigger.mode.scpi_token()))?;
        self.write(&format!("TRIG1:SOUR {}", trigger.source))?;
        self.write(&format!("TRIG1:TYPE {}", trigger.trigger_type.scpi_token()))?;
        self.write(&format!("TRIG1:EDGE:SLOP {}", trigger.slope.scpi_token()))?;
        self.write(&format!("TRIG1:LEV1 {}", trigger.level_v))?;

        self.state = SessionState::Configured;
        info!(
            "Trigger configured: {:?} {:?} on {} at {} V",
            trigger.mode, trigger.slope, trigger.source, trigger.level_v
        );
        Ok(())
    }

    /// Set the acquisition window length in seconds
    pub fn configure_timebase(&mut self, duration_s: f64) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "configure_timebase")?;
        if !duration_s.is_finite() || duration_s <= 0.0 {
            return Err(ScopeError::InvalidValue(format!(
                "Acquisition time must be positive, got {duration_s}"
            )));
        }
        self.write(&format!("TIM:RANG {duration_s}"))?;
        self.timebase_s = Some(duration_s);
        self.state = SessionState::Configured;
        info!("Timebase set to {duration_s} s");
        Ok(())
    }

    /// Fix the record length instead of deriving it from the sample rate
    pub fn set_record_length(&mut self, points: u32) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "set_record_length")?;
        if points == 0 {
            return Err(ScopeError::InvalidValue(
                "Record length must be at least one point".to_string(),
            ));
        }
        self.write("ACQ:POIN:AUTO RECL")?;
        self.write(&format!("ACQ:POIN {points}"))?;
        self.state = SessionState::Configured;
        info!("Record length set to {points} points");
        Ok(())
    }

    /// Largest record length the instrument supports with the current setup
    pub fn max_record_length(&mut self) -> Result<u64, ScopeError> {
        self.require(OPEN_STATES, "max_record_length")?;
        let response = self.query("ACQ:POIN:MAX?")?;
        let trimmed = response.trim();
        // Some firmware answers in scientific notation
        trimmed
            .parse::<u64>()
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map(|v| v as u64)
            })
            .ok_or_else(|| {
                ScopeError::Protocol(format!("Invalid ACQ:POIN:MAX? response: {response:?}"))
            })
    }

    /// Wait until all previously sent settings have been applied
    pub fn wait_for_settings(&mut self) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "wait_for_settings")?;
        self.wait_opc(self.config.opc_timeout, "Instrument setup")
    }

    /// Arm a single-shot capture and block until the instrument reports it
    /// complete. A timeout is final: the session stays armed and cannot
    /// fetch data.
    pub fn start_single_acquisition(&mut self) -> Result<(), ScopeError> {
        self.require(SETUP_STATES, "start_single_acquisition")?;
        self.write("SING")?;
        self.state = SessionState::Armed;
        info!(
            "Single acquisition armed, waiting up to {:?}",
            self.config.acquisition_timeout
        );

        self.wait_opc(self.config.acquisition_timeout, "Acquisition")?;
        self.state = SessionState::Acquired;
        info!("Acquisition complete");
        Ok(())
    }

    /// Read the captured samples of `channel` in the requested encoding
    pub fn fetch_waveform(
        &mut self,
        channel: ChannelIndex,
        format: WaveformFormat,
    ) -> Result<Vec<f32>, ScopeError> {
        self.require(&[SessionState::Acquired], "fetch_waveform")?;
        let command = format!("{};:{channel}:DATA?", format.scpi_prefix());

        let samples = match format {
            WaveformFormat::Ascii => {
                let response = self.query(&command)?;
                Protocol::parse_ascii_floats(&response)?
            }
            WaveformFormat::Real32 => {
                self.write(&command)?;
                let payload = self.transport.read_block()?;
                Protocol::decode_f32_le(&payload)?
            }
        };

        info!("Fetched {} samples from {channel} ({format:?})", samples.len());
        Ok(samples)
    }

    /// Fetch `channel` and pair the samples with the configured time window
    pub fn acquire(
        &mut self,
        channel: ChannelIndex,
        format: WaveformFormat,
    ) -> Result<AcquisitionResult, ScopeError> {
        let duration_s = self.timebase_s.ok_or_else(|| {
            ScopeError::InvalidValue(
                "Timebase must be configured before building a time axis".to_string(),
            )
        })?;
        let samples = self.fetch_waveform(channel, format)?;
        if samples.is_empty() {
            warn!("{channel} returned an empty waveform");
        }
        Ok(AcquisitionResult::from_samples(channel, samples, duration_s))
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn disconnect(&mut self) -> Result<(), ScopeError> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        self.state = SessionState::Disconnected;
        self.transport.close()?;
        info!("Disconnected from instrument");
        Ok(())
    }
}

impl<T: Transport> Drop for AcquisitionSession<T> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Failed to close instrument session: {e}");
        }
    }
}
