//! Entity and configuration types of the radio medium.
//!
//! Radios are plain descriptors owned by the medium by value; everything the
//! medium derives from them (transmissions, arrivals, receptions, decisions)
//! is an immutable record identified by id, never by owning pointer.

use serde::Deserialize;

use crate::common::geometry::Coord;
use crate::kernel::SimTime;
use crate::linklayer::mac_address::MacAddress;

/// Stable identifier of a radio. Assigned by the medium, never reused.
pub type RadioId = u32;

/// Stable identifier of a transmission. Monotonically increasing.
pub type TransmissionId = u64;

/// Operating mode of a radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Off,
    Receiver,
    Transmitter,
    Transceiver,
}

impl RadioMode {
    /// True for the modes in which the radio can receive.
    pub fn is_receiving(&self) -> bool {
        matches!(self, RadioMode::Receiver | RadioMode::Transceiver)
    }
}

/// Straight-line motion: position is linear in time around a reference
/// point. A zero velocity models a stationary radio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearMobility {
    pub position: Coord,
    pub velocity: Coord,
    pub reference_time: SimTime,
}

impl LinearMobility {
    pub fn stationary(position: Coord) -> Self {
        Self {
            position,
            velocity: Coord::ZERO,
            reference_time: 0.0,
        }
    }

    pub fn moving(position: Coord, velocity: Coord, reference_time: SimTime) -> Self {
        Self {
            position,
            velocity,
            reference_time,
        }
    }

    pub fn position_at(&self, time: SimTime) -> Coord {
        self.position + self.velocity * (time - self.reference_time)
    }

    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }
}

/// A radio antenna, reduced to its isotropic gain.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Antenna {
    /// Gain in dBi, applied on both transmit and receive.
    pub gain_db: f64,
}

impl Default for Antenna {
    fn default() -> Self {
        Self { gain_db: 0.0 }
    }
}

/// The band a radio listens on.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ListeningConfig {
    /// Center frequency in Hz.
    pub center_frequency: f64,
    /// Bandwidth in Hz.
    pub bandwidth: f64,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            center_frequency: 2.412e9,
            bandwidth: 20e6,
        }
    }
}

/// Analog transmit parameters of a radio.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransmitterConfig {
    /// Transmit power in dBm.
    pub power_dbm: f64,
    /// Net bitrate in bit/s; determines frame duration.
    pub bitrate: f64,
    /// Fixed preamble duration in seconds, added to every frame.
    pub preamble_duration: f64,
    /// Carrier center frequency in Hz.
    pub center_frequency: f64,
    /// Occupied bandwidth in Hz.
    pub bandwidth: f64,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            power_dbm: 20.0,
            bitrate: 1e6,
            preamble_duration: 0.0,
            center_frequency: 2.412e9,
            bandwidth: 20e6,
        }
    }
}

/// Reception thresholds of a radio.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Minimum power for a reception attempt, dBm.
    pub sensitivity_dbm: f64,
    /// Minimum power that registers as channel activity, dBm.
    pub energy_detection_dbm: f64,
    /// Minimum signal-to-noise-and-interference ratio for success, dB.
    pub snir_threshold_db: f64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            sensitivity_dbm: -85.0,
            energy_detection_dbm: -85.0,
            snir_threshold_db: 4.0,
        }
    }
}

/// A radio attached to the medium. The id is assigned by the medium when
/// the radio is added.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radio {
    pub(crate) id: RadioId,
    pub mac_address: MacAddress,
    pub mode: RadioMode,
    pub mobility: LinearMobility,
    pub antenna: Antenna,
    pub listening: ListeningConfig,
    pub transmitter: TransmitterConfig,
    pub receiver: ReceiverConfig,
}

impl Radio {
    /// A transceiver with default analog parameters, stationary at the
    /// origin. Adjust the public fields before handing it to the medium.
    pub fn new(mac_address: MacAddress) -> Self {
        Self {
            id: 0,
            mac_address,
            mode: RadioMode::Transceiver,
            mobility: LinearMobility::stationary(Coord::ZERO),
            antenna: Antenna::default(),
            listening: ListeningConfig::default(),
            transmitter: TransmitterConfig::default(),
            receiver: ReceiverConfig::default(),
        }
    }

    pub fn id(&self) -> RadioId {
        self.id
    }
}

/// A MAC-layer packet handed to the medium for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct MacPacket {
    pub destination: MacAddress,
    pub payload: Vec<u8>,
}

impl MacPacket {
    pub fn new(destination: MacAddress, payload: Vec<u8>) -> Self {
        Self { destination, payload }
    }

    pub fn bit_length(&self) -> usize {
        self.payload.len() * 8
    }
}

/// The unit of delivery between the medium and receiver radios.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub transmission_id: TransmissionId,
    pub packet: MacPacket,
}

/// An ongoing or recently finished transmission. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transmission {
    pub id: TransmissionId,
    pub transmitter_id: RadioId,
    pub destination: MacAddress,
    pub start_time: SimTime,
    pub end_time: SimTime,
    pub start_position: Coord,
    pub end_position: Coord,
    pub power_dbm: f64,
    pub center_frequency: f64,
    pub bandwidth: f64,
    pub bitrate: f64,
    pub antenna_gain_db: f64,
}

impl Transmission {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// When and where a transmission reaches a given receiver, accounting for
/// receiver motion between the transmission start and end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    pub start_time: SimTime,
    pub end_time: SimTime,
    pub start_position: Coord,
    pub end_position: Coord,
}

/// A receiver's intent to accept signals of a band during a time window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listening {
    pub start_time: SimTime,
    pub end_time: SimTime,
    pub center_frequency: f64,
    pub bandwidth: f64,
}

/// The signal a receiver observes from one transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reception {
    pub transmission_id: TransmissionId,
    pub start_time: SimTime,
    pub end_time: SimTime,
    pub start_position: Coord,
    pub end_position: Coord,
    pub power_dbm: f64,
}

/// Everything else on the medium during a listening window: background
/// noise plus the receptions of overlapping transmissions, referenced by
/// transmission id.
#[derive(Debug, Clone, PartialEq)]
pub struct Interference {
    /// Background noise power, dBm. Negative infinity when no background
    /// noise model is attached.
    pub noise_power_dbm: f64,
    /// (transmission id, reception power dBm) of each interferer.
    pub interfering_powers: Vec<(TransmissionId, f64)>,
}

impl Interference {
    /// Sum of noise and all interferer powers, in mW.
    pub fn total_power_mw(&self) -> f64 {
        let noise = crate::medium::signal::dbm_to_mw(self.noise_power_dbm);
        self.interfering_powers
            .iter()
            .fold(noise, |sum, (_, dbm)| sum + crate::medium::signal::dbm_to_mw(*dbm))
    }
}

/// Outcome of trying to lock onto a transmission's preamble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynchronizationDecision {
    pub attempted: bool,
    pub successful: bool,
    pub snir_db: f64,
}

/// Outcome of trying to receive a transmission's payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceptionDecision {
    pub attempted: bool,
    pub successful: bool,
    pub snir_db: f64,
}

/// Outcome of passively listening on the medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListeningDecision {
    pub busy: bool,
    /// Total observed power, dBm.
    pub power_dbm: f64,
}

/// A delivered packet together with the reception decision that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPacket {
    pub packet: MacPacket,
    pub decision: ReceptionDecision,
}

/// Range-based receiver pre-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeFilter {
    /// Every radio is a potential receiver.
    #[default]
    Anywhere,
    /// Only radios within the maximum interference range.
    InterferenceRange,
    /// Only radios within the maximum communication range.
    CommunicationRange,
}

/// Behavior switches of the radio medium.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediumConfig {
    pub range_filter: RangeFilter,
    /// Drop receivers that are neither in receiver nor transceiver mode.
    pub radio_mode_filter: bool,
    /// Drop receivers whose listening band is incompatible.
    pub listening_filter: bool,
    /// Drop unicast frames whose destination is another radio.
    pub mac_address_filter: bool,
    /// Append one line per transmit/receive event to the communication log.
    pub record_communication_log: bool,
    /// Directory the communication log is written to.
    pub result_dir: String,
    /// Configuration name used in the log file name.
    pub config_name: String,
    /// Run number used in the log file name.
    pub run_number: u32,
    /// Keep a figure record per live transmission.
    pub display_communication: bool,
    /// Retain successful-reception line segments.
    pub leave_communication_trail: bool,
    /// Minimum time overlap for two transmissions to interfere, seconds.
    pub min_interference_time: f64,
    /// Upper bound on the duration of any transmission, seconds.
    pub max_transmission_duration: f64,
    /// Overrides the computed maximum communication range, meters.
    pub max_communication_range: Option<f64>,
    /// Overrides the computed maximum interference range, meters.
    pub max_interference_range: Option<f64>,
    /// Overrides the derived interference window used for cache eviction,
    /// seconds past each transmission's end time.
    pub max_interference_window: Option<f64>,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            range_filter: RangeFilter::Anywhere,
            radio_mode_filter: false,
            listening_filter: false,
            mac_address_filter: false,
            record_communication_log: false,
            result_dir: "results".into(),
            config_name: "General".into(),
            run_number: 0,
            display_communication: false,
            leave_communication_trail: false,
            min_interference_time: 1e-3,
            max_transmission_duration: 10e-3,
            max_communication_range: None,
            max_interference_range: None,
            max_interference_window: None,
        }
    }
}

impl MediumConfig {
    /// Parses a JSON configuration and validates it.
    pub fn from_json_str(text: &str) -> crate::error::Result<Self> {
        let config: MediumConfig = serde_json::from_str(text).map_err(|error| {
            crate::error::Error::InvalidConfiguration(format!("bad medium config: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would silently break the medium.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;
        if !(self.min_interference_time >= 0.0 && self.min_interference_time.is_finite()) {
            return Err(Error::InvalidConfiguration(format!(
                "min_interference_time must be nonnegative and finite, got {}",
                self.min_interference_time
            )));
        }
        if !(self.max_transmission_duration > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "max_transmission_duration must be positive, got {}",
                self.max_transmission_duration
            )));
        }
        for (name, range) in [
            ("max_communication_range", self.max_communication_range),
            ("max_interference_range", self.max_interference_range),
            ("max_interference_window", self.max_interference_window),
        ] {
            if let Some(value) = range {
                if !(value > 0.0) {
                    return Err(Error::InvalidConfiguration(format!(
                        "{name} must be positive, got {value}"
                    )));
                }
            }
        }
        if self.record_communication_log && self.result_dir.is_empty() {
            return Err(Error::InvalidConfiguration(
                "record_communication_log needs a result_dir".into(),
            ));
        }
        Ok(())
    }
}

/// Extrema over the attached radios, recomputed whenever the population
/// changes. NaN means "unspecified" and disables the dependent filter.
#[derive(Debug, Clone, Copy)]
pub struct MediumLimits {
    pub max_speed: f64,
    pub max_transmission_power_dbm: f64,
    pub min_interference_power_dbm: f64,
    pub min_reception_power_dbm: f64,
    pub max_antenna_gain_db: f64,
    pub min_interference_time: f64,
    pub max_transmission_duration: f64,
    pub max_communication_range: f64,
    pub max_interference_range: f64,
}

impl Default for MediumLimits {
    fn default() -> Self {
        Self {
            max_speed: f64::NAN,
            max_transmission_power_dbm: f64::NAN,
            min_interference_power_dbm: f64::NAN,
            min_reception_power_dbm: f64::NAN,
            max_antenna_gain_db: f64::NAN,
            min_interference_time: f64::NAN,
            max_transmission_duration: f64::NAN,
            max_communication_range: f64::NAN,
            max_interference_range: f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_mobility_extrapolates() {
        let mobility = LinearMobility::moving(
            Coord::new(10.0, 0.0, 0.0),
            Coord::new(2.0, 0.0, 0.0),
            1.0,
        );
        assert_eq!(mobility.position_at(1.0), Coord::new(10.0, 0.0, 0.0));
        assert_eq!(mobility.position_at(3.0), Coord::new(14.0, 0.0, 0.0));
        assert_eq!(mobility.speed(), 2.0);
        let still = LinearMobility::stationary(Coord::new(1.0, 2.0, 3.0));
        assert_eq!(still.position_at(100.0), Coord::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn interference_total_power_sums_in_milliwatts() {
        let interference = Interference {
            noise_power_dbm: 0.0,
            interfering_powers: vec![(1, 0.0), (2, 10.0)],
        };
        // 1 mW + 1 mW + 10 mW
        assert!((interference.total_power_mw() - 12.0).abs() < 1e-9);
        let silent = Interference {
            noise_power_dbm: f64::NEG_INFINITY,
            interfering_powers: vec![],
        };
        assert_eq!(silent.total_power_mw(), 0.0);
    }

    #[test]
    fn medium_config_deserializes_with_defaults() {
        let config: MediumConfig =
            serde_json::from_str(r#"{ "range_filter": "communicationRange", "radio_mode_filter": true }"#)
                .unwrap();
        assert_eq!(config.range_filter, RangeFilter::CommunicationRange);
        assert!(config.radio_mode_filter);
        assert!(!config.listening_filter);
        config.validate().unwrap();
    }

    #[test]
    fn medium_config_validation_rejects_nonsense() {
        let mut config = MediumConfig::default();
        config.min_interference_time = -1.0;
        assert!(config.validate().is_err());
        let mut config = MediumConfig::default();
        config.max_communication_range = Some(0.0);
        assert!(config.validate().is_err());
    }
}
