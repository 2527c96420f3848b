//! Pluggable models of the radio medium.
//!
//! Propagation, path loss, obstacle loss, attenuation, background noise,
//! receiver decisions and the optional neighbor cache are each a small
//! capability behind a trait object. The medium composes them and never
//! downcasts. One default implementation ships for each.

use std::collections::HashMap;

use crate::common::geometry::{Coord, LineSegment};
use crate::environment::material::{self, Material, SPEED_OF_LIGHT};
use crate::environment::physical::PhysicalEnvironment;
use crate::kernel::SimTime;
use crate::medium::signal::{
    free_space_path_loss_db, free_space_range, log_distance_path_loss_db, log_distance_range,
    mw_to_dbm,
};
use crate::medium::types::{
    Arrival, Interference, Listening, ListeningConfig, ListeningDecision, LinearMobility, Radio,
    RadioId, Reception, ReceptionDecision, SynchronizationDecision, Transmission,
};

/// How transmissions travel: produces the arrival window of a transmission
/// at a (possibly moving) receiver.
pub trait Propagation {
    /// Signal propagation speed in m/s.
    fn propagation_speed(&self) -> f64;

    fn compute_arrival(&self, transmission: &Transmission, mobility: &LinearMobility) -> Arrival;
}

/// Propagation at a single constant speed. The receiver position is sampled
/// at the transmission start and end, so a receiver coincident with the
/// transmitter gets a zero-delay arrival.
pub struct ConstantSpeedPropagation {
    speed: f64,
}

impl ConstantSpeedPropagation {
    pub fn new(speed: f64) -> Self {
        Self { speed }
    }
}

impl Default for ConstantSpeedPropagation {
    fn default() -> Self {
        Self::new(SPEED_OF_LIGHT)
    }
}

impl Propagation for ConstantSpeedPropagation {
    fn propagation_speed(&self) -> f64 {
        self.speed
    }

    fn compute_arrival(&self, transmission: &Transmission, mobility: &LinearMobility) -> Arrival {
        let start_position = mobility.position_at(transmission.start_time);
        let end_position = mobility.position_at(transmission.end_time);
        let start_delay = transmission.start_position.distance_to(&start_position) / self.speed;
        let end_delay = transmission.end_position.distance_to(&end_position) / self.speed;
        Arrival {
            start_time: transmission.start_time + start_delay,
            end_time: transmission.end_time + end_delay,
            start_position,
            end_position,
        }
    }
}

/// Distance- and frequency-dependent signal attenuation.
pub trait PathLoss {
    /// Loss in dB over `distance` meters at `frequency` Hz.
    fn compute_path_loss_db(&self, distance: f64, frequency: f64) -> f64;

    /// Largest distance at which the loss stays within `budget_db`.
    /// NaN budgets yield NaN ranges.
    fn compute_range(&self, budget_db: f64, frequency: f64) -> f64;
}

/// Ideal free-space spreading.
#[derive(Debug, Default)]
pub struct FreeSpacePathLoss;

impl PathLoss for FreeSpacePathLoss {
    fn compute_path_loss_db(&self, distance: f64, frequency: f64) -> f64 {
        free_space_path_loss_db(distance, frequency)
    }

    fn compute_range(&self, budget_db: f64, frequency: f64) -> f64 {
        free_space_range(budget_db, frequency)
    }
}

/// Log-distance path loss with optional log-normal shadowing.
#[derive(Debug)]
pub struct LogDistancePathLoss {
    /// Path loss exponent; 2.0 is free space, urban areas run higher.
    pub exponent: f64,
    /// Loss at the 1 m reference distance, dB.
    pub reference_loss_db: f64,
    /// Shadowing standard deviation in dB; 0 disables shadowing.
    pub shadowing_sigma: f64,
}

impl PathLoss for LogDistancePathLoss {
    fn compute_path_loss_db(&self, distance: f64, _frequency: f64) -> f64 {
        log_distance_path_loss_db(distance, self.exponent, self.reference_loss_db, self.shadowing_sigma)
    }

    fn compute_range(&self, budget_db: f64, _frequency: f64) -> f64 {
        log_distance_range(budget_db, self.exponent, self.reference_loss_db)
    }
}

/// Additional attenuation from material objects between transmitter and
/// receiver. Frequency is passed explicitly.
pub trait ObstacleLoss {
    /// Power transmittance factor in (0, 1]; 1 means unobstructed.
    fn compute_obstacle_loss(
        &self,
        frequency: f64,
        transmission_position: Coord,
        reception_position: Coord,
    ) -> f64;
}

/// Walks the physical environment and, for every object the sightline cuts
/// through, multiplies in dielectric absorption over the traversed chord and
/// Fresnel reflection transmittance at the entry and exit faces.
pub struct DielectricObstacleLoss {
    environment: PhysicalEnvironment,
    /// Refractive index of the surrounding medium (air).
    surrounding_index: f64,
}

impl DielectricObstacleLoss {
    pub fn new(environment: PhysicalEnvironment) -> Self {
        let surrounding_index = material::by_name("air")
            .map(Material::refractive_index)
            .unwrap_or(1.0);
        Self {
            environment,
            surrounding_index,
        }
    }

    pub fn environment(&self) -> &PhysicalEnvironment {
        &self.environment
    }

    /// Power fraction surviving `distance` meters inside `material`:
    /// `exp(-atan(loss tangent) * 2 pi f d / v)`.
    fn dielectric_transmittance(material: &Material, frequency: f64, distance: f64) -> f64 {
        let tangent = material.dielectric_loss_tangent(frequency);
        let phase = 2.0 * std::f64::consts::PI * frequency * distance / material.propagation_speed();
        (-tangent.atan() * phase).exp()
    }

    /// Unpolarized Fresnel transmittance through one face, entering the
    /// material with refractive index `n2` from a medium with `n1` at the
    /// given incidence angle (radians from the face normal).
    fn reflection_transmittance(n1: f64, n2: f64, angle: f64) -> f64 {
        let st = angle.sin();
        let ct = angle.cos();
        let k_squared = 1.0 - (n1 / n2 * st).powi(2);
        if k_squared < 0.0 {
            // Total reflection
            return 0.0;
        }
        let k = k_squared.sqrt();
        let rs = ((n1 * ct - n2 * k) / (n1 * ct + n2 * k)).powi(2);
        let rp = ((n1 * k - n2 * ct) / (n1 * k + n2 * ct)).powi(2);
        1.0 - (rs + rp) / 2.0
    }

    fn incidence_angle(direction: &Coord, normal: &Coord) -> f64 {
        let d = direction.normalized();
        let n = normal.normalized();
        d.dot(&n).abs().clamp(0.0, 1.0).acos()
    }
}

impl ObstacleLoss for DielectricObstacleLoss {
    fn compute_obstacle_loss(
        &self,
        frequency: f64,
        transmission_position: Coord,
        reception_position: Coord,
    ) -> f64 {
        let mut transmittance = 1.0;
        for object in self.environment.objects() {
            // Shapes live in object-local coordinates
            let segment = LineSegment::new(
                transmission_position - object.position,
                reception_position - object.position,
            );
            if segment.length() == 0.0 {
                continue;
            }
            if let Some(hit) = object.shape.compute_intersection(&segment) {
                let chord = hit.entry.distance_to(&hit.exit);
                transmittance *=
                    Self::dielectric_transmittance(&object.material, frequency, chord);
                let direction = segment.direction();
                let n2 = object.material.refractive_index();
                if hit.entry_normal != Coord::ZERO {
                    let angle = Self::incidence_angle(&direction, &hit.entry_normal);
                    transmittance *=
                        Self::reflection_transmittance(self.surrounding_index, n2, angle);
                }
                if hit.exit_normal != Coord::ZERO {
                    let angle = Self::incidence_angle(&direction, &hit.exit_normal);
                    transmittance *=
                        Self::reflection_transmittance(self.surrounding_index, n2, angle);
                }
            }
        }
        transmittance
    }
}

/// Ambient noise observed during a listening window.
pub trait BackgroundNoise {
    fn compute_noise_dbm(&self, listening: &Listening) -> f64;
}

/// Flat noise floor, independent of position and band.
#[derive(Debug)]
pub struct IsotropicBackgroundNoise {
    pub power_dbm: f64,
}

impl BackgroundNoise for IsotropicBackgroundNoise {
    fn compute_noise_dbm(&self, _listening: &Listening) -> f64 {
        self.power_dbm
    }
}

/// Models the path loss and obstacle loss the attenuation model composes.
pub struct AttenuationContext<'a> {
    pub path_loss: &'a dyn PathLoss,
    pub obstacle_loss: Option<&'a dyn ObstacleLoss>,
}

/// Composes transmit power, antenna gains, path loss and obstacle loss into
/// the signal a receiver observes, and judges listening compatibility.
pub trait Attenuation {
    fn compute_reception(
        &self,
        receiver: &Radio,
        transmission: &Transmission,
        arrival: &Arrival,
        context: &AttenuationContext<'_>,
    ) -> Reception;

    /// Whether a listening band can pick up the transmission at all.
    fn is_listening_compatible(
        &self,
        listening: &ListeningConfig,
        transmission: &Transmission,
    ) -> bool;
}

/// Scalar attenuation: a single power value per reception, no frequency
/// selectivity inside the band.
#[derive(Debug, Default)]
pub struct ScalarAttenuation;

impl Attenuation for ScalarAttenuation {
    fn compute_reception(
        &self,
        receiver: &Radio,
        transmission: &Transmission,
        arrival: &Arrival,
        context: &AttenuationContext<'_>,
    ) -> Reception {
        let distance = transmission.start_position.distance_to(&arrival.start_position);
        let path_loss_db =
            context.path_loss.compute_path_loss_db(distance, transmission.center_frequency);
        let obstacle_db = match context.obstacle_loss {
            Some(model) => {
                let factor = model.compute_obstacle_loss(
                    transmission.center_frequency,
                    transmission.start_position,
                    arrival.start_position,
                );
                -10.0 * factor.log10()
            }
            None => 0.0,
        };
        let power_dbm = transmission.power_dbm
            + transmission.antenna_gain_db
            + receiver.antenna.gain_db
            - path_loss_db
            - obstacle_db;
        Reception {
            transmission_id: transmission.id,
            start_time: arrival.start_time,
            end_time: arrival.end_time,
            start_position: arrival.start_position,
            end_position: arrival.end_position,
            power_dbm,
        }
    }

    fn is_listening_compatible(
        &self,
        listening: &ListeningConfig,
        transmission: &Transmission,
    ) -> bool {
        let separation = (listening.center_frequency - transmission.center_frequency).abs();
        separation <= (listening.bandwidth + transmission.bandwidth) / 2.0
    }
}

/// Produces listenings and decisions for a receiver.
pub trait ReceiverModel {
    fn create_listening(&self, radio: &Radio, start_time: SimTime, end_time: SimTime) -> Listening;

    fn compute_listening_decision(
        &self,
        radio: &Radio,
        listening: &Listening,
        interference: &Interference,
    ) -> ListeningDecision;

    fn compute_synchronization_decision(
        &self,
        radio: &Radio,
        listening: &Listening,
        reception: &Reception,
        interference: &Interference,
    ) -> SynchronizationDecision;

    fn compute_reception_decision(
        &self,
        radio: &Radio,
        listening: &Listening,
        reception: &Reception,
        interference: &Interference,
    ) -> ReceptionDecision;
}

/// Threshold receiver: a reception is attempted above the sensitivity floor
/// and succeeds when the SNIR clears the configured threshold.
#[derive(Debug, Default)]
pub struct SnirReceiverModel;

impl SnirReceiverModel {
    fn snir_db(reception: &Reception, interference: &Interference) -> f64 {
        reception.power_dbm - mw_to_dbm(interference.total_power_mw())
    }
}

impl ReceiverModel for SnirReceiverModel {
    fn create_listening(&self, radio: &Radio, start_time: SimTime, end_time: SimTime) -> Listening {
        Listening {
            start_time,
            end_time,
            center_frequency: radio.listening.center_frequency,
            bandwidth: radio.listening.bandwidth,
        }
    }

    fn compute_listening_decision(
        &self,
        radio: &Radio,
        _listening: &Listening,
        interference: &Interference,
    ) -> ListeningDecision {
        let power_dbm = mw_to_dbm(interference.total_power_mw());
        ListeningDecision {
            busy: power_dbm >= radio.receiver.energy_detection_dbm,
            power_dbm,
        }
    }

    fn compute_synchronization_decision(
        &self,
        radio: &Radio,
        _listening: &Listening,
        reception: &Reception,
        interference: &Interference,
    ) -> SynchronizationDecision {
        let attempted = reception.power_dbm >= radio.receiver.sensitivity_dbm;
        let snir_db = Self::snir_db(reception, interference);
        SynchronizationDecision {
            attempted,
            successful: attempted && snir_db >= radio.receiver.snir_threshold_db,
            snir_db,
        }
    }

    fn compute_reception_decision(
        &self,
        radio: &Radio,
        _listening: &Listening,
        reception: &Reception,
        interference: &Interference,
    ) -> ReceptionDecision {
        let attempted = reception.power_dbm >= radio.receiver.sensitivity_dbm;
        let snir_db = Self::snir_db(reception, interference);
        ReceptionDecision {
            attempted,
            successful: attempted && snir_db >= radio.receiver.snir_threshold_db,
            snir_db,
        }
    }
}

/// Optional receiver-candidate cache consulted instead of scanning the full
/// radio population on every transmission.
pub trait NeighborCache {
    fn add_radio(&mut self, radio: &Radio);

    fn remove_radio(&mut self, id: RadioId);

    /// Radios that may be within `range` meters of the transmitter. NaN
    /// means unbounded; every known radio is returned.
    fn neighbors(&self, transmitter: &Radio, range: f64) -> Vec<RadioId>;
}

/// Distance check against positions recorded when radios were added.
/// Suitable for stationary populations.
pub struct RangeNeighborCache {
    positions: HashMap<RadioId, Coord>,
}

impl RangeNeighborCache {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
        }
    }
}

impl Default for RangeNeighborCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborCache for RangeNeighborCache {
    fn add_radio(&mut self, radio: &Radio) {
        self.positions.insert(radio.id(), radio.mobility.position);
    }

    fn remove_radio(&mut self, id: RadioId) {
        self.positions.remove(&id);
    }

    fn neighbors(&self, transmitter: &Radio, range: f64) -> Vec<RadioId> {
        let origin = transmitter.mobility.position;
        self.positions
            .iter()
            .filter(|(_, position)| range.is_nan() || origin.distance_to(position) <= range)
            .map(|(&id, _)| id)
            .collect()
    }
}
