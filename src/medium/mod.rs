//! The wireless radio medium and its pluggable models.
//!
//! ## Module Organization
//!
//! - `types`: entities and configuration (radios, transmissions, decisions)
//! - `signal`: power conversion, path loss math, airtime
//! - `models`: model traits and default implementations
//! - `cache`: the per-(transmission, radio) computation cache
//! - `comm_log`: communication log file and trail
//! - `medium`: the `RadioMedium` itself

pub mod cache;
pub mod comm_log;
#[allow(clippy::module_inception)]
pub mod medium;
pub mod models;
pub mod signal;
pub mod types;

pub use cache::{CommunicationCache, ReceptionCacheEntry, TransmissionCacheEntry, TransmissionFigure};
pub use comm_log::{CommunicationLog, CommunicationTrail};
pub use medium::{MediumStatistics, RadioMedium, PURGE_TIMER};
pub use models::{
    Attenuation, AttenuationContext, BackgroundNoise, ConstantSpeedPropagation,
    DielectricObstacleLoss, FreeSpacePathLoss, IsotropicBackgroundNoise, LogDistancePathLoss,
    NeighborCache, ObstacleLoss, PathLoss, Propagation, RangeNeighborCache, ReceiverModel,
    ScalarAttenuation, SnirReceiverModel,
};
pub use types::{
    Antenna, Arrival, Frame, Interference, LinearMobility, Listening, ListeningConfig,
    ListeningDecision, MacPacket, MediumConfig, MediumLimits, Radio, RadioId, RadioMode,
    RangeFilter, ReceivedPacket, Reception, ReceptionDecision, ReceiverConfig,
    SynchronizationDecision, Transmission, TransmissionId, TransmitterConfig,
};
