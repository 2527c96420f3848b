//! # Radio Medium
//!
//! The wireless-medium core of a discrete-event network simulator. Given a
//! population of radios with positions, antennas and listening
//! configurations, the medium computes, for every ongoing transmission,
//! which receivers are reached, what signal each receiver observes, what
//! interferes with it, and whether synchronization and reception succeed.
//!
//! ## Architecture Overview
//!
//! The crate has one central component and a set of kernels it consumes:
//!
//! - [`medium`]: the radio medium itself. It owns the radio and
//!   transmission populations and a two-dimensional computation cache keyed
//!   by (transmission, radio), filled lazily and trimmed from the left as
//!   transmissions stop interfering. Propagation, path loss, obstacle loss,
//!   attenuation, background noise, receiver decisions and the optional
//!   neighbor cache are pluggable trait objects.
//! - [`coding`]: a (k/n) convolutional encoder and hard-decision Viterbi
//!   decoder with puncturing, used to model forward error correction.
//! - [`common::geometry`]: convex prisms, polygons, cuboids and
//!   segment/convex intersection, driving obstacle loss.
//! - [`environment`]: the material catalog and the physical objects
//!   standing between radios.
//! - [`linklayer`]: MAC addresses and a VLAN-partitioned learning table
//!   with aging.
//!
//! The surrounding simulation kernel stays outside the crate; the medium
//! consumes only a monotone clock, a one-shot self-timer and a
//! point-to-point frame delivery primitive, all behind the [`Kernel`]
//! trait. Everything runs single-threaded and to completion between
//! events.

pub mod coding;
pub mod common;
pub mod environment;
pub mod error;
pub mod kernel;
pub mod linklayer;
pub mod medium;

pub use error::{Error, Result};
pub use kernel::{Kernel, SimTime, TimerToken};
pub use medium::{MediumConfig, MediumStatistics, RadioMedium};
