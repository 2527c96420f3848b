//! Electromagnetic materials used by the obstacle-loss model.
//!
//! A material is an immutable named record of resistivity, relative
//! permittivity and relative permeability. Any numeric field may be NaN,
//! meaning "not characterized"; derived quantities then propagate NaN
//! silently. Derived values are computed on demand, never stored.

use std::sync::OnceLock;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Vacuum permittivity, F/m.
pub const VACUUM_PERMITTIVITY: f64 = 8.854_187_817e-12;

/// An electromagnetic material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    name: String,
    /// Resistivity in ohm meters.
    resistivity: f64,
    relative_permittivity: f64,
    relative_permeability: f64,
}

impl Material {
    pub fn new(
        name: impl Into<String>,
        resistivity: f64,
        relative_permittivity: f64,
        relative_permeability: f64,
    ) -> Self {
        Self {
            name: name.into(),
            resistivity,
            relative_permittivity,
            relative_permeability,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resistivity(&self) -> f64 {
        self.resistivity
    }

    pub fn relative_permittivity(&self) -> f64 {
        self.relative_permittivity
    }

    pub fn relative_permeability(&self) -> f64 {
        self.relative_permeability
    }

    /// Dielectric loss tangent at the given frequency (Hz):
    /// `1 / (2 pi f rho epsilon_r epsilon_0)`.
    pub fn dielectric_loss_tangent(&self, frequency: f64) -> f64 {
        1.0 / (2.0
            * std::f64::consts::PI
            * frequency
            * self.resistivity
            * self.relative_permittivity
            * VACUUM_PERMITTIVITY)
    }

    /// Refractive index `sqrt(epsilon_r * mu_r)`.
    pub fn refractive_index(&self) -> f64 {
        (self.relative_permittivity * self.relative_permeability).sqrt()
    }

    /// Propagation speed of electromagnetic waves inside the material, m/s.
    pub fn propagation_speed(&self) -> f64 {
        SPEED_OF_LIGHT / self.refractive_index()
    }
}

static CATALOG: OnceLock<Vec<Material>> = OnceLock::new();

/// The fixed catalog of common materials. Values that are not characterized
/// are NaN. User code is free to construct further materials; the catalog is
/// only a convenience.
pub fn catalog() -> &'static [Material] {
    CATALOG.get_or_init(|| {
        vec![
            Material::new("vacuum", f64::NAN, 1.0, 1.0),
            Material::new("air", f64::NAN, 1.000_589_86, 1.000_000_37),
            Material::new("copper", 1.68, f64::NAN, f64::NAN),
            Material::new("aluminium", 2.65, f64::NAN, f64::NAN),
            Material::new("wood", 1e15, 5.0, 1.000_000_43),
            Material::new("brick", 3e3, 4.5, 1.0),
            Material::new("concrete", 1e2, 4.5, 1.0),
            Material::new("glass", 1e12, 7.0, 1.0),
        ]
    })
}

/// Look up a catalog material by name.
pub fn by_name(name: &str) -> Option<&'static Material> {
    catalog().iter().find(|m| m.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_the_known_materials() {
        let names: Vec<&str> = catalog().iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            ["vacuum", "air", "copper", "aluminium", "wood", "brick", "concrete", "glass"]
        );
        assert!(by_name("air").is_some());
        assert!(by_name("unobtanium").is_none());
    }

    #[test]
    fn air_refraction_slows_light_slightly() {
        let air = by_name("air").unwrap();
        let n = air.refractive_index();
        assert!((n - 1.000_295_0).abs() < 1e-6);
        let speed = air.propagation_speed();
        assert!((speed - SPEED_OF_LIGHT / n).abs() < 1e-6);
        // Roughly 88 km/s slower than in vacuum
        assert!(speed < SPEED_OF_LIGHT);
        assert!((SPEED_OF_LIGHT - speed - 88_440.0).abs() < 100.0);
    }

    #[test]
    fn vacuum_does_not_slow_light() {
        let vacuum = by_name("vacuum").unwrap();
        assert_eq!(vacuum.refractive_index(), 1.0);
        assert_eq!(vacuum.propagation_speed(), SPEED_OF_LIGHT);
    }

    #[test]
    fn loss_tangent_follows_the_dielectric_formula() {
        let concrete = by_name("concrete").unwrap();
        let f = 2.4e9;
        let expected = 1.0
            / (2.0 * std::f64::consts::PI * f * 1e2 * 4.5 * VACUUM_PERMITTIVITY);
        assert!((concrete.dielectric_loss_tangent(f) - expected).abs() < expected * 1e-12);
    }

    #[test]
    fn nan_fields_propagate() {
        let copper = by_name("copper").unwrap();
        assert!(copper.refractive_index().is_nan());
        assert!(copper.propagation_speed().is_nan());
        let vacuum = by_name("vacuum").unwrap();
        assert!(vacuum.dielectric_loss_tangent(1e9).is_nan());
    }
}
