//! Lorentz 4-vectors
//!
//! A minimal 4-momentum type following the conventions used by the collider physics toolkits the
//! input files are produced with: pseudorapidity saturates at ±1e11 along the beam axis, the
//! invariant mass of a space-like vector is reported as a negative number, and azimuthal
//! differences are wrapped into [-π, π).

use std::f64::consts::PI;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Pseudorapidity reported for vectors parallel to the beam axis.
const BEAM_AXIS_ETA: f64 = 10e10;

/// A 4-momentum stored as Cartesian components plus energy.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LorentzVector {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl LorentzVector {
    /// Return a new LorentzVector from Cartesian components.
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        LorentzVector { px, py, pz, e }
    }

    /// Return a new LorentzVector from transverse momentum, pseudorapidity, azimuth and mass.
    ///
    /// A negative `pt` is treated as its absolute value.
    /// A negative `m` produces a space-like vector with `m() == m`.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pt = pt.abs();
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        let e = if m >= 0.0 {
            (p2 + m * m).sqrt()
        } else {
            (p2 - m * m).max(0.0).sqrt()
        };
        LorentzVector { px, py, pz, e }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Magnitude of the 3-momentum.
    pub fn p(&self) -> f64 {
        (self.px * self.px + self.py * self.py + self.pz * self.pz).sqrt()
    }

    /// Azimuthal angle in (-π, π].
    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 {
            0.0
        } else {
            self.py.atan2(self.px)
        }
    }

    /// Pseudorapidity.
    pub fn eta(&self) -> f64 {
        let p = self.p();
        let cos_theta = if p == 0.0 { 1.0 } else { self.pz / p };
        if cos_theta * cos_theta < 1.0 {
            -0.5 * ((1.0 - cos_theta) / (1.0 + cos_theta)).ln()
        } else if self.pz == 0.0 {
            0.0
        } else if self.pz > 0.0 {
            BEAM_AXIS_ETA
        } else {
            -BEAM_AXIS_ETA
        }
    }

    /// Invariant mass squared.
    pub fn m2(&self) -> f64 {
        self.e * self.e - (self.px * self.px + self.py * self.py + self.pz * self.pz)
    }

    /// Invariant mass. Negative for space-like vectors.
    pub fn m(&self) -> f64 {
        let m2 = self.m2();
        if m2 < 0.0 {
            -(-m2).sqrt()
        } else {
            m2.sqrt()
        }
    }

    /// Angular separation ΔR = sqrt(Δη² + Δφ²).
    pub fn delta_r(&self, other: &LorentzVector) -> f64 {
        let deta = self.eta() - other.eta();
        let dphi = wrap_phi(self.phi() - other.phi());
        deta.hypot(dphi)
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.pz.is_finite() && self.e.is_finite()
    }
}

impl Add for LorentzVector {
    type Output = LorentzVector;

    fn add(self, rhs: LorentzVector) -> LorentzVector {
        LorentzVector {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

/// Wrap an azimuthal difference into [-π, π).
fn wrap_phi(mut x: f64) -> f64 {
    if x.is_nan() {
        return x;
    }
    while x >= PI {
        x -= 2.0 * PI;
    }
    while x < -PI {
        x += 2.0 * PI;
    }
    x
}
