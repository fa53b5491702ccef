//! Top quark and W boson reconstruction.
//!
//! Derives nine per-event quantities from the jets and ditau system of an [Event]. Jet and ditau
//! kinematics are stored in GeV; every mass and momentum output is scaled to MeV.
//!
//! Candidate selection iterates in a fixed order and only replaces the incumbent on a strictly
//! better value, so the first of several equally good candidates wins.

use crate::error::TransformerError;
use crate::types::event::DITAU_PT_BRANCH;
use crate::types::{Entry, Event, LorentzVector};

use serde_json::Value;

/// Scale from the GeV units of the input to the MeV units of the output.
pub const GEV: f64 = 1e3;
/// W boson mass (MeV)
pub const W_MASS: f64 = 80.379e3;
/// Top quark mass (MeV)
pub const TOP_MASS: f64 = 172.5e3;
/// Higgs boson mass (MeV), assigned to the ditau system
pub const HIGGS_MASS: f64 = 125.0e3;
/// Top quark mass resolution (MeV)
pub const TOP_MASS_RESOLUTION: f64 = 13.80e3;
/// W boson mass resolution (MeV)
pub const W_MASS_RESOLUTION: f64 = 7.40e3;
/// Value of mass-like quantities that cannot be computed.
pub const MASS_SENTINEL: f64 = -999e3;
/// Value of angular separations that cannot be computed.
pub const DELTA_R_SENTINEL: f64 = 99.0;
/// Jet pairs closer than this are considered the same object.
pub const MIN_DELTA_R: f64 = 1e-9;

/// Names of the derived branches, in output order.
pub const COLUMN_NAMES: [&str; 9] = [
    "HTjets_new",
    "SumPtBjet_new",
    "jjdrmin_new",
    "mWbest_new",
    "mWsubbest_new",
    "mTopWbest_new",
    "chi2_top_estimator",
    "dR_ditau_mmc_top",
    "dR_bb",
];

/// The derived quantities of one event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedColumns {
    /// Scalar sum of jet pT
    pub ht_jets: f64,
    /// Scalar sum of b-tagged jet pT
    pub sum_pt_bjet: f64,
    /// Smallest ΔR between two distinct jets
    pub jj_dr_min: f64,
    /// Non-b dijet mass closest to the W mass
    pub m_w_best: f64,
    /// The W candidate mass displaced by the final `m_w_best`
    pub m_w_subbest: f64,
    /// Mass of the best W candidate plus the b-jet closest to the top mass
    pub m_top_w_best: f64,
    /// Minimum top/W mass chi-square over b-jet and W candidate combinations
    pub chi2_top_estimator: f64,
    /// ΔR between the chi-square minimising top candidate and the ditau system
    pub dr_ditau_mmc_top: f64,
    /// ΔR between the two b-jets
    pub dr_bb: f64,
}

impl Default for DerivedColumns {
    fn default() -> Self {
        DerivedColumns {
            ht_jets: 0.0,
            sum_pt_bjet: 0.0,
            jj_dr_min: DELTA_R_SENTINEL,
            m_w_best: MASS_SENTINEL,
            m_w_subbest: MASS_SENTINEL,
            m_top_w_best: MASS_SENTINEL,
            chi2_top_estimator: MASS_SENTINEL,
            dr_ditau_mmc_top: DELTA_R_SENTINEL,
            dr_bb: DELTA_R_SENTINEL,
        }
    }
}

impl DerivedColumns {
    /// Return the values paired with their branch names, in output order.
    pub fn columns(&self) -> [(&'static str, f64); 9] {
        let values = [
            self.ht_jets,
            self.sum_pt_bjet,
            self.jj_dr_min,
            self.m_w_best,
            self.m_w_subbest,
            self.m_top_w_best,
            self.chi2_top_estimator,
            self.dr_ditau_mmc_top,
            self.dr_bb,
        ];
        std::array::from_fn(|i| (COLUMN_NAMES[i], values[i]))
    }

    /// Append the derived branches to a tree entry, replacing any existing branches of the same
    /// name.
    pub fn append_to(&self, entry: &mut Entry) {
        for (name, value) in self.columns() {
            entry.insert(name.to_string(), Value::from(value));
        }
    }
}

/// A W boson candidate: the sum of two non-b-tagged jets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WCandidate {
    /// Summed 4-momentum (GeV)
    pub p4: LorentzVector,
    /// Invariant mass (MeV)
    pub mass: f64,
    /// ΔR between the two jets
    pub delta_r: f64,
}

impl WCandidate {
    /// Return the W candidate formed by two jets.
    pub fn new(a: &LorentzVector, b: &LorentzVector) -> Self {
        let p4 = *a + *b;
        WCandidate {
            p4,
            mass: p4.m() * GEV,
            delta_r: a.delta_r(b),
        }
    }
}

/// Result of scanning W candidates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WScan {
    pub m_w_best: f64,
    pub m_w_subbest: f64,
    pub m_top_w_best: f64,
}

/// The top candidate with minimum chi-square.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TopChi2 {
    pub chi2: f64,
    /// Summed 4-momentum of the two W jets and the b-jet (GeV)
    pub p4: LorentzVector,
}

/// Iterate over all unordered pairs `(items[i], items[j])` with `i < j`, in lexicographic order.
pub fn pairs<T>(items: &[T]) -> impl Iterator<Item = (&T, &T)> + '_ {
    items
        .iter()
        .enumerate()
        .flat_map(move |(i, a)| items[i + 1..].iter().map(move |b| (a, b)))
}

/// Scan W candidates in order for the mass closest to the W mass.
///
/// Candidates whose jets are closer than [MIN_DELTA_R] are skipped. Each time a candidate
/// displaces the incumbent, a positive incumbent moves to `m_w_subbest` and the top mass is
/// recomputed for the new candidate.
///
/// # Arguments
///
/// * `candidates`: W candidates in generation order
/// * `b_jets`: b-tagged jets in stored order
pub fn scan_w_candidates(candidates: &[WCandidate], b_jets: &[LorentzVector]) -> WScan {
    let mut scan = WScan {
        m_w_best: MASS_SENTINEL,
        m_w_subbest: MASS_SENTINEL,
        m_top_w_best: MASS_SENTINEL,
    };
    for candidate in candidates {
        if candidate.delta_r < MIN_DELTA_R {
            continue;
        }
        if (candidate.mass - W_MASS).abs() < (scan.m_w_best - W_MASS).abs() {
            if scan.m_w_best > 0.0 {
                scan.m_w_subbest = scan.m_w_best;
            }
            scan.m_w_best = candidate.mass;
            scan.m_top_w_best = best_top_mass(&candidate.p4, b_jets);
        }
    }
    scan
}

/// Return the W + b-jet mass closest to the top mass, or [MASS_SENTINEL] without b-jets.
fn best_top_mass(w: &LorentzVector, b_jets: &[LorentzVector]) -> f64 {
    let mut best = MASS_SENTINEL;
    for b_jet in b_jets {
        let mass = (*w + *b_jet).m() * GEV;
        if (mass - TOP_MASS).abs() < (best - TOP_MASS).abs() {
            best = mass;
        }
    }
    best
}

/// Return the b-jet and W candidate combination with the smallest top/W chi-square.
///
/// Combinations are visited b-jet major. Every W candidate takes part regardless of the ΔR
/// between its jets. Returns `None` if there are no combinations.
pub fn best_top_chi2(candidates: &[WCandidate], b_jets: &[LorentzVector]) -> Option<TopChi2> {
    let mut best: Option<TopChi2> = None;
    for b_jet in b_jets {
        for candidate in candidates {
            let p4 = candidate.p4 + *b_jet;
            let top_residual = p4.m() * GEV - TOP_MASS;
            let w_residual = candidate.mass - W_MASS;
            let chi2 = top_residual * top_residual
                / (TOP_MASS_RESOLUTION * TOP_MASS_RESOLUTION)
                + w_residual * w_residual / (W_MASS_RESOLUTION * W_MASS_RESOLUTION);
            if best.map_or(true, |best| chi2 < best.chi2) {
                best = Some(TopChi2 { chi2, p4 });
            }
        }
    }
    best
}

/// Sum with Neumaier compensation.
fn compensated_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for value in values {
        let total = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - total) + value;
        } else {
            compensation += (value - total) + sum;
        }
        sum = total;
    }
    sum + compensation
}

/// Reconstruct the derived quantities of an event.
///
/// Fails if a used jet 4-momentum is not finite, or if the ditau system is needed but missing or
/// not finite.
pub fn reconstruct(event: &Event) -> Result<DerivedColumns, TransformerError> {
    let jets = event.jets();
    if let Some(index) = jets.iter().position(|jet| !jet.p4.is_finite()) {
        return Err(TransformerError::NonFinite {
            quantity: format!("jet {} 4-momentum", index),
            entry: event.entry,
        });
    }

    let mut columns = DerivedColumns {
        ht_jets: compensated_sum(jets.iter().map(|jet| jet.p4.pt() * GEV)),
        sum_pt_bjet: compensated_sum(
            jets.iter()
                .filter(|jet| jet.b_tag == 1)
                .map(|jet| jet.p4.pt() * GEV),
        ),
        ..Default::default()
    };

    columns.jj_dr_min = pairs(jets)
        .map(|(a, b)| a.p4.delta_r(&b.p4))
        .filter(|delta_r| *delta_r >= MIN_DELTA_R)
        .fold(None, |min: Option<f64>, delta_r| {
            Some(min.map_or(delta_r, |min| min.min(delta_r)))
        })
        .unwrap_or(DELTA_R_SENTINEL);

    let non_b_jets: Vec<LorentzVector> = jets
        .iter()
        .filter(|jet| jet.b_tag == 0)
        .map(|jet| jet.p4)
        .collect();
    let b_jets: Vec<LorentzVector> = jets
        .iter()
        .filter(|jet| jet.b_tag == 1)
        .map(|jet| jet.p4)
        .collect();
    let candidates: Vec<WCandidate> = pairs(&non_b_jets)
        .map(|(a, b)| WCandidate::new(a, b))
        .collect();

    let scan = scan_w_candidates(&candidates, &b_jets);
    columns.m_w_best = scan.m_w_best;
    columns.m_w_subbest = scan.m_w_subbest;
    columns.m_top_w_best = scan.m_top_w_best;

    if !b_jets.is_empty() && non_b_jets.len() >= 2 {
        let ditau = event.ditau.ok_or_else(|| TransformerError::BranchMissing {
            branch: DITAU_PT_BRANCH.to_string(),
            entry: event.entry,
        })?;
        if !(ditau.pt.is_finite() && ditau.eta.is_finite() && ditau.phi.is_finite()) {
            return Err(TransformerError::NonFinite {
                quantity: "ditau kinematics".to_string(),
                entry: event.entry,
            });
        }
        if let Some(best) = best_top_chi2(&candidates, &b_jets) {
            let ditau_p4 =
                LorentzVector::from_pt_eta_phi_m(ditau.pt, ditau.eta, ditau.phi, HIGGS_MASS);
            columns.chi2_top_estimator = best.chi2;
            columns.dr_ditau_mmc_top = best.p4.delta_r(&ditau_p4);
        }
    }

    if b_jets.len() == 2 {
        columns.dr_bb = b_jets[0].delta_r(&b_jets[1]);
    }

    Ok(columns)
}
