pub mod event;
pub mod lorentz;

// Re-export types for convenience.
pub use crate::types::event::{Ditau, Entry, Event, JetRecord, MAX_JETS};
pub use crate::types::lorentz::LorentzVector;
