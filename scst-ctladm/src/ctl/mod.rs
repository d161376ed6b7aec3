//! `ctladm` compatibility layer: the LUN/port view of an SCST tree and its
//! text and XML renderings.

pub mod correlator;
pub mod records;
pub mod xml;

pub use correlator::LunCorrelator;
pub use records::{Lun, Port, TextLine};
