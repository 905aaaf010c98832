//! SI/PSI table decoders (spec.md §4.7): dispatched on `(pid, table_id,
//! private_bit)` by [`crate::parser::Parser`].

pub mod eit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod section;
pub mod tdt;

pub use eit::Eit;
pub use pat::Pat;
pub use pmt::Pmt;
pub use sdt::Sdt;
pub use tdt::Tdt;
