//! Alignment core: banded SW, CIGAR scoring, and the placement strategies built on top of
//! them (4.1-4.6).

pub mod adapter;
pub mod aligner_base;
pub mod banded_sw;
pub mod gapped;
pub mod simple_indel;
pub mod ungapped;
