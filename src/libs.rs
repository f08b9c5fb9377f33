
//! # Soft-clip matching breakpoint libraries
//!
//! This library collects the functions and structures used to infer
//! structural-variant breakpoints from aligned short reads. Three
//! independent evidence channels are combined:
//! - split-read signal from soft-clipped reads whose clipped tails can be
//!   re-matched against a partner read clipped on the opposite side
//! - discordant read-pair signal from pairs whose insert deviates from the
//!   library distribution
//! - read-depth signal summarized in windows around a candidate breakpoint
//!
//! The modules are split by dependency: everything that can be expressed on
//! plain sequences and CIGAR strings lives in `common`, everything that
//! touches htslib records and indexed BAM files lives in `hts_lib_based`.
//! The `clipmatch` binary drives a scan over one region, matches clip-read
//! pairs, refines the join position and reports scored breakpoints.

/// functions + structures independent of the BAM reader
pub mod lib {
    pub mod common;
    /// functions specific for htslib derived input
    pub mod hts_lib_based;
}
