use std::cmp;
use std::str;
use rust_htslib::{bam, bam::Read};
use log::{debug, info, warn};

use crate::lib::common::{*};


/// reserve for the raw-read arena; avoids repeated growth during a
/// chromosome-scale scan
pub const ARENA_RESERVE: usize = 300_000_000;

/// re-scan statistics refuse to materialize counters for spans beyond
/// this; only the flanks are computed then
pub const MAX_COUNTED_SPAN: i64 = 1_000_000;


/////////////////////////////////////////
///    admissibility predicates   ///////
/////////////////////////////////////////

/// default exclusion filter for depth counting, with an explicit mapping
/// quality floor (`0` gives the unfiltered pre-scan behaviour)
///
/// Unittest: TRUE
///
pub fn is_read_count_for_depth_q(
    record: &bam::Record,
    min_mapq: u8
) -> bool {
    if record.is_unmapped()
        || record.is_secondary()
        || record.is_quality_check_failed()
        || record.is_duplicate()
    {
        return false;
    }
    record.mapq() >= min_mapq
}

/// same filter against the configured mapping quality
///
/// Unittest: TRUE
///
pub fn is_read_count_for_depth(
    record: &bam::Record,
    params: &ScanParams
) -> bool {
    is_read_count_for_depth_q(record, params.min_mapq)
}

/// Depth-countable plus mate on the same reference and F/R orientation.
/// A same-strand pair carries no signal for the paired-end channel and is
/// excluded here.
///
/// Unittest: TRUE
///
pub fn is_read_count_for_pair(
    record: &bam::Record,
    params: &ScanParams
) -> bool {
    if !is_read_count_for_depth(record, params) {
        return false;
    }
    if record.mtid() != record.tid() {
        return false;
    }
    record.is_reverse() != record.is_mate_reverse()
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// the predicate that rejected a read in the clip gate
pub enum ClipReject {
    /// default exclusion flags or mapping quality
    NotDepthCountable,
    /// mapping quality below the configured floor
    LowMapq,
    /// fewer than two CIGAR operations, nothing clipped
    SimpleCigar,
    /// record carries no valid reference id
    NoReference,
    /// clip or alignment resolves outside the contig
    OutsideContig,
    /// non-positive start position after resolution/calibration
    NoCalibratedStart,
    /// no soft-clip operation left
    NoClip,
    /// clip shorter than the configured minimum
    ShortClip,
    /// too many low-quality bases inside the clip
    LowQualityClip,
    /// clip covers too much of the read to be a clean signal
    ClipDominant,
    /// clip too similar to the reference to be informative
    ClipMatchesReference,
    /// too many mismatches across the aligned runs
    NoisyAlignment,
    /// too many no-call bases inside the clip
    TooManyNoCalls,
    /// more than 3 soft-clips or more than 3 indel operations
    ComplexCigar,
}

impl ClipReject {
    pub fn name(&self) -> &'static str {
        match self {
            ClipReject::NotDepthCountable => "not-depth-countable",
            ClipReject::LowMapq => "low-mapq",
            ClipReject::SimpleCigar => "simple-cigar",
            ClipReject::NoReference => "no-reference",
            ClipReject::OutsideContig => "outside-contig",
            ClipReject::NoCalibratedStart => "no-calibrated-start",
            ClipReject::NoClip => "no-clip",
            ClipReject::ShortClip => "short-clip",
            ClipReject::LowQualityClip => "low-quality-clip",
            ClipReject::ClipDominant => "clip-dominant",
            ClipReject::ClipMatchesReference => "clip-matches-reference",
            ClipReject::NoisyAlignment => "noisy-alignment",
            ClipReject::TooManyNoCalls => "too-many-no-calls",
            ClipReject::ComplexCigar => "complex-cigar",
        }
    }
}

/// Decide if a read should enter the soft-clip matching stage.
/// The gates run in a fixed order and the first failing one names the
/// rejection, which keeps the cascade testable. Calibration of the clip
/// boundary happens between the geometric gates and the mismatch gates
/// because it can absorb the clip entirely.
///
/// The base quality gate is skipped when the record carries no quality
/// values (0xff sentinel in the first byte).
///
/// Unittest: TRUE
///
pub fn keep_for_clip(
    record: &bam::Record,
    fasta: &[u8],
    params: &ScanParams
) -> Result<ClippedCandidate, ClipReject> {
    if !is_read_count_for_depth(record, params) {
        return Err(ClipReject::NotDepthCountable);
    }
    if record.mapq() < params.min_mapq {
        return Err(ClipReject::LowMapq);
    }
    if record.cigar().len() <= 1 {
        return Err(ClipReject::SimpleCigar);
    }
    if record.tid() < 0 {
        return Err(ClipReject::NoReference);
    }

    let cigar = format!("{}", record.cigar());
    let mut rm = match resolve_cigar(&cigar, record.pos()) {
        Some(x) => x,
        None => return Err(ClipReject::NoClip),
    };

    let last = rm.spans[rm.spans.len() - 1];
    if rm.spans[0].ref_beg < 0 || last.ref_beg + last.len as i64 >= fasta.len() as i64 {
        return Err(ClipReject::OutsideContig);
    }
    if rm.pos <= 0 {
        return Err(ClipReject::NoCalibratedStart);
    }
    let ci = match rm.clip {
        Some(c) => c,
        None => return Err(ClipReject::NoClip),
    };
    if rm.spans[ci].len < params.min_clip_len {
        return Err(ClipReject::ShortClip);
    }

    // minimum base quality inside the clip
    let qual = record.qual();
    if params.min_baseq > 1 && !qual.is_empty() && qual[0] != 0xff {
        let clip = rm.spans[ci];
        let mut low = 0_usize;
        for i in 0..clip.len {
            if let Some(&q) = qual.get(clip.query_beg + i) {
                if q < params.min_baseq {
                    low += 1;
                }
            }
        }
        if low * 4 > clip.len {
            return Err(ClipReject::LowQualityClip);
        }
    }

    let seq = record.seq().as_bytes();
    calibrate_alignment(fasta, &seq, &mut rm);

    // calibration may have absorbed or shortened the clip
    if rm.pos <= 0 {
        return Err(ClipReject::NoCalibratedStart);
    }
    let ci = match rm.clip {
        Some(c) => c,
        None => return Err(ClipReject::NoClip),
    };
    let clip = rm.spans[ci];
    if clip.len < params.min_clip_len {
        return Err(ClipReject::ShortClip);
    }
    if clip.len as f64 * 1.25 > rm.query_len as f64 {
        return Err(ClipReject::ClipDominant);
    }

    let mut ndiff_m = 0_usize;
    for s in &rm.spans {
        if s.kind != SpanKind::Aligned {
            continue;
        }
        for i in 0..s.len {
            let r = s.ref_beg + i as i64;
            if r < 0 || r as usize >= fasta.len() {
                continue;
            }
            if let Some(&q) = seq.get(s.query_beg + i) {
                if q != fasta[r as usize] {
                    ndiff_m += 1;
                }
            }
        }
    }
    let mut ndiff_s = 0_usize;
    let mut n_no_call = 0_usize;
    for i in 0..clip.len {
        let q = match seq.get(clip.query_beg + i) {
            Some(&q) => q,
            None => continue,
        };
        let r = clip.ref_beg + i as i64;
        if r >= 0 && (r as usize) < fasta.len() && q != fasta[r as usize] {
            ndiff_s += 1;
        }
        if q == b'N' {
            n_no_call += 1;
        }
    }
    if ndiff_s <= 2 || ndiff_s <= clip.len / 4 {
        return Err(ClipReject::ClipMatchesReference);
    }
    if ndiff_m >= rm.query_len * 8 / 100 {
        return Err(ClipReject::NoisyAlignment);
    }
    if n_no_call >= params.min_clip_len / 2 {
        return Err(ClipReject::TooManyNoCalls);
    }

    let mut n_clip_ops = 0_usize;
    let mut n_indel_ops = 0_usize;
    for s in &rm.spans {
        match s.kind {
            SpanKind::SoftClip => n_clip_ops += 1,
            SpanKind::Insertion | SpanKind::Deletion => n_indel_ops += 1,
            SpanKind::Aligned => {}
        }
    }
    if n_clip_ops > 3 || n_indel_ops > 3 {
        return Err(ClipReject::ComplexCigar);
    }

    Ok(ClippedCandidate {
        tid: record.tid(),
        pos: rm.pos,
        mapq: record.mapq(),
        read_len: rm.query_len,
        anchor_len: rm.spans[rm.anchor].len,
        anchor_qpos: rm.spans[rm.anchor].query_beg,
        clip_len: clip.len,
        clip_beg: clip.ref_beg,
        clip_end: clip.ref_beg + clip.len as i64 - 1,
        clip_mismatch: ndiff_s,
        anchor_mismatch: ndiff_m,
    })
}


/////////////////////////////////////////
///    raw read arena             ///////
/////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// offsets into the arena, stable across growth of its backing storage
pub struct ReadHandle {
    seq_beg: usize,
    seq_len: usize,
    cigar_beg: usize,
    cigar_len: usize,
}

/// Byte arena for reads that must outlive the scan step. The reader
/// reuses its record buffer on every iteration, so sequences and CIGAR
/// strings are copied here and addressed by offset handles. The backing
/// storage may still reallocate while the scan runs, which is why no
/// content can be read back before `freeze` marks the final address as
/// fixed; doing so anyway is a programming error and panics.
#[derive(Debug, Default)]
pub struct ReadArena {
    data: Vec<u8>,
    frozen: bool,
}

impl ReadArena {
    pub fn with_capacity(
        cap: usize
    ) -> Self {
        ReadArena {
            data: Vec::with_capacity(cap),
            frozen: false,
        }
    }

    /// copy one read's sequence and CIGAR string into the arena
    pub fn store(
        &mut self,
        seq: &[u8],
        cigar: &[u8]
    ) -> ReadHandle {
        if self.frozen {
            panic!("ERROR: attempted to store a read in a frozen arena!");
        }
        let seq_beg = self.data.len();
        self.data.extend_from_slice(seq);
        let cigar_beg = self.data.len();
        self.data.extend_from_slice(cigar);
        ReadHandle {
            seq_beg,
            seq_len: seq.len(),
            cigar_beg,
            cigar_len: cigar.len(),
        }
    }

    /// no more growth; stored reads become readable
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn seq(
        &self,
        handle: &ReadHandle
    ) -> &[u8] {
        if !self.frozen {
            panic!("ERROR: read arena accessed before freeze!");
        }
        &self.data[handle.seq_beg..handle.seq_beg + handle.seq_len]
    }

    pub fn cigar(
        &self,
        handle: &ReadHandle
    ) -> &str {
        if !self.frozen {
            panic!("ERROR: read arena accessed before freeze!");
        }
        str::from_utf8(&self.data[handle.cigar_beg..handle.cigar_beg + handle.cigar_len])
            .expect("ERROR: arena holds a non-utf8 CIGAR string!")
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}


/////////////////////////////////////////
///    depth statistics (re-scan) ///////
/////////////////////////////////////////

fn covered_bases(
    rm: &ResolvedAlignment,
    beg: i64,
    end: i64,
    mut add: impl FnMut(i64, i64)
) {
    for s in &rm.spans {
        if s.kind != SpanKind::Aligned {
            continue;
        }
        let r1 = cmp::max(beg, s.ref_beg);
        let r2 = cmp::min(end, s.ref_beg + s.len as i64 - 1);
        if r2 >= r1 {
            add(r1, r2);
        }
    }
}

/// Average per-base depth over the closed interval `[beg,end]` from a
/// stream of records; aligned spans are clipped to the interval. The
/// reader-facing wrappers feed BAM iterators here, the unit tests feed
/// synthetic records.
///
/// Unittest: TRUE
///
pub fn mean_depth_of_records<I>(
    records: I,
    min_mapq: u8,
    beg: i64,
    end: i64
) -> i32
where
    I: IntoIterator<Item = bam::Record>,
{
    let (beg, end) = if beg > end { (end, beg) } else { (beg, end) };
    let dx = (end - beg + 1) as f64;
    let mut covered = 0_f64;
    for record in records {
        if !is_read_count_for_depth_q(&record, min_mapq) {
            continue;
        }
        if let Some(rm) = resolve_cigar(&format!("{}", record.cigar()), record.pos()) {
            covered_bases(&rm, beg, end, |r1, r2| covered += (r2 - r1 + 1) as f64);
        }
    }
    (covered / dx) as i32
}

/// Median per-base depth over `[beg,end]`; the middle element is found
/// by partial selection instead of a full sort.
///
/// Unittest: TRUE
///
pub fn median_depth_of_records<I>(
    records: I,
    min_mapq: u8,
    beg: i64,
    end: i64
) -> i32
where
    I: IntoIterator<Item = bam::Record>,
{
    let (beg, end) = if beg > end { (end, beg) } else { (beg, end) };
    let mut rd = vec![0_i32; (end - beg + 1) as usize];
    for record in records {
        if !is_read_count_for_depth_q(&record, min_mapq) {
            continue;
        }
        if let Some(rm) = resolve_cigar(&format!("{}", record.cigar()), record.pos()) {
            covered_bases(&rm, beg, end, |r1, r2| {
                for k in r1..=r2 {
                    rd[(k - beg) as usize] += 1;
                }
            });
        }
    }
    let mid = rd.len() / 2;
    *rd.select_nth_unstable(mid).1
}

/// Three-window depth around a breakpoint pair from a record stream:
/// `[beg-dx, beg-1]`, `[end+1, end+dx]` and `[beg, end]`, each averaged
/// and rounded to the nearest integer.
///
/// Unittest: TRUE
///
pub fn cnv_depth_of_records<I>(
    records: I,
    min_mapq: u8,
    beg: i64,
    end: i64,
    dx: i64
) -> (i32, i32, i32)
where
    I: IntoIterator<Item = bam::Record>,
{
    let (beg, end) = if beg > end { (end, beg) } else { (beg, end) };
    let dx = cmp::max(dx, 1);
    let mut rd1 = 0_f64;
    let mut rd2 = 0_f64;
    let mut rdin = 0_f64;
    for record in records {
        if !is_read_count_for_depth_q(&record, min_mapq) {
            continue;
        }
        if let Some(rm) = resolve_cigar(&format!("{}", record.cigar()), record.pos()) {
            covered_bases(&rm, beg - dx, end + dx, |r1, r2| {
                let a = cmp::max(beg - dx, r1);
                let b = cmp::min(beg - 1, r2);
                if b >= a {
                    rd1 += (b - a + 1) as f64;
                }
                let a = cmp::max(end + 1, r1);
                let b = cmp::min(end + dx, r2);
                if b >= a {
                    rd2 += (b - a + 1) as f64;
                }
                let a = cmp::max(beg, r1);
                let b = cmp::min(end, r2);
                if b >= a {
                    rdin += (b - a + 1) as f64;
                }
            });
        }
    }
    rd1 /= dx as f64;
    rd2 /= dx as f64;
    rdin /= (end - beg + 1) as f64 + 1e-9;
    ((rd1 + 0.5) as i32, (rd2 + 0.5) as i32, (rdin + 0.5) as i32)
}

fn ensure_tid(
    bam: &bam::IndexedReader,
    tid: i32
) -> i64 {
    if tid < 0 || tid as u32 >= bam.header().target_count() {
        panic!("ERROR: reference id {} is out of range!", tid);
    }
    bam.header()
        .target_len(tid as u32)
        .expect("ERROR: could not get the contig length!") as i64
}

/// re-scan wrapper around `mean_depth_of_records`
///
/// Unittest: FALSE
///
pub fn mean_read_depth(
    bam: &mut bam::IndexedReader,
    min_mapq: u8,
    tid: i32,
    beg: i64,
    end: i64
) -> i32 {
    let (beg, end) = if beg > end { (end, beg) } else { (beg, end) };
    ensure_tid(bam, tid);
    bam.fetch((tid, cmp::max(beg, 0), end + 1))
        .expect("ERROR: could not fetch region for mean depth!");
    let records: Vec<bam::Record> = bam
        .records()
        .map(|r| r.expect("ERROR: could not read record!"))
        .collect();
    mean_depth_of_records(records, min_mapq, beg, end)
}

/// re-scan wrapper around `median_depth_of_records`
///
/// Unittest: FALSE
///
pub fn median_read_depth(
    bam: &mut bam::IndexedReader,
    min_mapq: u8,
    tid: i32,
    beg: i64,
    end: i64
) -> i32 {
    let (beg, end) = if beg > end { (end, beg) } else { (beg, end) };
    ensure_tid(bam, tid);
    bam.fetch((tid, cmp::max(beg, 0), end + 1))
        .expect("ERROR: could not fetch region for median depth!");
    let records: Vec<bam::Record> = bam
        .records()
        .map(|r| r.expect("ERROR: could not read record!"))
        .collect();
    median_depth_of_records(records, min_mapq, beg, end)
}

/// Flank and inner depth from a fresh interval scan. A span beyond
/// `MAX_COUNTED_SPAN` only gets the two flanks (inner stays -1) so that
/// chromosome-scale events do not walk the whole inner interval.
///
/// Unittest: FALSE (window logic tested through `cnv_depth_of_records`)
///
pub fn flank_inner_depth_from_scan(
    bam: &mut bam::IndexedReader,
    min_mapq: u8,
    tid: i32,
    beg: i64,
    end: i64,
    dx: i64
) -> (i32, i32, i32) {
    let (beg, end) = if beg > end { (end, beg) } else { (beg, end) };
    ensure_tid(bam, tid);
    if end - beg > MAX_COUNTED_SPAN {
        let d1 = mean_read_depth(bam, min_mapq, tid, cmp::max(1, beg - dx), beg - 1);
        let d2 = mean_read_depth(bam, min_mapq, tid, end + 1, end + dx);
        return (d1, d2, -1);
    }
    bam.fetch((tid, cmp::max(beg - dx, 0), end + dx + 1))
        .expect("ERROR: could not fetch region for flank depth!");
    let records: Vec<bam::Record> = bam
        .records()
        .map(|r| r.expect("ERROR: could not read record!"))
        .collect();
    cnv_depth_of_records(records, min_mapq, beg, end, dx)
}

/// Fractions of mapq==0 and mapq<=10 reads over an interval; -0.01001
/// marks an interval that was too large or too empty to profile.
///
/// Unittest: TRUE
///
pub fn mapq_profile_of_records<I>(
    records: I
) -> (f64, f64)
where
    I: IntoIterator<Item = bam::Record>,
{
    let mut count = 0_f64;
    let mut q0 = 0_f64;
    let mut q10 = 0_f64;
    for record in records {
        count += 1.0;
        if record.mapq() == 0 {
            q0 += 1.0;
        }
        if record.mapq() <= 10 {
            q10 += 1.0;
        }
    }
    if count > 1.0 {
        (q0 / count, q10 / count)
    } else {
        (-0.01001, -0.01001)
    }
}

/// mapping quality profile of a region
///
/// Unittest: FALSE
///
pub fn region_mapq_profile(
    bam: &mut bam::IndexedReader,
    tid: i32,
    beg: i64,
    end: i64
) -> (f64, f64) {
    let (beg, end) = if beg > end { (end, beg) } else { (beg, end) };
    ensure_tid(bam, tid);
    if end - beg > MAX_COUNTED_SPAN {
        return (-0.01001, -0.01001);
    }
    bam.fetch((tid, cmp::max(beg, 0), end + 1))
        .expect("ERROR: could not fetch region for mapq profile!");
    let records: Vec<bam::Record> = bam
        .records()
        .map(|r| r.expect("ERROR: could not read record!"))
        .collect();
    mapq_profile_of_records(records)
}


/////////////////////////////////////////
///    pair statistics            ///////
/////////////////////////////////////////

/// Breakpoint-adjacent positions of one discordant pair. The forward
/// mate contributes its own aligned end and the mate start, both exact;
/// seen from the reverse mate the partner's end can only be approximated
/// as mate start plus read length because its CIGAR is not at hand.
///
/// Unittest: TRUE
///
pub fn inner_pair_ends(
    record: &bam::Record
) -> Option<InnerPair> {
    if !record.is_reverse() {
        let rm = resolve_cigar(&format!("{}", record.cigar()), record.pos())?;
        let mut ref_end = record.pos();
        for s in &rm.spans {
            if s.kind == SpanKind::Aligned || s.kind == SpanKind::Deletion {
                ref_end = cmp::max(ref_end, s.ref_beg + s.len as i64 - 1);
            }
        }
        Some(InnerPair {
            f2: ref_end,
            f2_exact: true,
            r1: record.mpos(),
            r1_exact: true,
        })
    } else {
        Some(InnerPair {
            f2: record.mpos() + record.seq_len() as i64,
            f2_exact: false,
            r1: record.pos(),
            r1_exact: true,
        })
    }
}

/// Normal pairs spanning one position: proper F/R pairs whose insert
/// stays within mean +- 3 sd and whose fragment covers `pos`. Counted on
/// the forward mate only so one pair counts once.
///
/// Unittest: TRUE
///
pub fn normal_pairs_spanning<I>(
    records: I,
    params: &ScanParams,
    pos: i64
) -> i32
where
    I: IntoIterator<Item = bam::Record>,
{
    let mut count = 0_i32;
    for record in records {
        if !is_read_count_for_pair(&record, params) {
            continue;
        }
        if record.is_reverse() {
            continue;
        }
        let isize = record.insert_size();
        if isize <= 0 {
            continue;
        }
        if (isize - params.pe_insert).abs() > params.pe_insert_sd * 3 {
            continue;
        }
        if record.pos() <= pos && record.pos() + isize > pos {
            count += 1;
        }
    }
    count
}

/// Abnormal pairs consistent with a junction between `lo` and `hi`:
/// forward mate ending within one insert window of `lo`, reverse mate
/// starting within one window of `hi`.
///
/// Unittest: TRUE
///
pub fn junction_pairs<I>(
    records: I,
    params: &ScanParams,
    lo: i64,
    hi: i64
) -> i32
where
    I: IntoIterator<Item = bam::Record>,
{
    let win = params.pe_insert + params.pe_insert_sd * 3;
    let mut count = 0_i32;
    for record in records {
        if !is_read_count_for_pair(&record, params) {
            continue;
        }
        if record.is_reverse() {
            continue;
        }
        if record.pos() < lo - win || record.pos() > lo {
            continue;
        }
        let mpos = record.mpos();
        if mpos >= hi - params.read_len && mpos <= hi + win {
            count += 1;
        }
    }
    count
}

/// Per-side normal spanning-pair counts and the junction-consistent
/// abnormal-pair count for one breakpoint pair. Three window fetches so
/// a large event never re-reads its whole inner span.
///
/// Unittest: FALSE (counting logic tested through the record variants)
///
pub fn pairs_cross_region(
    bam: &mut bam::IndexedReader,
    params: &ScanParams,
    tid: i32,
    f2: i64,
    r1: i64
) -> (i32, i32, i32) {
    ensure_tid(bam, tid);
    let win = params.pe_insert + params.pe_insert_sd * 3;
    let (lo, hi) = if f2 > r1 { (r1, f2) } else { (f2, r1) };

    let mut side = |pos: i64| -> Vec<bam::Record> {
        bam.fetch((tid, cmp::max(pos - win, 0), pos + win))
            .expect("ERROR: could not fetch region for pair counting!");
        bam.records()
            .map(|r| r.expect("ERROR: could not read record!"))
            .collect()
    };

    let f2_records = side(f2);
    let r1_records = side(r1);
    let f2_rp = normal_pairs_spanning(f2_records, params, f2);
    let r1_rp = normal_pairs_spanning(r1_records, params, r1);

    bam.fetch((tid, cmp::max(lo - win, 0), lo + 1))
        .expect("ERROR: could not fetch region for pair counting!");
    let junction_records: Vec<bam::Record> = bam
        .records()
        .map(|r| r.expect("ERROR: could not read record!"))
        .collect();
    let fr_rp = junction_pairs(junction_records, params, lo, hi);

    (f2_rp, r1_rp, fr_rp)
}


/////////////////////////////////////////
///    region scan                ///////
/////////////////////////////////////////

#[derive(Debug, Clone, Copy)]
/// one clip candidate buffered during the scan
pub struct ScanRead {
    /// sequence and CIGAR stored in the arena
    pub read: ReadHandle,
    /// uncalibrated record position, needed to re-resolve the CIGAR
    pub pos: i64,
    pub cand: ClippedCandidate,
}

#[derive(Debug)]
/// everything one linear pass over a region produces
pub struct RegionScan {
    /// per-base depth of the scanned contig
    pub ctx: ScanContext,
    /// frozen raw-read storage for the clip candidates
    pub arena: ReadArena,
    /// candidates clipped behind their anchor
    pub ms_reads: Vec<ScanRead>,
    /// candidates clipped in front of their anchor
    pub sm_reads: Vec<ScanRead>,
    /// discordant pair candidates within the observed data range
    pub pairs: Vec<InnerPair>,
    /// first and last record position actually seen
    pub data_beg: i64,
    pub data_end: i64,
    pub record_count: usize,
}

/// One linear forward pass over a record stream: accumulates the contig
/// depth array, extracts discordant pair candidates, buffers clip
/// candidates in the arena and re-estimates the insert size model from
/// proper pairs. The arena is frozen before returning, pair candidates
/// outside the observed data range are dropped.
///
/// The depth array uses the unfiltered mapping quality floor of 0 so a
/// later refinement pass can apply its own threshold.
///
/// Unittest: TRUE
///
pub fn scan_records<I>(
    records: I,
    fasta: &[u8],
    params: &mut ScanParams,
    tid: i32,
    beg: i64,
    end: i64,
    min_pair_length: i64
) -> RegionScan
where
    I: IntoIterator<Item = bam::Record>,
{
    let mut ctx = ScanContext::new(tid, vec![0_u32; fasta.len()]);
    let mut arena = ReadArena::with_capacity(ARENA_RESERVE);
    let mut ms_reads: Vec<ScanRead> = Vec::new();
    let mut sm_reads: Vec<ScanRead> = Vec::new();
    let mut pairs: Vec<InnerPair> = Vec::new();

    let mut count = 0_usize;
    let mut data_beg = 0_i64;
    let mut data_end = 0_i64;
    let mut isize_sum = 0_f64;
    let mut isize_sq = 0_f64;
    let mut isize_n = 0_f64;

    for record in records {
        if record.tid() != tid {
            break;
        }
        if record.pos() > end {
            break;
        }
        if count == 0 {
            data_beg = record.pos();
        }
        data_end = record.pos();
        count += 1;
        if count % 1_000_000 == 0 {
            info!("processed {} reads at position {}", count, record.pos());
        }

        let cigar = format!("{}", record.cigar());

        if is_read_count_for_depth_q(&record, 0) {
            if let Some(rm) = resolve_cigar(&cigar, record.pos()) {
                for s in &rm.spans {
                    if s.kind != SpanKind::Aligned {
                        continue;
                    }
                    let r_beg = cmp::max(s.ref_beg, 0);
                    let r_end =
                        cmp::min(s.ref_beg + s.len as i64 - 1, ctx.depth.len() as i64 - 1);
                    let mut k = r_beg;
                    while k <= r_end {
                        ctx.depth[k as usize] += 1;
                        k += 1;
                    }
                }
            }
        }

        if record.mpos() >= beg
            && record.mpos() <= end
            && record.insert_size().abs() >= min_pair_length
            && is_read_count_for_pair(&record, params)
        {
            if let Some(ipair) = inner_pair_ends(&record) {
                if ipair.f2 > 0 && ipair.r1 > 0 {
                    pairs.push(ipair);
                }
            }
        }

        // re-estimate the insert model from unambiguous proper pairs
        if record.is_proper_pair()
            && is_read_count_for_depth_q(&record, 0)
            && record.insert_size().abs() > params.pe_insert - 10 * params.pe_insert_sd
            && record.insert_size().abs() < params.pe_insert + 10 * params.pe_insert_sd
        {
            let isize = record.insert_size().abs() as f64;
            isize_sum += isize;
            isize_sq += isize * isize;
            isize_n += 1.0;
        }

        match keep_for_clip(&record, fasta, params) {
            Ok(cand) => {
                let handle = arena.store(&record.seq().as_bytes(), cigar.as_bytes());
                let sread = ScanRead {
                    read: handle,
                    pos: record.pos(),
                    cand,
                };
                if cand.clip_beg > cand.pos {
                    ms_reads.push(sread);
                } else {
                    sm_reads.push(sread);
                }
            }
            Err(reason) => {
                debug!("clip gate at {} rejected: {}", record.pos(), reason.name())
            }
        }
    }
    arena.freeze();

    pairs.retain(|p| {
        p.f2 >= data_beg && p.f2 <= data_end && p.r1 >= data_beg && p.r1 <= data_end
    });

    if isize_n > 2.0 {
        let mean = isize_sum / isize_n;
        let mut sd = ((isize_sq - mean * mean * isize_n) / isize_n).sqrt();
        if sd < 30.0 {
            warn!("insert size sd {:.1} is too small, changed to 50", sd);
            sd = 50.0;
        }
        if !params.pe_set_by_user {
            params.is_paired = true;
            params.pe_insert = mean as i64;
            params.pe_insert_sd = sd as i64;
        }
    }

    info!(
        "data range {}-{}  MS:{}  SM:{}  arena:{}  abnormal pairs:{}  insert:{} +- {}",
        data_beg,
        data_end,
        ms_reads.len(),
        sm_reads.len(),
        arena.len(),
        pairs.len(),
        params.pe_insert,
        params.pe_insert_sd
    );

    RegionScan {
        ctx,
        arena,
        ms_reads,
        sm_reads,
        pairs,
        data_beg,
        data_end,
        record_count: count,
    }
}

/// fetch a region from an indexed BAM and run the linear scan over it
///
/// Unittest: FALSE
///
pub fn scan_region(
    bam: &mut bam::IndexedReader,
    fasta: &[u8],
    params: &mut ScanParams,
    tid: i32,
    beg: i64,
    end: i64,
    min_pair_length: i64
) -> RegionScan {
    let contig_len = ensure_tid(bam, tid);
    if fasta.len() as i64 != contig_len {
        panic!(
            "ERROR: reference sequence has {} bases but the header expects {}!",
            fasta.len(),
            contig_len
        );
    }
    bam.fetch((tid, cmp::max(beg, 0), end + 1))
        .expect("ERROR: could not fetch the scan region!");
    let records: Vec<bam::Record> = bam
        .records()
        .map(|r| r.expect("ERROR: could not read record!"))
        .collect();
    scan_records(records, fasta, params, tid, beg, end, min_pair_length)
}


/////////////////////////////////////////
///    per-candidate statistics   ///////
/////////////////////////////////////////

/// Statistics for a freshly discovered breakpoint via interval re-scans
/// with an unfiltered mapping quality floor. Used when no depth buffer
/// is loaded for the candidate's contig.
///
/// Unittest: FALSE
///
pub fn stat_region_rescan(
    bam: &mut bam::IndexedReader,
    params: &ScanParams,
    ibp: &mut BreakpointEvidence
) {
    let span = (ibp.f2 - ibp.r1).abs();
    let mut dx = params.read_len * 5;
    if dx / 3 > span {
        dx = span * 3;
    }
    if dx < params.read_len {
        dx = params.read_len;
    }

    let (f2, r1) = if ibp.f2 > ibp.r1 {
        (ibp.r1, ibp.f2)
    } else {
        (ibp.f2, ibp.r1)
    };
    if r1 - f2 > params.read_len / 2 {
        let (d1, d2, din) = flank_inner_depth_from_scan(bam, 0, ibp.tid, f2, r1, dx);
        ibp.f2_rd = d1;
        ibp.r1_rd = d2;
        ibp.rd = din;
    }

    if params.is_paired && span > params.pe_insert_sd * 3 {
        let (f2_rp, r1_rp, fr_rp) = pairs_cross_region(bam, params, ibp.tid, ibp.f2, ibp.r1);
        ibp.f2_rp = f2_rp;
        ibp.r1_rp = r1_rp;
        ibp.fr_rp = fr_rp;
    }
}

/// Statistics for one candidate from the pre-built depth buffer: the
/// junction slide, the `dx`-windowed flank/inner depths, the 100-base
/// probes and the pair counts. A non-positive `dx` derives the window
/// from the event span clamped to one to five read lengths.
///
/// Unittest: FALSE (all window logic tested in `common`)
///
pub fn stat_region(
    bam: &mut bam::IndexedReader,
    fasta: &[u8],
    ctx: &ScanContext,
    params: &ScanParams,
    ibp: &mut BreakpointEvidence,
    dx: i64
) {
    if ctx.is_bound_to(ibp.tid) && ctx.depth.len() == fasta.len() {
        let (dx_f2, dx_r1) = find_displacement(fasta, ibp.f2, ibp.r1);
        ibp.un = (dx_f2 + dx_r1) as i32;
    }

    let mut dx = dx;
    if dx <= 0 {
        dx = (ibp.f2 - ibp.r1).abs() * 2;
        if dx > params.read_len * 5 {
            dx = params.read_len * 5;
        }
        if dx < params.read_len {
            dx = params.read_len;
        }
    }

    let (d1, d2, din) = flank_inner_depth(ctx, ibp.tid, fasta.len(), ibp.f2, ibp.r1, dx);
    ibp.f2_rd = d1;
    ibp.r1_rd = d2;
    ibp.rd = din;

    let (f1, p1, p2, f2) = flank_inner_depth_100(ctx, ibp.tid, fasta.len(), ibp.f2, ibp.r1);
    ibp.f2_rd_100 = f1;
    ibp.rd_f2_100 = p1;
    ibp.rd_r1_100 = p2;
    ibp.r1_rd_100 = f2;

    if params.is_paired
        && (ibp.r1 - ibp.f2 > params.pe_insert_sd * 3 || ibp.r1 - ibp.f2 < -params.read_len)
    {
        let (f2_rp, r1_rp, fr_rp) = pairs_cross_region(bam, params, ibp.tid, ibp.f2, ibp.r1);
        ibp.f2_rp = f2_rp;
        ibp.r1_rp = r1_rp;
        ibp.fr_rp = fr_rp;
    }
}


#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;

    fn synth_bases(n: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            out.push(b"ACGT"[((state >> 33) & 3) as usize]);
        }
        out
    }

    fn flip(base: u8) -> u8 {
        match base {
            b'A' => b'C',
            b'C' => b'A',
            b'G' => b'T',
            _ => b'G',
        }
    }

    fn test_header(len: usize) -> bam::HeaderView {
        let mut header = bam::Header::new();
        let mut rec = bam::header::HeaderRecord::new(b"SQ");
        rec.push_tag(b"SN", &"chrS");
        rec.push_tag(b"LN", &len);
        header.push_record(&rec);
        bam::HeaderView::from_header(&header)
    }

    // build a record from a SAM line against the in-memory header,
    // pos1/mpos1 are 1-based as in SAM text
    fn sam_record(
        hv: &bam::HeaderView,
        name: &str,
        flag: u16,
        pos1: i64,
        mapq: u8,
        cigar: &str,
        mpos1: i64,
        isize: i64,
        seq: &[u8],
        qual: Option<&str>,
    ) -> bam::Record {
        let quals = match qual {
            Some(q) => q.to_string(),
            None => "I".repeat(seq.len()),
        };
        let rnext = if flag & 1 != 0 { "=" } else { "*" };
        let line = format!(
            "{}\t{}\tchrS\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            name,
            flag,
            pos1,
            mapq,
            cigar,
            rnext,
            mpos1,
            isize,
            str::from_utf8(seq).unwrap(),
            quals
        );
        bam::Record::from_sam(hv, line.as_bytes()).unwrap()
    }

    // a clean clip read: anchor matches the reference, clip disagrees
    fn clip_read_ms(hv: &bam::HeaderView, fasta: &[u8], pos0: usize) -> bam::Record {
        let mut seq = fasta[pos0..pos0 + 30].to_vec();
        for i in 0..20 {
            seq.push(flip(fasta[pos0 + 30 + i]));
        }
        sam_record(hv, "ms", 0, pos0 as i64 + 1, 60, "30M20S", 0, 0, &seq, None)
    }

    fn clip_read_sm(hv: &bam::HeaderView, fasta: &[u8], pos0: usize) -> bam::Record {
        let mut seq = Vec::new();
        for i in 0..20 {
            seq.push(flip(fasta[pos0 - 20 + i]));
        }
        seq.extend_from_slice(&fasta[pos0..pos0 + 30]);
        sam_record(hv, "sm", 0, pos0 as i64 + 1, 60, "20S30M", 0, 0, &seq, None)
    }

    /////////////////////////////////////////
    ///    admissibility predicates   ///////
    /////////////////////////////////////////

    #[test]
    fn depth_filter_rejects_default_flags() {
        let hv = test_header(2000);
        let seq = synth_bases(50, 3);
        for flag in [4_u16, 256, 512, 1024] {
            let record = sam_record(&hv, "r", flag, 1001, 60, "50M", 0, 0, &seq, None);
            assert!(!is_read_count_for_depth_q(&record, 0), "flag {}", flag);
        }
        let record = sam_record(&hv, "r", 0, 1001, 60, "50M", 0, 0, &seq, None);
        assert!(is_read_count_for_depth_q(&record, 0));
    }

    #[test]
    fn depth_filter_mapq_monotonic() {
        let hv = test_header(2000);
        let seq = synth_bases(50, 3);
        let record = sam_record(&hv, "r", 0, 1001, 30, "50M", 0, 0, &seq, None);
        for q in 1..=60_u8 {
            if is_read_count_for_depth_q(&record, q) {
                assert!(is_read_count_for_depth_q(&record, q - 1));
            }
        }
        assert!(is_read_count_for_depth_q(&record, 30));
        assert!(!is_read_count_for_depth_q(&record, 31));
    }

    #[test]
    fn pair_filter_requires_orientation() {
        let hv = test_header(5000);
        let params = ScanParams::default();
        let seq = synth_bases(50, 5);
        // proper F/R pair
        let record = sam_record(&hv, "p", 99, 1001, 60, "50M", 1501, 550, &seq, None);
        assert!(is_read_count_for_pair(&record, &params));
        // both mates forward
        let record = sam_record(&hv, "p", 65, 1001, 60, "50M", 1501, 550, &seq, None);
        assert!(!is_read_count_for_pair(&record, &params));
    }

    /////////////////////////////////////////
    ///    clip gate                  ///////
    /////////////////////////////////////////

    #[test]
    fn clip_gate_accepts_clean_candidate() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let record = clip_read_ms(&hv, &fasta, 100);
        let cand = keep_for_clip(&record, &fasta, &ScanParams::default()).unwrap();
        assert_eq!(cand.tid, 0);
        assert_eq!(cand.pos, 100);
        assert_eq!(cand.read_len, 50);
        assert_eq!(cand.anchor_len, 30);
        assert_eq!(cand.clip_len, 20);
        assert_eq!(cand.clip_beg, 130);
        assert_eq!(cand.clip_end, 149);
        assert_eq!(cand.clip_mismatch, 20);
        assert_eq!(cand.anchor_mismatch, 0);
    }

    #[test]
    fn clip_gate_rejects_low_mapq() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut seq = fasta[100..130].to_vec();
        for i in 0..20 {
            seq.push(flip(fasta[130 + i]));
        }
        let record = sam_record(&hv, "r", 0, 101, 5, "30M20S", 0, 0, &seq, None);
        assert_eq!(
            keep_for_clip(&record, &fasta, &ScanParams::default()),
            Err(ClipReject::NotDepthCountable)
        );
    }

    #[test]
    fn clip_gate_rejects_simple_cigar() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let seq = fasta[100..150].to_vec();
        let record = sam_record(&hv, "r", 0, 101, 60, "50M", 0, 0, &seq, None);
        assert_eq!(
            keep_for_clip(&record, &fasta, &ScanParams::default()),
            Err(ClipReject::SimpleCigar)
        );
    }

    #[test]
    fn clip_gate_rejects_short_clip() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut seq = fasta[100..145].to_vec();
        for i in 0..5 {
            seq.push(flip(fasta[145 + i]));
        }
        let record = sam_record(&hv, "r", 0, 101, 60, "45M5S", 0, 0, &seq, None);
        assert_eq!(
            keep_for_clip(&record, &fasta, &ScanParams::default()),
            Err(ClipReject::ShortClip)
        );
    }

    #[test]
    fn clip_gate_rejects_reference_like_clip() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        // first clip base disagrees so calibration stops there, the rest
        // matches the reference: only one informative mismatch
        let mut seq = fasta[100..130].to_vec();
        seq.push(flip(fasta[130]));
        seq.extend_from_slice(&fasta[131..150]);
        let record = sam_record(&hv, "r", 0, 101, 60, "30M20S", 0, 0, &seq, None);
        assert_eq!(
            keep_for_clip(&record, &fasta, &ScanParams::default()),
            Err(ClipReject::ClipMatchesReference)
        );
    }

    #[test]
    fn clip_gate_rejects_low_quality_clip() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut seq = fasta[100..130].to_vec();
        for i in 0..20 {
            seq.push(flip(fasta[130 + i]));
        }
        let qual = format!("{}{}", "I".repeat(30), "#".repeat(20));
        let record = sam_record(&hv, "r", 0, 101, 60, "30M20S", 0, 0, &seq, Some(&qual));
        assert_eq!(
            keep_for_clip(&record, &fasta, &ScanParams::default()),
            Err(ClipReject::LowQualityClip)
        );
    }

    #[test]
    fn clip_gate_skips_quality_check_without_qualities() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut seq = fasta[100..130].to_vec();
        for i in 0..20 {
            seq.push(flip(fasta[130 + i]));
        }
        let record = sam_record(&hv, "r", 0, 101, 60, "30M20S", 0, 0, &seq, Some("*"));
        assert!(keep_for_clip(&record, &fasta, &ScanParams::default()).is_ok());
    }

    #[test]
    fn clip_gate_rejects_dominant_clip() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut seq = fasta[100..110].to_vec();
        for i in 0..42 {
            seq.push(flip(fasta[110 + i]));
        }
        let record = sam_record(&hv, "r", 0, 101, 60, "10M42S", 0, 0, &seq, None);
        assert_eq!(
            keep_for_clip(&record, &fasta, &ScanParams::default()),
            Err(ClipReject::ClipDominant)
        );
    }

    #[test]
    fn clip_gate_rejects_complex_cigar() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut seq = fasta[100..110].to_vec();
        seq.push(b'A');
        seq.extend_from_slice(&fasta[110..118]);
        seq.push(b'A');
        seq.extend_from_slice(&fasta[118..126]);
        seq.push(b'A');
        seq.extend_from_slice(&fasta[126..134]);
        seq.push(b'A');
        seq.extend_from_slice(&fasta[134..142]);
        for i in 0..12 {
            seq.push(flip(fasta[142 + i]));
        }
        let record = sam_record(
            &hv,
            "r",
            0,
            101,
            60,
            "10M1I8M1I8M1I8M1I8M12S",
            0,
            0,
            &seq,
            None,
        );
        assert_eq!(
            keep_for_clip(&record, &fasta, &ScanParams::default()),
            Err(ClipReject::ComplexCigar)
        );
    }

    /////////////////////////////////////////
    ///    read arena                 ///////
    /////////////////////////////////////////

    #[test]
    fn arena_round_trip_after_freeze() {
        let mut arena = ReadArena::with_capacity(1024);
        let h1 = arena.store(b"ACGTACGT", b"4M4S");
        let h2 = arena.store(b"TTTT", b"4M");
        arena.freeze();
        assert_eq!(arena.seq(&h1), b"ACGTACGT");
        assert_eq!(arena.cigar(&h1), "4M4S");
        assert_eq!(arena.seq(&h2), b"TTTT");
        assert_eq!(arena.cigar(&h2), "4M");
    }

    #[test]
    #[should_panic]
    fn arena_read_before_freeze_is_fatal() {
        let mut arena = ReadArena::with_capacity(1024);
        let h = arena.store(b"ACGT", b"4M");
        arena.seq(&h);
    }

    #[test]
    #[should_panic]
    fn arena_store_after_freeze_is_fatal() {
        let mut arena = ReadArena::with_capacity(1024);
        arena.freeze();
        arena.store(b"ACGT", b"4M");
    }

    /////////////////////////////////////////
    ///    depth statistics           ///////
    /////////////////////////////////////////

    #[test]
    fn mean_depth_uniform_coverage() {
        let hv = test_header(2000);
        let fasta = synth_bases(2000, 7);
        let seq = fasta[1000..1050].to_vec();
        let mut records = Vec::new();
        for i in 0..50 {
            records.push(sam_record(
                &hv,
                &format!("r{}", i),
                0,
                1001,
                60,
                "50M",
                0,
                0,
                &seq,
                None,
            ));
        }
        assert_eq!(mean_depth_of_records(records, 10, 1000, 1049), 50);
    }

    #[test]
    fn median_depth_uniform_coverage() {
        let hv = test_header(2000);
        let fasta = synth_bases(2000, 7);
        let seq = fasta[1000..1050].to_vec();
        let mut records = Vec::new();
        for i in 0..50 {
            records.push(sam_record(
                &hv,
                &format!("r{}", i),
                0,
                1001,
                60,
                "50M",
                0,
                0,
                &seq,
                None,
            ));
        }
        assert_eq!(median_depth_of_records(records, 10, 1000, 1049), 50);
    }

    #[test]
    fn mean_depth_ignores_filtered_reads() {
        let hv = test_header(2000);
        let fasta = synth_bases(2000, 7);
        let seq = fasta[1000..1050].to_vec();
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(sam_record(
                &hv,
                &format!("r{}", i),
                0,
                1001,
                60,
                "50M",
                0,
                0,
                &seq,
                None,
            ));
        }
        // duplicates must not count
        for i in 0..10 {
            records.push(sam_record(
                &hv,
                &format!("d{}", i),
                1024,
                1001,
                60,
                "50M",
                0,
                0,
                &seq,
                None,
            ));
        }
        assert_eq!(mean_depth_of_records(records, 10, 1000, 1049), 10);
    }

    #[test]
    fn cnv_three_windows_uniform() {
        let hv = test_header(2000);
        let fasta = synth_bases(2000, 7);
        let seq = fasta[900..1200].to_vec();
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(sam_record(
                &hv,
                &format!("r{}", i),
                0,
                901,
                60,
                "300M",
                0,
                0,
                &seq,
                None,
            ));
        }
        assert_eq!(
            cnv_depth_of_records(records, 10, 1000, 1100, 50),
            (10, 10, 10)
        );
    }

    #[test]
    fn mapq_profile_fractions() {
        let hv = test_header(2000);
        let seq = synth_bases(50, 3);
        let mut records = Vec::new();
        for (i, q) in [0_u8, 0, 5, 30].iter().enumerate() {
            records.push(sam_record(
                &hv,
                &format!("r{}", i),
                0,
                1001,
                *q,
                "50M",
                0,
                0,
                &seq,
                None,
            ));
        }
        let (q0, q10) = mapq_profile_of_records(records);
        assert!((q0 - 0.5).abs() < 1e-9);
        assert!((q10 - 0.75).abs() < 1e-9);
    }

    #[test]
    fn mapq_profile_sentinel_on_empty() {
        let (q0, q10) = mapq_profile_of_records(Vec::new());
        assert!((q0 + 0.01001).abs() < 1e-9);
        assert!((q10 + 0.01001).abs() < 1e-9);
    }

    /////////////////////////////////////////
    ///    pair statistics            ///////
    /////////////////////////////////////////

    #[test]
    fn inner_pair_ends_forward_is_exact() {
        let hv = test_header(5000);
        let seq = synth_bases(50, 5);
        let record = sam_record(&hv, "p", 99, 1001, 60, "50M", 2001, 1050, &seq, None);
        let ipair = inner_pair_ends(&record).unwrap();
        assert_eq!(ipair.f2, 1049);
        assert!(ipair.f2_exact);
        assert_eq!(ipair.r1, 2000);
        assert!(ipair.r1_exact);
    }

    #[test]
    fn inner_pair_ends_reverse_approximates_mate() {
        let hv = test_header(5000);
        let seq = synth_bases(50, 5);
        let record = sam_record(&hv, "p", 147, 2001, 60, "50M", 1001, -1050, &seq, None);
        let ipair = inner_pair_ends(&record).unwrap();
        assert_eq!(ipair.f2, 1050);
        assert!(!ipair.f2_exact);
        assert_eq!(ipair.r1, 2000);
        assert!(ipair.r1_exact);
    }

    #[test]
    fn normal_pairs_spanning_counts_forward_mates() {
        let hv = test_header(5000);
        let params = ScanParams::default();
        let seq = synth_bases(50, 5);
        let mut records = Vec::new();
        for i in 0..8 {
            // fragment [800, 1300) spans position 1000
            records.push(sam_record(
                &hv,
                &format!("p{}", i),
                99,
                801,
                60,
                "50M",
                1251,
                500,
                &seq,
                None,
            ));
        }
        // insert far outside the model, not a normal pair
        records.push(sam_record(&hv, "x", 99, 801, 60, "50M", 1651, 900, &seq, None));
        // reverse mate of a spanning pair must not double count
        records.push(sam_record(&hv, "p0", 147, 1251, 60, "50M", 801, -500, &seq, None));
        assert_eq!(normal_pairs_spanning(records, &params, 1000), 8);
    }

    #[test]
    fn junction_pairs_counts_bridging_mates() {
        let hv = test_header(100000);
        let mut hv_params = ScanParams::default();
        hv_params.read_len = 100;
        let seq = synth_bases(50, 5);
        let mut records = Vec::new();
        for i in 0..5 {
            // forward mate just left of the junction at 1000, mate lands
            // right of the partner junction at 50000
            records.push(sam_record(
                &hv,
                &format!("j{}", i),
                97,
                601,
                60,
                "50M",
                49951,
                49500,
                &seq,
                None,
            ));
        }
        // mate too far from the partner junction
        records.push(sam_record(&hv, "x", 97, 601, 60, "50M", 60001, 59500, &seq, None));
        assert_eq!(junction_pairs(records, &hv_params, 1000, 50000), 5);
    }

    /////////////////////////////////////////
    ///    region scan                ///////
    /////////////////////////////////////////

    #[test]
    fn scan_collects_depth_clips_and_pairs() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut params = ScanParams::default();
        let depth_seq = fasta[500..550].to_vec();
        let pair_seq = synth_bases(50, 5);

        let mut records = Vec::new();
        records.push(clip_read_ms(&hv, &fasta, 100));
        records.push(clip_read_sm(&hv, &fasta, 300));
        for i in 0..20 {
            records.push(sam_record(
                &hv,
                &format!("d{}", i),
                0,
                501,
                60,
                "50M",
                0,
                0,
                &depth_seq,
                None,
            ));
        }
        // one abnormal pair, seen from both mates
        records.push(sam_record(&hv, "a", 99, 701, 60, "50M", 1501, 850, &pair_seq, None));
        // one proper pair inside the insert model
        records.push(sam_record(&hv, "n", 99, 901, 60, "50M", 1301, 450, &pair_seq, None));
        records.push(sam_record(&hv, "n", 147, 1301, 60, "50M", 901, -450, &pair_seq, None));
        records.push(sam_record(&hv, "a", 147, 1501, 60, "50M", 701, -850, &pair_seq, None));

        let scan = scan_records(records, &fasta, &mut params, 0, 0, 2000, 800);

        assert_eq!(scan.data_beg, 100);
        assert_eq!(scan.data_end, 1500);
        assert_eq!(scan.ctx.depth[520], 20);
        assert_eq!(scan.ctx.depth[499], 0);
        assert_eq!(scan.ms_reads.len(), 1);
        assert_eq!(scan.sm_reads.len(), 1);
        // both mates of the long pair qualify, the short pair does not
        assert_eq!(scan.pairs.len(), 2);
        assert_eq!(scan.pairs[0].f2, 749);
        assert_eq!(scan.pairs[0].r1, 1500);

        // stored reads are readable after the scan froze the arena
        let ms = &scan.ms_reads[0];
        assert_eq!(scan.arena.seq(&ms.read).len(), 50);
        assert_eq!(scan.arena.cigar(&ms.read), "30M20S");
        assert_eq!(ms.cand.clip_beg, 130);

        // four proper-pair records re-estimated the insert model
        assert!(params.is_paired);
        assert_eq!(params.pe_insert, 650);
        assert_eq!(params.pe_insert_sd, 200);
    }

    #[test]
    fn scan_keeps_user_insert_model() {
        let fasta = synth_bases(2000, 11);
        let hv = test_header(2000);
        let mut params = ScanParams {
            pe_set_by_user: true,
            ..Default::default()
        };
        let pair_seq = synth_bases(50, 5);
        let mut records = Vec::new();
        for i in 0..4 {
            records.push(sam_record(
                &hv,
                &format!("n{}", i),
                99,
                901,
                60,
                "50M",
                1301,
                450 + i * 100,
                &pair_seq,
                None,
            ));
        }
        scan_records(records, &fasta, &mut params, 0, 0, 2000, 10000);
        assert_eq!(params.pe_insert, 500);
        assert_eq!(params.pe_insert_sd, 50);
    }
}
