use std::cmp;
use regex::Regex;
use log::debug;


/// # Process-wide scan configuration.
/// The original engine kept these as mutable globals which made the
/// statistics functions impossible to test in isolation. Here every
/// filter and statistic takes the parameters explicitly.
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// minimum mapping quality for a read to be counted at all
    pub min_mapq: u8,
    /// minimum base quality inside a soft-clip
    pub min_baseq: u8,
    /// minimum length of a soft-clip to be considered a split-read signal
    pub min_clip_len: usize,
    /// paired-end insert size mean, either user supplied or estimated
    /// in-band during the scan
    pub pe_insert: i64,
    /// paired-end insert size standard deviation
    pub pe_insert_sd: i64,
    /// true if insert mean/sd were given on the command line and must not
    /// be overwritten by the in-band estimate
    pub pe_set_by_user: bool,
    /// whether the library is paired-end at all
    pub is_paired: bool,
    /// typical read length of the library
    pub read_len: i64,
    /// verbosity level
    pub verbose: u8,
}

impl Default for ScanParams {
    fn default() -> Self {
        ScanParams {
            min_mapq: 10,
            min_baseq: 5,
            min_clip_len: 10,
            pe_insert: 500,
            pe_insert_sd: 50,
            pe_set_by_user: false,
            is_paired: true,
            read_len: 100,
            verbose: 0,
        }
    }
}

/// Per-base read depth of exactly one contig.
/// The buffer is built in a single linear scan and must be rebuilt when the
/// active contig changes; using it against any other contig is a caller
/// error and terminates the process.
#[derive(Debug, Default)]
pub struct ScanContext {
    /// tid of the contig the depth buffer belongs to
    pub tid: i32,
    /// one counter per reference position, length == contig length
    pub depth: Vec<u32>,
}

impl ScanContext {
    pub fn new(
        tid: i32,
        depth: Vec<u32>
    ) -> Self {
        ScanContext { tid, depth }
    }

    /// loud precondition check instead of silently reusing stale data
    pub fn ensure(
        &self,
        tid: i32,
        contig_len: usize
    ) {
        if tid != self.tid || self.depth.len() != contig_len {
            panic!(
                "ERROR: depth buffer holds tid {} with {} positions but tid {} with {} positions was requested!",
                self.tid,
                self.depth.len(),
                tid,
                contig_len
            );
        }
    }

    pub fn is_bound_to(
        &self,
        tid: i32
    ) -> bool {
        tid == self.tid && !self.depth.is_empty()
    }

    /// per-base depth at a position, clamped to the buffer bounds
    pub fn depth_at(
        &self,
        pos: i64
    ) -> u32 {
        if self.depth.is_empty() {
            return 0;
        }
        let i = pos.clamp(0, self.depth.len() as i64 - 1) as usize;
        self.depth[i]
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// coarse classification of a CIGAR operation for the breakpoint logic
pub enum SpanKind {
    /// M, = or X : consumes reference and query
    Aligned,
    /// I : consumes query only
    Insertion,
    /// D or N : consumes reference only
    Deletion,
    /// S : consumes query only, projected contiguously onto the reference
    SoftClip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// one CIGAR operation with both coordinate spaces made explicit
/// .0-based
pub struct CigarSpan {
    pub kind: SpanKind,
    /// reference coordinate of the first base; soft-clips before the
    /// alignment start project to `pos - clip_length` and can be negative
    pub ref_beg: i64,
    /// query coordinate of the first base
    pub query_beg: usize,
    /// operation length in bases
    pub len: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// positional expansion of one alignment
/// spans are contiguous and non-overlapping in both coordinate spaces;
/// exactly one span is the anchor, at most one is the SV-relevant clip
pub struct ResolvedAlignment {
    /// leftmost aligned reference position, updated by calibration
    /// .0-based
    pub pos: i64,
    /// total query length covered by the spans
    pub query_len: usize,
    pub spans: Vec<CigarSpan>,
    /// index of the longest aligned run
    pub anchor: usize,
    /// index of the longest soft-clip, if any
    pub clip: Option<usize>,
}

/// Expand a CIGAR string into reference/query spans and identify the
/// anchor (longest aligned run) and the SV-relevant clip (longest
/// soft-clip). Returns `None` when the CIGAR has no aligned operation at
/// all, which makes the record useless for any of the evidence channels.
///
/// Hard-clips and pads consume neither coordinate space and are dropped.
///
/// Unittest: TRUE
///
pub fn resolve_cigar(
    cigar: &str,
    pos: i64
) -> Option<ResolvedAlignment> {
    let re_op = Regex::new(r"([0-9]+)([MIDNSHP=X])").unwrap();
    let mut spans: Vec<CigarSpan> = Vec::new();
    let mut ref_cursor = pos;
    let mut query_cursor = 0_usize;
    let mut seen_ref_op = false;
    for m in re_op.captures_iter(cigar) {
        let len: usize = m[1].parse().unwrap();
        if len == 0 {
            continue;
        }
        match &m[2] {
            "M" | "=" | "X" => {
                spans.push(CigarSpan {
                    kind: SpanKind::Aligned,
                    ref_beg: ref_cursor,
                    query_beg: query_cursor,
                    len,
                });
                ref_cursor += len as i64;
                query_cursor += len;
                seen_ref_op = true;
            }
            "I" => {
                spans.push(CigarSpan {
                    kind: SpanKind::Insertion,
                    ref_beg: ref_cursor,
                    query_beg: query_cursor,
                    len,
                });
                query_cursor += len;
            }
            "D" | "N" => {
                spans.push(CigarSpan {
                    kind: SpanKind::Deletion,
                    ref_beg: ref_cursor,
                    query_beg: query_cursor,
                    len,
                });
                ref_cursor += len as i64;
                seen_ref_op = true;
            }
            "S" => {
                // a clip in front of the first reference-consuming
                // operation projects backwards from the alignment start
                let ref_beg = if seen_ref_op {
                    ref_cursor
                } else {
                    ref_cursor - len as i64
                };
                spans.push(CigarSpan {
                    kind: SpanKind::SoftClip,
                    ref_beg,
                    query_beg: query_cursor,
                    len,
                });
                query_cursor += len;
            }
            _ => {}
        }
    }
    let anchor = longest_of(&spans, SpanKind::Aligned)?;
    let clip = longest_of(&spans, SpanKind::SoftClip);
    Some(ResolvedAlignment {
        pos,
        query_len: query_cursor,
        spans,
        anchor,
        clip,
    })
}

fn longest_of(
    spans: &[CigarSpan],
    kind: SpanKind
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, s) in spans.iter().enumerate() {
        if s.kind != kind || s.len == 0 {
            continue;
        }
        match best {
            Some(b) if spans[b].len >= s.len => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Slide the boundary between the clip and its neighbouring aligned run
/// while the clipped bases keep matching the reference. Aligners place
/// ambiguous bases on either side of the clip edge; without this
/// correction the same breakpoint shows up at slightly different
/// positions from different reads. A clip that is absorbed completely
/// leaves the alignment without an SV signal (`clip == None`).
///
/// Returns the number of bases the boundary moved.
///
/// Unittest: TRUE
///
pub fn calibrate_alignment(
    fasta: &[u8],
    seq: &[u8],
    rm: &mut ResolvedAlignment
) -> usize {
    let ci = match rm.clip {
        Some(c) => c,
        None => return 0,
    };
    let mut shifted = 0_usize;
    if ci + 1 < rm.spans.len() && rm.spans[ci + 1].kind == SpanKind::Aligned {
        // clip in front of the anchor: grow the aligned run leftwards
        loop {
            let clip = rm.spans[ci];
            let next = rm.spans[ci + 1];
            if clip.len == 0 {
                break;
            }
            let q = clip.query_beg + clip.len - 1;
            let r = next.ref_beg - 1;
            if r < 0 || r as usize >= fasta.len() || q >= seq.len() {
                break;
            }
            if seq[q] != fasta[r as usize] {
                break;
            }
            rm.spans[ci].len -= 1;
            rm.spans[ci + 1].ref_beg -= 1;
            rm.spans[ci + 1].query_beg -= 1;
            rm.spans[ci + 1].len += 1;
            shifted += 1;
        }
    } else if ci > 0 && rm.spans[ci - 1].kind == SpanKind::Aligned {
        // clip behind the anchor: grow the aligned run rightwards
        loop {
            let clip = rm.spans[ci];
            let prev = rm.spans[ci - 1];
            if clip.len == 0 {
                break;
            }
            let q = clip.query_beg;
            let r = prev.ref_beg + prev.len as i64;
            if r < 0 || r as usize >= fasta.len() || q >= seq.len() {
                break;
            }
            if seq[q] != fasta[r as usize] {
                break;
            }
            rm.spans[ci - 1].len += 1;
            rm.spans[ci].query_beg += 1;
            rm.spans[ci].ref_beg += 1;
            rm.spans[ci].len -= 1;
            shifted += 1;
        }
    }
    // the boundary shift can change which spans are the longest
    if let Some(a) = longest_of(&rm.spans, SpanKind::Aligned) {
        rm.anchor = a;
    }
    rm.clip = longest_of(&rm.spans, SpanKind::SoftClip);
    if let Some(first) = rm
        .spans
        .iter()
        .find(|s| s.kind == SpanKind::Aligned)
    {
        rm.pos = first.ref_beg;
    }
    shifted
}

/// per-query-base operation kinds; deletions occupy no query base and
/// do not show up here
///
/// Unittest: TRUE
///
pub fn expanded_ops(
    rm: &ResolvedAlignment
) -> Vec<SpanKind> {
    let mut ops = vec![SpanKind::Insertion; rm.query_len];
    for s in &rm.spans {
        if s.kind == SpanKind::Deletion {
            continue;
        }
        for q in s.query_beg..s.query_beg + s.len {
            if q < ops.len() {
                ops[q] = s.kind;
            }
        }
    }
    ops
}

/// reference position a query offset projects to, -1 for inserted bases
/// and offsets outside the read
///
/// Unittest: TRUE
///
pub fn pos_for_base(
    rm: &ResolvedAlignment,
    q: usize
) -> i64 {
    for s in &rm.spans {
        if s.kind == SpanKind::Deletion {
            continue;
        }
        if q >= s.query_beg && q < s.query_beg + s.len {
            return match s.kind {
                SpanKind::Insertion => -1,
                _ => s.ref_beg + (q - s.query_beg) as i64,
            };
        }
    }
    -1
}

/// The reference as seen through the read's own alignment: aligned and
/// clipped bases take the reference character they project to, inserted
/// bases have no reference counterpart and take the query character
/// itself. Comparing a read against this projection instead of a
/// contiguous reference substring tolerates indels inside the alignment.
///
/// Unittest: TRUE
///
pub fn project_reference(
    seq: &[u8],
    rm: &ResolvedAlignment,
    fasta: &[u8]
) -> Vec<u8> {
    let mut proj = vec![b'N'; rm.query_len];
    for s in &rm.spans {
        match s.kind {
            SpanKind::Deletion => {}
            SpanKind::Insertion => {
                for i in 0..s.len {
                    proj[s.query_beg + i] =
                        seq.get(s.query_beg + i).copied().unwrap_or(b'N');
                }
            }
            _ => {
                for i in 0..s.len {
                    let r = s.ref_beg + i as i64;
                    proj[s.query_beg + i] = if r >= 0 && (r as usize) < fasta.len() {
                        fasta[r as usize]
                    } else {
                        b'N'
                    };
                }
            }
        }
    }
    proj
}

/// How far a breakpoint pair can slide in either direction without
/// changing the joined sequence (micro-homology around the junction).
/// `dx_f2` is the displacement in positive direction, `dx_r1` in
/// negative direction, both non-negative; the total slide is their sum.
///
/// Unittest: TRUE
///
pub fn find_displacement(
    fasta: &[u8],
    f2: i64,
    r1: i64
) -> (i64, i64) {
    let mut dx_f2 = 0_i64;
    let mut dx_r1 = 0_i64;
    let n = fasta.len() as i64;
    if f2 >= n || r1 >= n || f2 <= 0 || r1 <= 0 {
        return (0, 0);
    }
    loop {
        if f2 + dx_f2 + 1 >= n || r1 + dx_f2 >= n {
            break;
        }
        if fasta[(f2 + dx_f2 + 1) as usize] != fasta[(r1 + dx_f2) as usize] {
            break;
        }
        dx_f2 += 1;
    }
    loop {
        if f2 - dx_r1 <= 0 || r1 - dx_r1 - 1 <= 0 {
            break;
        }
        if fasta[(f2 - dx_r1) as usize] != fasta[(r1 - dx_r1 - 1) as usize] {
            break;
        }
        dx_r1 += 1;
    }
    (dx_f2, dx_r1)
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// search policy of the overlap matcher
pub enum OverlapScan {
    /// scan offsets from the tail of `read_ms` towards the front and stop
    /// once a match exists and the scan fell more than 10 positions below
    /// the best offset (bounded local search)
    TailFirst,
    /// scan offsets left to right without truncation
    FrontFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// a successful overlap placement
pub struct OverlapHit {
    /// offset into `read_ms` where `read_sm` begins to overlap
    pub p1: usize,
    /// indices of mismatched characters, on `read_ms` coordinates
    pub mismatches: Vec<usize>,
}

/// Check if `read_ms` (clip behind the anchor) and `read_sm` (clip in
/// front of the anchor) overlap with at least `min_over` characters while
/// tolerating at most `max_err` mismatches. `read_ms` is always fully
/// overlapped with or in front of `read_sm`. Among all admissible offsets
/// the one with the lowest mismatch rate wins; a perfect overlap ends the
/// search immediately.
///
/// Returns `None` when no offset stays within the mismatch budget.
/// A mismatch list longer than the budget cannot happen with a correct
/// search and is treated as fatal.
///
/// Unittest: TRUE
///
pub fn clip_overlap(
    read_ms: &[u8],
    read_sm: &[u8],
    min_over: usize,
    max_err: usize,
    scan: OverlapScan
) -> Option<OverlapHit> {
    if read_ms.len() < min_over + 1 || read_sm.is_empty() {
        return None;
    }
    let last = read_ms.len() - min_over - 1;
    let offsets: Vec<usize> = match scan {
        OverlapScan::TailFirst => (0..=last).rev().collect(),
        OverlapScan::FrontFirst => (0..=last).collect(),
    };

    let mut best: Option<usize> = None;
    let mut best_rate = 1.0_f64;
    let mut found = false;
    for i in offsets {
        if scan == OverlapScan::TailFirst && found {
            if let Some(b) = best {
                if i + 10 < b {
                    break;
                }
            }
        }
        let mut ndiff = 0_usize;
        let mut compared = 0_usize;
        let mut over_budget = false;
        for (a, b) in read_ms[i..].iter().zip(read_sm.iter()) {
            compared += 1;
            if a != b {
                ndiff += 1;
                if ndiff > max_err {
                    over_budget = true;
                    break;
                }
            }
        }
        if over_budget {
            continue;
        }
        found = true;
        let rate = ndiff as f64 / (compared + 1) as f64;
        if rate < best_rate {
            best_rate = rate;
            best = Some(i);
        }
        if ndiff == 0 {
            break;
        }
    }

    let p1 = best?;
    let mismatches: Vec<usize> = read_ms[p1..]
        .iter()
        .zip(read_sm.iter())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(j, _)| p1 + j)
        .collect();
    if mismatches.len() > max_err {
        panic!(
            "ERROR: overlap matching produced {} mismatches for a budget of {}!",
            mismatches.len(),
            max_err
        );
    }
    Some(OverlapHit { p1, mismatches })
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// refined breakpoint pair in reference coordinates
pub struct BreakpointJoin {
    /// join position on the first read's side
    pub f2: i64,
    /// join position on the second read's side
    pub r1: i64,
    /// minimum projected-reference mismatch count over all join offsets
    pub edit_distance: usize,
}

/// Given two reads whose sequences overlap starting at offset `p1` of the
/// first read, find the exact base where the two partial alignments
/// should be joined.
///
/// A hypothetical joined read (first read up to the join, second read
/// from there) is compared against the equally joined projected
/// reference. Moving the join one base to the right only changes the
/// mismatch state of that single position, so the whole sweep is done
/// with an incremental update instead of recounting every offset.
///
/// Among all offsets reaching the minimum mismatch count the smallest one
/// that also falls on a CIGAR-preferred position wins: both reads aligned
/// there, failing that only the second, failing that only the first,
/// failing that the start and the middle of the overlap are the only
/// candidates.
///
/// Unittest: TRUE
///
pub fn refine_break_points(
    fasta: &[u8],
    f_seq: &[u8],
    f_aln: &ResolvedAlignment,
    r_seq: &[u8],
    r_aln: &ResolvedAlignment,
    p1: usize
) -> Option<BreakpointJoin> {
    if f_aln.spans.is_empty() || r_aln.spans.is_empty() {
        return None;
    }
    let f_len = f_seq.len();
    let r_len = r_seq.len();
    // a completely overlapped pair still needs one base from the first read
    let p1 = cmp::max(p1, 1);
    if p1 > f_len {
        return None;
    }
    let bp_f2 = pos_for_base(f_aln, p1 - 1);
    let bp_r1 = pos_for_base(r_aln, 0);
    if bp_f2 < 1 || bp_f2 as usize + f_len > fasta.len() {
        return None;
    }
    if bp_r1 < 1 || bp_r1 as usize + r_len > fasta.len() {
        return None;
    }

    let f_proj = project_reference(f_seq, f_aln, fasta);
    let r_proj = project_reference(r_seq, r_aln, fasta);

    let mut concat: Vec<u8> = f_seq[..p1].to_vec();
    concat.extend_from_slice(r_seq);
    let mut proj: Vec<u8> = f_proj[..p1].to_vec();
    proj.extend_from_slice(&r_proj);

    // mismatch count for every candidate join offset, incremental sweep
    let mut ed0 = vec![usize::MAX; f_len];
    let mut ndiff: i64 = concat
        .iter()
        .zip(proj.iter())
        .filter(|(a, b)| a != b)
        .count() as i64;
    ed0[p1 - 1] = ndiff as usize;
    let mut min_ed = ndiff as usize;
    let mut imin = p1 - 1;
    let br_stop = cmp::min(f_len, concat.len()).saturating_sub(1);
    for br in p1..br_stop {
        let q = f_seq[br];
        let r = f_proj[br];
        ndiff += (q != r) as i64 - (proj[br] != concat[br]) as i64;
        concat[br] = q;
        proj[br] = r;
        ed0[br] = ndiff as usize;
        if (ndiff as usize) < min_ed {
            min_ed = ndiff as usize;
            imin = br;
        }
    }

    // candidate join offsets by CIGAR agreement, best tier that is non-empty
    let f_ops = expanded_ops(f_aln);
    let r_ops = expanded_ops(r_aln);
    let mut candidates: Vec<usize> = Vec::new();
    for tier in 0..3 {
        let mut q = p1 - 1;
        let mut r = 0_usize;
        while q < f_len && r < r_len {
            let keep = match tier {
                0 => f_ops[q] == SpanKind::Aligned && r_ops[r] == SpanKind::Aligned,
                1 => r_ops[r] == SpanKind::Aligned,
                _ => f_ops[q] == SpanKind::Aligned,
            };
            if keep {
                candidates.push(q);
            }
            q += 1;
            r += 1;
        }
        if !candidates.is_empty() {
            break;
        }
    }
    if candidates.is_empty() {
        candidates.push(p1 - 1);
        candidates.push((p1 + cmp::min(p1 + r_len, f_len)) / 2);
    }

    // smallest offset that reaches the minimum and is CIGAR-preferred
    let mut join = imin;
    for b in (p1 - 1)..f_len {
        if ed0[b] > min_ed {
            continue;
        }
        if candidates.contains(&b) {
            join = b;
            break;
        }
    }

    let f2 = pos_for_base(f_aln, join);
    let r1 = pos_for_base(r_aln, join + 1 - p1);
    if f2 < 0 {
        debug!(
            "join offset {} maps to no reference position on the first read, p1 {}",
            join, p1
        );
    }
    if r1 < 0 {
        debug!(
            "join offset {} maps to no reference position on the second read, p1 {}",
            join, p1
        );
    }
    Some(BreakpointJoin {
        f2,
        r1,
        edit_distance: min_ed,
    })
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// a read that passed all clip-candidate gates
/// immutable once built
/// .0-based
pub struct ClippedCandidate {
    pub tid: i32,
    /// calibrated leftmost aligned position
    pub pos: i64,
    pub mapq: u8,
    /// full query length
    pub read_len: usize,
    /// length of the anchor run
    pub anchor_len: usize,
    /// query offset of the anchor run
    pub anchor_qpos: usize,
    /// length of the SV-relevant clip
    pub clip_len: usize,
    /// first reference position the clip projects to
    pub clip_beg: i64,
    /// last reference position the clip projects to
    pub clip_end: i64,
    /// mismatches between clip and reference
    pub clip_mismatch: usize,
    /// mismatches between aligned runs and reference
    pub anchor_mismatch: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// breakpoint-adjacent positions derived from one discordant pair
/// .0-based
pub struct InnerPair {
    pub f2: i64,
    /// false when `f2` had to be approximated from the mate start plus the
    /// read length because the mate's CIGAR is not at hand
    pub f2_exact: bool,
    pub r1: i64,
    pub r1_exact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One candidate SV breakpoint pair with everything the scorer consumes.
/// F2 < R1 is a deletion-type signal, F2 > R1 duplication-type.
/// Statistics and scores start at -1 = not computed; scores are only
/// written when their statistic was actually computed.
pub struct BreakpointEvidence {
    pub tid: i32,
    pub f2: i64,
    pub r1: i64,
    /// windowed flank depth on the F2 side
    pub f2_rd: i32,
    /// windowed flank depth on the R1 side
    pub r1_rd: i32,
    /// depth across the inner span
    pub rd: i32,
    /// 100-base flank depth on the F2 side
    pub f2_rd_100: i32,
    /// 100-base inner probe next to F2
    pub rd_f2_100: i32,
    /// 100-base inner probe next to R1
    pub rd_r1_100: i32,
    /// 100-base flank depth on the R1 side
    pub r1_rd_100: i32,
    /// normal pairs spanning F2
    pub f2_rp: i32,
    /// normal pairs spanning R1
    pub r1_rp: i32,
    /// abnormal pairs consistent with the junction
    pub fr_rp: i32,
    /// clip reads supporting the F2 side
    pub f2_sr: i32,
    /// clip reads supporting the R1 side
    pub r1_sr: i32,
    /// per-base depth at F2 recorded when the match was made
    pub ms_f2_rd: i32,
    /// per-base depth at R1 recorded when the match was made
    pub ms_r1_rd: i32,
    /// edit distance reported by the breakpoint refinement
    pub ms_ed: i32,
    /// micro-homology slide of the junction
    pub un: i32,
    pub rp_score: i32,
    pub rd_score: i32,
    pub dd_score: i32,
    pub sr_score: i32,
}

impl Default for BreakpointEvidence {
    fn default() -> Self {
        BreakpointEvidence {
            tid: -1,
            f2: -1,
            r1: -1,
            f2_rd: -1,
            r1_rd: -1,
            rd: -1,
            f2_rd_100: -1,
            rd_f2_100: -1,
            rd_r1_100: -1,
            r1_rd_100: -1,
            f2_rp: -1,
            r1_rp: -1,
            fr_rp: -1,
            f2_sr: -1,
            r1_sr: -1,
            ms_f2_rd: -1,
            ms_r1_rd: -1,
            ms_ed: -1,
            un: -1,
            rp_score: -1,
            rd_score: -1,
            dd_score: -1,
            sr_score: -1,
        }
    }
}

impl BreakpointEvidence {
    /// depth and pairs are expected to drop across a deletion and to rise
    /// across a duplication
    pub fn is_deletion_type(&self) -> bool {
        self.f2 < self.r1
    }
}


fn window_sum(
    depth: &[u32],
    beg: i64,
    end: i64
) -> f64 {
    let mut total = 0_f64;
    let lo = cmp::max(beg, 0);
    let hi = cmp::min(end, depth.len() as i64 - 1);
    let mut i = lo;
    while i <= hi {
        total += depth[i as usize] as f64;
        i += 1;
    }
    total
}

fn round_depth(x: f64) -> i32 {
    (x + 0.5) as i32
}

/// Flank and inner depth around a breakpoint pair, summed from the
/// pre-built depth buffer: upstream flank `[beg-dx+1, beg]`, downstream
/// flank `[end, end+dx-1]` and the inner span `(beg, end)`. When called
/// with `beg > end` the two positions are swapped internally and the
/// flank results are swapped back, so the first returned value always
/// belongs to the first argument.
///
/// Returns (flank at beg, flank at end, inner).
///
/// Unittest: TRUE
///
pub fn flank_inner_depth(
    ctx: &ScanContext,
    tid: i32,
    contig_len: usize,
    beg: i64,
    end: i64,
    dx: i64
) -> (i32, i32, i32) {
    ctx.ensure(tid, contig_len);
    let dx = cmp::max(dx, 1);
    let switched = beg > end;
    let (b, e) = if switched { (end, beg) } else { (beg, end) };

    let rd1 = window_sum(&ctx.depth, b - dx + 1, b) / dx as f64;
    let rd2 = window_sum(&ctx.depth, e, e + dx - 1) / dx as f64;
    let rdin = window_sum(&ctx.depth, b + 1, e - 1) / ((e - b - 1) as f64 + 1e-9);

    let d1 = round_depth(rd1);
    let d2 = round_depth(rd2);
    let din = round_depth(rdin);
    if switched {
        (d2, d1, din)
    } else {
        (d1, d2, din)
    }
}

/// The fixed 100-base probe: the two flanks as above plus two inner
/// probes right next to each breakpoint. A large event dilutes a local
/// drop when averaged over the whole span, the 100-base probes do not.
/// An inner span of up to 100 bases yields the same value for both
/// probes.
///
/// Returns (flank at beg, inner probe at beg, inner probe at end, flank at end).
///
/// Unittest: TRUE
///
pub fn flank_inner_depth_100(
    ctx: &ScanContext,
    tid: i32,
    contig_len: usize,
    beg: i64,
    end: i64
) -> (i32, i32, i32, i32) {
    ctx.ensure(tid, contig_len);
    let dx = 100_i64;
    let switched = beg > end;
    let (b, e) = if switched { (end, beg) } else { (beg, end) };

    let d1 = round_depth(window_sum(&ctx.depth, b - dx + 1, b) / dx as f64);
    let d2 = round_depth(window_sum(&ctx.depth, e, e + dx - 1) / dx as f64);

    let (din1, din2) = if e - b <= dx {
        let v = round_depth(
            window_sum(&ctx.depth, b + 1, e - 1) / ((e - b - 1) as f64 + 1e-9),
        );
        (v, v)
    } else {
        (
            round_depth(window_sum(&ctx.depth, b + 1, b + dx) / (dx as f64 + 1e-9)),
            round_depth(window_sum(&ctx.depth, e - dx, e - 1) / (dx as f64 + 1e-9)),
        )
    };

    if switched {
        (d2, din2, din1, d1)
    } else {
        (d1, din1, din2, d2)
    }
}


// score ladders shared by the depth and depth-derivative channels
fn del_ratio_score(
    observed: i32,
    normal: i32
) -> i32 {
    if observed < 0 {
        return 0;
    }
    let mut score = 0;
    if observed < normal * 3 / 4 {
        score = 1;
    }
    if observed < normal * 2 / 3 {
        score = 2;
    }
    if observed < normal * 5 / 9 {
        score = 3;
    }
    if observed < normal / 5 {
        score = 4;
    }
    score
}

fn dup_ratio_score(
    observed: i32,
    normal: i32
) -> i32 {
    if observed < 0 {
        return 0;
    }
    let mut score = 0;
    if observed > normal * 5 / 4 {
        score = 1;
    }
    if observed > normal * 4 / 3 {
        score = 2;
    }
    if observed > normal * 3 / 2 {
        score = 3;
    }
    if observed > normal * 2 {
        score = 4;
    }
    score
}

fn split_read_score(
    f2_sr: i32,
    r1_sr: i32,
    f2_depth: i32,
    r1_depth: i32
) -> i32 {
    let mut score = 0;
    if f2_sr * 8 > f2_depth || r1_sr * 8 > r1_depth {
        score = 1;
    }
    if (f2_sr * 4 > f2_depth || r1_sr * 4 > r1_depth)
        && (f2_sr * 8 > f2_depth && r1_sr * 8 > r1_depth)
    {
        score = 2;
    }
    if (f2_sr * 3 > f2_depth || r1_sr * 3 > r1_depth)
        && (f2_sr * 4 > f2_depth && r1_sr * 4 > r1_depth)
    {
        score = 3;
    }
    if f2_sr * 3 > f2_depth && r1_sr * 3 > r1_depth {
        score = 4;
    }
    score
}

/// Convert the collected statistics of one candidate breakpoint into the
/// four 0-4 confidence scores. Pure function of its inputs; each score is
/// only written back when the underlying statistic was computed, so an
/// untouched -1 still means "not assessed" afterwards.
///
/// `med_rp` is the cohort's median spanning-pair count and only floors
/// the minimum informative abnormal-pair count.
///
/// Unittest: TRUE
///
pub fn score_breakpoint(
    ibp: &mut BreakpointEvidence,
    ctx: &ScanContext,
    params: &ScanParams,
    med_rp: i32
) {
    let min_rp = cmp::max(5, med_rp / 16);
    let deletion = ibp.is_deletion_type();

    // read pair score: expected pairs for the variation, halved for a
    // deletion where fewer spanning pairs survive
    let pr_normal = cmp::max(20, cmp::max(ibp.f2_rp, ibp.r1_rp));
    let pr_expected = if deletion { pr_normal / 2 } else { pr_normal };
    let mut rpscore = 0;
    if ibp.fr_rp > pr_expected / 3 {
        rpscore = 1;
    }
    if ibp.fr_rp > pr_expected / 2 {
        rpscore = 2;
    }
    if ibp.fr_rp > pr_expected * 2 / 3 {
        rpscore = 3;
    }
    if ibp.fr_rp > pr_expected * 3 / 4 {
        rpscore = 4;
    }
    if ibp.fr_rp <= 4 || ibp.fr_rp < min_rp {
        rpscore = 0;
    }

    // read depth score against the conservative flank
    let mut rdscore = if deletion {
        del_ratio_score(ibp.rd, cmp::min(ibp.f2_rd, ibp.r1_rd))
    } else {
        dup_ratio_score(ibp.rd, cmp::max(ibp.f2_rd, ibp.r1_rd))
    };
    if cmp::min(ibp.f2_rd, ibp.r1_rd) < 8 {
        rdscore = 0;
    }

    // derivative of read depth: both sides have to move together
    let mut ddscore = if deletion {
        cmp::min(
            del_ratio_score(ibp.rd_f2_100, ibp.f2_rd_100),
            del_ratio_score(ibp.rd_r1_100, ibp.r1_rd_100),
        )
    } else {
        cmp::min(
            dup_ratio_score(ibp.rd_f2_100, ibp.f2_rd_100),
            dup_ratio_score(ibp.rd_r1_100, ibp.r1_rd_100),
        )
    };
    if cmp::min(ibp.f2_rd_100, ibp.r1_rd_100) < 8 {
        ddscore = 0;
    }

    // matching read score; the windowed statistics are the fallback source,
    // the per-base depth buffer at the exact breakpoints is authoritative
    // whenever it is available for this contig
    let mut srscore = if ibp.f2_rd > 0 && ibp.r1_rd > 0 {
        split_read_score(ibp.f2_sr, ibp.r1_sr, ibp.f2_rd, ibp.r1_rd)
    } else {
        split_read_score(ibp.f2_sr, ibp.r1_sr, ibp.ms_f2_rd, ibp.ms_r1_rd)
    };
    if ctx.is_bound_to(ibp.tid) && ibp.f2_rd > 0 && ibp.r1_rd > 0 {
        srscore = split_read_score(
            ibp.f2_sr,
            ibp.r1_sr,
            ctx.depth_at(ibp.f2) as i32,
            ctx.depth_at(ibp.r1) as i32,
        );
    }

    // low signal overrides
    if ibp.f2_rd < 6 && ibp.r1_rd < 6 && ibp.rd < 6 {
        rdscore = 0;
    }
    if ibp.f2_rp < 6 && ibp.r1_rp < 6 && ibp.fr_rp < 6 {
        rpscore = 0;
    }
    if i64::from(ibp.ms_ed) > params.read_len / 2 {
        srscore = 0;
    }
    if ibp.f2_sr <= 2 && ibp.r1_sr <= 2 && srscore > 0 {
        srscore = 0;
    }
    if (ibp.f2_sr <= 2 || ibp.r1_sr <= 2) && srscore > 1 {
        srscore = 1;
    }
    // the derivative is the required corroboration for the depth signal
    if ddscore == 0 {
        rdscore = 0;
    }

    // only update scores for calculated statistics
    if ibp.f2_rp >= 0 {
        ibp.rp_score = rpscore;
    }
    if ibp.f2_rd >= 0 {
        ibp.rd_score = rdscore;
    }
    if ibp.f2_rd_100 >= 0 {
        ibp.dd_score = ddscore;
    }
    if ibp.f2_sr >= 0 {
        ibp.sr_score = srscore;
    }
}

fn median_by_selection(
    values: &mut Vec<i32>
) -> i32 {
    if values.is_empty() {
        return 0;
    }
    let mid = values.len() / 2;
    *values.select_nth_unstable(mid).1
}

/// Score a whole cohort of candidates: approximate the cohort's typical
/// flank depth and spanning-pair count by partial selection, then assess
/// every candidate.
///
/// Unittest: TRUE
///
pub fn score_breakpoints(
    bps: &mut [BreakpointEvidence],
    ctx: &ScanContext,
    params: &ScanParams
) {
    if bps.is_empty() {
        return;
    }
    let mut values: Vec<i32> = Vec::new();
    for bp in bps.iter() {
        if bp.f2_rd > 9 {
            values.push(bp.f2_rd);
        }
        if bp.r1_rd > 9 {
            values.push(bp.r1_rd);
        }
    }
    let med_rd = median_by_selection(&mut values);

    values.clear();
    for bp in bps.iter() {
        if bp.f2_rp > 9 {
            values.push(bp.f2_rp);
        }
        if bp.r1_rp > 9 {
            values.push(bp.r1_rp);
        }
    }
    let med_rp = median_by_selection(&mut values);
    debug!("cohort medians: read depth {} spanning pairs {}", med_rd, med_rp);

    for bp in bps.iter_mut() {
        score_breakpoint(bp, ctx, params, med_rp);
    }
}
