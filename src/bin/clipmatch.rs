//!
//! ## clipmatch ##
//! -------------
//! Scans one region of a coordinate-sorted, indexed BAM file and infers
//! structural-variant breakpoints from three evidence channels: soft-clipped
//! reads whose clipped tails re-match a partner read clipped on the opposite
//! side, read pairs with an abnormal insert, and the read-depth profile
//! around each candidate junction. Candidates are refined to base precision,
//! summarized with windowed depth and pair statistics and reported with four
//! 0-4 confidence scores as a TSV table on stdout.
//!
//! All reported coordinates are 0-based.

use std::cmp;
use std::env;
use std::path::Path;
use clap::{app_from_crate, crate_name, crate_description, crate_authors, crate_version, Arg};
use rust_htslib::{bam, bam::Read};
use bio::io::fasta::IndexedReader;
use rustc_hash::FxHashMap;
use itertools::Itertools;
extern crate pretty_env_logger;
#[macro_use]
extern crate log;

extern crate clipmatch;
use clipmatch::lib::common::{*};
use clipmatch::lib::hts_lib_based::{*};


/// split a samtools-style region string into the contig name and an
/// optional 1-based closed range; thousands separators are tolerated
fn parse_region(
    region: &str
) -> (String, Option<(i64, i64)>) {
    let mut parts = region.splitn(2, ':');
    let chrom = parts.next().unwrap_or("").to_string();
    if chrom.is_empty() {
        panic!("ERROR: could not parse region {:?}!", region);
    }
    match parts.next() {
        None => (chrom, None),
        Some(range) => {
            let mut bounds = range.splitn(2, '-');
            let beg = bounds
                .next()
                .and_then(|x| x.replace(',', "").parse::<i64>().ok());
            let end = bounds
                .next()
                .and_then(|x| x.replace(',', "").parse::<i64>().ok());
            match (beg, end) {
                (Some(b), Some(e)) if b >= 1 && e >= b => (chrom, Some((b, e))),
                _ => panic!("ERROR: could not parse region {:?}!", region),
            }
        }
    }
}

/// Match every tail-clipped read against the front-clipped reads mapped
/// within `max_dist`, refine successful overlaps to base precision and
/// group the refined joins by their breakpoint pair. Per group the clip
/// support counters, the per-base depths at match time and the best join
/// edit distance are accumulated.
fn match_clip_reads(
    scan: &RegionScan,
    fasta: &[u8],
    max_dist: i64,
    min_over: usize,
    max_err: usize
) -> FxHashMap<(i64, i64), BreakpointEvidence> {
    let mut sm_sorted: Vec<&ScanRead> = scan.sm_reads.iter().collect();
    sm_sorted.sort_by_key(|r| r.cand.pos);
    let sm_positions: Vec<i64> = sm_sorted.iter().map(|r| r.cand.pos).collect();

    let mut evidence: FxHashMap<(i64, i64), BreakpointEvidence> = FxHashMap::default();
    let mut attempts = 0_usize;
    for msr in &scan.ms_reads {
        let f_seq = scan.arena.seq(&msr.read);
        let f_cigar = scan.arena.cigar(&msr.read);
        let mut f_aln = match resolve_cigar(f_cigar, msr.pos) {
            Some(x) => x,
            None => continue,
        };
        calibrate_alignment(fasta, f_seq, &mut f_aln);

        let window_beg = sm_positions.partition_point(|&p| p < msr.cand.pos - max_dist);
        let window_end = sm_positions.partition_point(|&p| p <= msr.cand.pos + max_dist);
        for smr in &sm_sorted[window_beg..window_end] {
            attempts += 1;
            let r_seq = scan.arena.seq(&smr.read);
            let hit = match clip_overlap(f_seq, r_seq, min_over, max_err, OverlapScan::TailFirst)
            {
                Some(h) => h,
                None => continue,
            };
            let r_cigar = scan.arena.cigar(&smr.read);
            let mut r_aln = match resolve_cigar(r_cigar, smr.pos) {
                Some(x) => x,
                None => continue,
            };
            calibrate_alignment(fasta, r_seq, &mut r_aln);
            let join = match refine_break_points(fasta, f_seq, &f_aln, r_seq, &r_aln, hit.p1) {
                Some(j) => j,
                None => continue,
            };
            if join.f2 < 0 || join.r1 < 0 {
                debug!(
                    "dropped join with unmapped position {}/{} from reads at {}/{}",
                    join.f2, join.r1, msr.pos, smr.pos
                );
                continue;
            }
            let entry = evidence.entry((join.f2, join.r1)).or_insert_with(|| {
                BreakpointEvidence {
                    tid: scan.ctx.tid,
                    f2: join.f2,
                    r1: join.r1,
                    f2_sr: 0,
                    r1_sr: 0,
                    ms_f2_rd: scan.ctx.depth_at(join.f2) as i32,
                    ms_r1_rd: scan.ctx.depth_at(join.r1) as i32,
                    ms_ed: join.edit_distance as i32,
                    ..Default::default()
                }
            });
            entry.f2_sr += 1;
            entry.r1_sr += 1;
            entry.ms_ed = cmp::min(entry.ms_ed, join.edit_distance as i32);
        }
    }
    debug!(
        "tried {} read combinations, {} distinct joins",
        attempts,
        evidence.len()
    );
    evidence
}

/// Seed additional candidates from the discordant pairs alone: pairs are
/// bucketed on an insert-sized grid and every bucket with enough members
/// contributes its innermost position estimates. Split-read statistics
/// stay unset for these so the scorer leaves their split score untouched.
fn seed_pair_candidates(
    evidence: &mut FxHashMap<(i64, i64), BreakpointEvidence>,
    scan: &RegionScan,
    params: &ScanParams,
    min_pair_support: usize
) {
    let win = cmp::max(params.pe_insert, 1);
    let mut buckets: FxHashMap<(i64, i64), Vec<&InnerPair>> = FxHashMap::default();
    for ipair in &scan.pairs {
        buckets
            .entry((ipair.f2 / win, ipair.r1 / win))
            .or_default()
            .push(ipair);
    }
    let mut seeded = 0_usize;
    for members in buckets.values() {
        if members.len() < min_pair_support {
            continue;
        }
        let f2 = members.iter().map(|p| p.f2).max().unwrap_or(-1);
        let r1 = members.iter().map(|p| p.r1).min().unwrap_or(-1);
        if f2 < 0 || r1 < 0 {
            continue;
        }
        evidence.entry((f2, r1)).or_insert_with(|| {
            seeded += 1;
            BreakpointEvidence {
                tid: scan.ctx.tid,
                f2,
                r1,
                ..Default::default()
            }
        });
    }
    debug!("seeded {} pair-only candidates", seeded);
}

fn main() {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    let args_string = args.join(" ");
    debug!("invoked as: {}", args_string);

    let matches = app_from_crate!()
        .arg(Arg::with_name("BAM")
            .short("b")
            .long("bam")
            .value_name("FILE")
            .help("coordinate-sorted and indexed BAM with the aligned reads")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("REF")
            .short("r")
            .long("reference")
            .value_name("FILE")
            .help("indexed reference genome in fasta format")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("REGION")
            .short("g")
            .long("region")
            .value_name("chrom[:beg-end]")
            .help("region to scan; a bare contig name scans the whole contig")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("MAPQ")
            .short("q")
            .long("min-mapq")
            .value_name("int")
            .help("minimum mapping quality for a read to be counted")
            .takes_value(true)
            .default_value("10"))
        .arg(Arg::with_name("BASEQ")
            .short("Q")
            .long("min-baseq")
            .value_name("int")
            .help("minimum base quality inside a soft-clip")
            .takes_value(true)
            .default_value("5"))
        .arg(Arg::with_name("CLIP")
            .short("c")
            .long("min-clip")
            .value_name("int")
            .help("minimum soft-clip length considered a split-read signal")
            .takes_value(true)
            .default_value("10"))
        .arg(Arg::with_name("INSERT")
            .short("i")
            .long("insert")
            .value_name("int")
            .help("paired-end insert size mean, estimated in-band when omitted")
            .takes_value(true)
            .requires("SD"))
        .arg(Arg::with_name("SD")
            .short("s")
            .long("insert-sd")
            .value_name("int")
            .help("paired-end insert size standard deviation")
            .takes_value(true)
            .requires("INSERT"))
        .arg(Arg::with_name("READLEN")
            .short("l")
            .long("read-length")
            .value_name("int")
            .help("typical read length of the library")
            .takes_value(true)
            .default_value("100"))
        .arg(Arg::with_name("OVERLAP")
            .short("o")
            .long("min-overlap")
            .value_name("int")
            .help("minimum overlap between two clipped reads to call a match")
            .takes_value(true)
            .default_value("25"))
        .arg(Arg::with_name("MAXERR")
            .short("e")
            .long("max-err")
            .value_name("int")
            .help("maximum tolerated mismatches inside a clip overlap")
            .takes_value(true)
            .default_value("2"))
        .arg(Arg::with_name("PAIRLEN")
            .short("p")
            .long("min-pair-length")
            .value_name("int")
            .help("minimum mate separation to record a pair as abnormal, \
                0 derives it from the insert model")
            .takes_value(true)
            .default_value("0"))
        .arg(Arg::with_name("PAIRSUPPORT")
            .short("n")
            .long("pair-support")
            .value_name("int")
            .help("minimum abnormal pairs to seed a candidate without split reads")
            .takes_value(true)
            .default_value("3"))
        .arg(Arg::with_name("MAXDIST")
            .short("w")
            .long("max-distance")
            .value_name("int")
            .help("maximum distance between two clipped reads considered for matching")
            .takes_value(true)
            .default_value("1000000"))
        .arg(Arg::with_name("THREAD")
            .short("t")
            .long("threads")
            .value_name("int")
            .help("number of threads for reading BAM")
            .takes_value(true)
            .default_value("1"))
        .get_matches();

    ////////////////////////
    ////  prep options  ////
    ////////////////////////
    let bam_file = matches.value_of("BAM").unwrap();
    let ref_file = matches.value_of("REF").unwrap();
    let region = matches.value_of("REGION").unwrap();
    let bam_threads = matches
        .value_of("THREAD")
        .unwrap()
        .parse::<usize>()
        .expect("ERROR: could not parse the thread number!");
    let min_mapq = matches
        .value_of("MAPQ")
        .unwrap()
        .parse::<u8>()
        .expect("ERROR: could not parse \"min-mapq\" correctly!");
    let min_baseq = matches
        .value_of("BASEQ")
        .unwrap()
        .parse::<u8>()
        .expect("ERROR: could not parse \"min-baseq\" correctly!");
    let min_clip_len = matches
        .value_of("CLIP")
        .unwrap()
        .parse::<usize>()
        .expect("ERROR: could not parse \"min-clip\" correctly!");
    let read_len = matches
        .value_of("READLEN")
        .unwrap()
        .parse::<i64>()
        .expect("ERROR: could not parse \"read-length\" correctly!");
    let min_over = matches
        .value_of("OVERLAP")
        .unwrap()
        .parse::<usize>()
        .expect("ERROR: could not parse \"min-overlap\" correctly!");
    let max_err = matches
        .value_of("MAXERR")
        .unwrap()
        .parse::<usize>()
        .expect("ERROR: could not parse \"max-err\" correctly!");
    let min_pair_length = matches
        .value_of("PAIRLEN")
        .unwrap()
        .parse::<i64>()
        .expect("ERROR: could not parse \"min-pair-length\" correctly!");
    let min_pair_support = matches
        .value_of("PAIRSUPPORT")
        .unwrap()
        .parse::<usize>()
        .expect("ERROR: could not parse \"pair-support\" correctly!");
    let max_dist = matches
        .value_of("MAXDIST")
        .unwrap()
        .parse::<i64>()
        .expect("ERROR: could not parse \"max-distance\" correctly!");

    let mut params = ScanParams {
        min_mapq,
        min_baseq,
        min_clip_len,
        read_len,
        ..Default::default()
    };
    if let (Some(insert), Some(sd)) = (matches.value_of("INSERT"), matches.value_of("SD")) {
        params.pe_insert = insert
            .parse::<i64>()
            .expect("ERROR: could not parse \"insert\" correctly!");
        params.pe_insert_sd = sd
            .parse::<i64>()
            .expect("ERROR: could not parse \"insert-sd\" correctly!");
        params.pe_set_by_user = true;
    }
    let min_pair_length = if min_pair_length > 0 {
        min_pair_length
    } else {
        params.pe_insert + params.pe_insert_sd * 3
    };

    ////////////////////////
    ////  input files   ////
    ////////////////////////
    eprintln!("INFO: input BAM file is {}", &bam_file);
    assert!(
        Path::new(&bam_file).exists(),
        "ERROR: input file {:?} does not exist!",
        &bam_file
    );
    assert!(
        Path::new(&ref_file).exists(),
        "ERROR: reference file {:?} does not exist!",
        &ref_file
    );

    let mut bam = bam::IndexedReader::from_path(bam_file)
        .expect("ERROR: could not open BAM file!");
    bam.set_threads(bam_threads)
        .expect("ERROR: could not set read threads!");

    let (chrom, range) = parse_region(region);
    let tid = match bam.header().tid(chrom.as_bytes()) {
        Some(t) => t as i32,
        None => panic!("ERROR: unknown reference {}!", chrom),
    };
    let contig_len = bam
        .header()
        .target_len(tid as u32)
        .expect("ERROR: could not get the contig length!") as i64;
    let (beg, end) = match range {
        Some((b, e)) => (b - 1, cmp::min(e - 1, contig_len - 1)),
        None => (0, contig_len - 1),
    };
    eprintln!("INFO: scanning {}:{}-{} (0-based)", chrom, beg, end);

    let mut faidx = IndexedReader::from_file(&ref_file)
        .expect("ERROR: could not open the reference index!");
    faidx
        .fetch_all(&chrom)
        .expect("ERROR: could not find the contig in the reference!");
    let mut fasta: Vec<u8> = Vec::new();
    faidx
        .read(&mut fasta)
        .expect("ERROR: could not read the reference sequence!");

    /////////////////////
    ////  scan       ////
    /////////////////////
    let scan = scan_region(
        &mut bam,
        &fasta,
        &mut params,
        tid,
        beg,
        end,
        min_pair_length,
    );
    eprintln!(
        "INFO: scanned {} reads, data range {}:{}-{}",
        scan.record_count, chrom, scan.data_beg, scan.data_end
    );
    eprintln!(
        "INFO: clip candidates MS:{} SM:{}, abnormal pairs:{}, insert {} +- {}",
        scan.ms_reads.len(),
        scan.sm_reads.len(),
        scan.pairs.len(),
        params.pe_insert,
        params.pe_insert_sd
    );

    /////////////////////
    ////  matching   ////
    /////////////////////
    let mut evidence = match_clip_reads(&scan, &fasta, max_dist, min_over, max_err);
    seed_pair_candidates(&mut evidence, &scan, &params, min_pair_support);
    eprintln!("INFO: {} candidate breakpoints", evidence.len());
    if scan.record_count > 0 && scan.data_end - scan.data_beg <= MAX_COUNTED_SPAN {
        let med = median_read_depth(&mut bam, params.min_mapq, tid, scan.data_beg, scan.data_end);
        eprintln!("INFO: median depth across the data range: {}", med);
    }

    //////////////////////////
    ////  stat and score  ////
    //////////////////////////
    let mut cohort: Vec<BreakpointEvidence> = evidence.into_iter().map(|(_, v)| v).collect();
    let mut mapq0: FxHashMap<(i64, i64), f64> = FxHashMap::default();
    for ibp in cohort.iter_mut() {
        if ibp.f2_sr < 0 {
            // pair-guided candidate, positions are approximate; statistics
            // come from a fresh unfiltered re-scan
            stat_region_rescan(&mut bam, &params, ibp);
        } else {
            stat_region(&mut bam, &fasta, &scan.ctx, &params, ibp, 0);
        }
        let (q0, _q10) = region_mapq_profile(&mut bam, tid, ibp.f2, ibp.r1);
        mapq0.insert((ibp.f2, ibp.r1), q0);
    }
    score_breakpoints(&mut cohort, &scan.ctx, &params);

    /////////////////////
    ////  report     ////
    /////////////////////
    println!(
        "#chrom\tF2\tR1\ttype\tun\tF2_rd\tR1_rd\trd\tF2_rd_100\trd_F2_100\trd_R1_100\t\
        R1_rd_100\tF2_rp\tR1_rp\tFR_rp\tF2_sr\tR1_sr\tms_ed\tq0_frac\trp_score\trd_score\t\
        dd_score\tsr_score"
    );
    for ibp in cohort.iter().sorted_by_key(|b| (b.f2, b.r1)) {
        let sv_type = if ibp.is_deletion_type() { "DEL" } else { "DUP" };
        let q0 = mapq0.get(&(ibp.f2, ibp.r1)).copied().unwrap_or(-0.01001);
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.3}\t{}\t{}\t{}\t{}",
            chrom,
            ibp.f2,
            ibp.r1,
            sv_type,
            ibp.un,
            ibp.f2_rd,
            ibp.r1_rd,
            ibp.rd,
            ibp.f2_rd_100,
            ibp.rd_f2_100,
            ibp.rd_r1_100,
            ibp.r1_rd_100,
            ibp.f2_rp,
            ibp.r1_rp,
            ibp.fr_rp,
            ibp.f2_sr,
            ibp.r1_sr,
            ibp.ms_ed,
            q0,
            ibp.rp_score,
            ibp.rd_score,
            ibp.dd_score,
            ibp.sr_score
        );
    }
    eprintln!("INFO: reported {} breakpoints", cohort.len());
}


#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;

    #[test]
    fn region_bare_contig() {
        let (chrom, range) = parse_region("chr7");
        assert_eq!(chrom, "chr7");
        assert_eq!(range, None);
    }

    #[test]
    fn region_with_range() {
        let (chrom, range) = parse_region("chr7:1,000-2,000");
        assert_eq!(chrom, "chr7");
        assert_eq!(range, Some((1000, 2000)));
    }

    #[test]
    #[should_panic]
    fn region_reversed_range_is_fatal() {
        parse_region("chr7:2000-1000");
    }
}
