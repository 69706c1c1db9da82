use rstest::rstest;

use std::io::Cursor;

use crate::aiger::{read_aiger_from, write_aiger_to};
use crate::lit::Lit;
use crate::pdr::incr::solve_incremental;
use crate::pdr::{self, Pars, PdrStatus};
use crate::Aig;

fn pars(mono_cnf: bool) -> Pars {
    Pars { f_mono_cnf: mono_cnf, ..Pars::default() }
}

/// PO driven by constant 0.
fn tautology() -> Aig {
    let mut aig = Aig::start(8);
    let _x = aig.append_ci();
    aig.append_co(Lit::FALSE);
    aig
}

/// PO driven by constant 1.
fn always_failing() -> Aig {
    let mut aig = Aig::start(8);
    let _x = aig.append_ci();
    aig.append_co(Lit::TRUE);
    aig
}

/// One flop starting at 0 with next = !q and PO = q.
fn toggle() -> Aig {
    let mut aig = Aig::start(8);
    let q = aig.append_ci();
    aig.append_co(q);
    aig.append_co(q.compl());
    aig.set_reg_num(1);
    aig
}

/// Two stuck-at-zero flops with PO = p & q.
fn unreachable_conjunction() -> Aig {
    let mut aig = Aig::start(16);
    let p = aig.append_ci();
    let q = aig.append_ci();
    let bad = aig.append_and(p, q);
    aig.append_co(bad);
    aig.append_co(p);
    aig.append_co(q);
    aig.set_reg_num(2);
    aig
}

/// Two-bit up-counter with PO = (count == 3).
fn counter_mod4() -> Aig {
    let mut aig = Aig::start(32);
    let b0 = aig.append_ci();
    let b1 = aig.append_ci();
    // next_b1 = b0 ^ b1
    let n1 = aig.append_and(b0, b1.compl());
    let n2 = aig.append_and(b0.compl(), b1);
    let n3 = aig.append_and(n1.compl(), n2.compl());
    let bad = aig.append_and(b0, b1);
    aig.append_co(bad);
    aig.append_co(b0.compl());
    aig.append_co(n3.compl());
    aig.set_reg_num(2);
    aig
}

#[rstest]
#[case(false)]
#[case(true)]
fn tautological_unsat(#[case] mono_cnf: bool) {
    let mut aig = tautology();
    let result = pdr::solve(&mut aig, &pars(mono_cnf)).unwrap();
    assert_eq!(result.status, PdrStatus::Proved);
    assert!(result.cex.is_none());
    assert!(result.invariant.is_empty());
}

#[rstest]
#[case(false)]
#[case(true)]
fn immediate_sat(#[case] mono_cnf: bool) {
    let mut aig = always_failing();
    let result = pdr::solve(&mut aig, &pars(mono_cnf)).unwrap();
    assert_eq!(result.status, PdrStatus::Disproved);
    let cex = result.cex.unwrap();
    assert_eq!(cex.i_po, 0);
    assert_eq!(cex.i_frame, 0);
    assert_eq!(cex.n_bits(), 1);
}

#[rstest]
#[case(false)]
#[case(true)]
fn one_latch_toggle(#[case] mono_cnf: bool) {
    let mut aig = toggle();
    let result = pdr::solve(&mut aig, &pars(mono_cnf)).unwrap();
    assert_eq!(result.status, PdrStatus::Disproved);
    let cex = result.cex.unwrap();
    assert_eq!(cex.n_regs, 1);
    assert_eq!(cex.n_pis, 0);
    assert_eq!(cex.i_frame, 1);
}

#[test]
fn one_latch_toggle_cex_snapshot() {
    let mut aig = toggle();
    let result = pdr::solve(&mut aig, &Pars::default()).unwrap();
    insta::assert_yaml_snapshot!(result.cex.unwrap(), @r###"
    ---
    i_po: 0
    i_frame: 1
    n_regs: 1
    n_pis: 0
    bits:
      - 0
    "###);
}

#[test]
fn combinational_failure_yields_input_witness() {
    // PO = x with no registers at all
    let mut aig = Aig::start(8);
    let x = aig.append_ci();
    aig.append_co(x);
    let result = pdr::solve(&mut aig, &Pars::default()).unwrap();
    assert_eq!(result.status, PdrStatus::Disproved);
    let cex = result.cex.unwrap();
    assert_eq!(cex.i_frame, 0);
    assert!(cex.pi_bit(0, 0));
}

#[rstest]
#[case(false)]
#[case(true)]
fn unreachable_bad_state(#[case] mono_cnf: bool) {
    let mut aig = unreachable_conjunction();
    let result = pdr::solve(&mut aig, &pars(mono_cnf)).unwrap();
    assert_eq!(result.status, PdrStatus::Proved);
    assert!(!result.invariant.is_empty());
    // each invariant clause excludes one stuck-at-zero flop being high
    for cube in &result.invariant {
        assert_eq!(cube.n_lits(), 1);
        let lit = cube.state_lits()[0];
        assert!(!lit.sign());
        assert!(lit.var() < 2);
    }
}

#[rstest]
#[case(false)]
#[case(true)]
fn counter_mod4_fails_in_frame_three(#[case] mono_cnf: bool) {
    let mut aig = counter_mod4();
    let result = pdr::solve(&mut aig, &pars(mono_cnf)).unwrap();
    assert_eq!(result.status, PdrStatus::Disproved);
    let cex = result.cex.unwrap();
    assert_eq!(cex.i_frame, 3);
    assert_eq!(cex.n_regs, 2);
    assert_eq!(cex.n_pis, 0);
    assert!(!cex.reg_bit(0) && !cex.reg_bit(1));
}

#[rstest]
#[case(false)]
#[case(true)]
fn incremental_push_agrees_with_fresh_run(#[case] mono_cnf: bool) {
    // run capped at a shallow frame, reload, and finish; the verdict
    // must agree with an uncapped fresh run
    let capped = Pars { n_frame_max: 2, ..pars(mono_cnf) };
    let mut aig = counter_mod4();
    let (first, saved) = solve_incremental(&mut aig, &capped, None).unwrap();
    assert_eq!(first.status, PdrStatus::Undecided);
    let saved = saved.expect("frames to reload");
    assert!(saved.n_frames() >= 2);

    let full = pars(mono_cnf);
    let mut aig2 = counter_mod4();
    let (second, _) = solve_incremental(&mut aig2, &full, Some(saved)).unwrap();
    let mut aig3 = counter_mod4();
    let fresh = pdr::solve(&mut aig3, &full).unwrap();
    assert_eq!(second.status, fresh.status);
    assert_eq!(second.status, PdrStatus::Disproved);
    assert_eq!(
        second.cex.as_ref().unwrap().i_frame,
        fresh.cex.as_ref().unwrap().i_frame
    );
}

#[test]
fn incremental_resume_on_proved_design() {
    let capped = Pars { n_frame_max: 1, ..Pars::default() };
    let mut aig = unreachable_conjunction();
    let (first, saved) = solve_incremental(&mut aig, &capped, None).unwrap();
    let mut aig2 = unreachable_conjunction();
    let (second, _) = solve_incremental(
        &mut aig2,
        &Pars::default(),
        saved.filter(|_| first.status == PdrStatus::Undecided),
    )
    .unwrap();
    assert_eq!(second.status, PdrStatus::Proved);
}

#[test]
fn solve_all_reports_per_output_verdicts() {
    // output 0 unreachable, output 1 fails in frame 1
    let mut aig = Aig::start(16);
    let p = aig.append_ci();
    let q = aig.append_ci();
    let bad = aig.append_and(p, q);
    aig.append_co(bad);
    aig.append_co(q);
    aig.append_co(p);
    aig.append_co(q.compl());
    aig.set_reg_num(2);
    let pars = Pars { f_solve_all: true, ..Pars::default() };
    let result = pdr::solve(&mut aig, &pars).unwrap();
    assert_eq!(result.out_map.len(), 2);
    assert_eq!(result.out_map[1], pdr::OUT_DISPROVED);
    let cex = result.cexes[1].as_ref().unwrap();
    assert_eq!(cex.i_po, 1);
    assert_eq!(result.out_map[0], pdr::OUT_PROVED);
    assert_eq!(result.status, PdrStatus::Disproved);
}

#[test]
fn invariant_pla_dump() {
    use crate::sat::CdclSolver;

    let mut aig = unreachable_conjunction();
    let mut engine: crate::Pdr<'_, CdclSolver> =
        crate::Pdr::new(&mut aig, Pars::default());
    let status = engine.run();
    assert_eq!(status, PdrStatus::Proved);
    let mut dump = Vec::new();
    engine.dump_clauses(&mut dump, true).unwrap();
    let text = String::from_utf8(dump).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("# Inductive invariant"));
    assert!(lines.contains(&".o 1"));
    assert!(lines.contains(&".ob inv"));
    assert_eq!(lines.last(), Some(&".e"));
    // one row per clause, each ending in the on-set marker
    let n_rows = text
        .lines()
        .filter(|line| line.ends_with(" 1") && !line.starts_with('.'))
        .count();
    assert!(lines.contains(&format!(".p {n_rows}").as_str()));
}

#[test]
fn solved_aiger_roundtrip_keeps_the_verdict() {
    let mut aig = counter_mod4();
    let mut buf = Vec::new();
    write_aiger_to(&mut aig, &mut buf, false, false).unwrap();
    let mut back = read_aiger_from(Cursor::new(&buf)).unwrap();
    let result = pdr::solve(&mut back, &Pars::default()).unwrap();
    assert_eq!(result.status, PdrStatus::Disproved);
    assert_eq!(result.cex.unwrap().i_frame, 3);
}
