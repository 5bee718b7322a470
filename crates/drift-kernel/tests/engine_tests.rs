//! Sequential and parallel permutation engines must agree exactly
#![cfg(feature = "parallel")]

mod common;

use common::{conditional_sample, normal_matrix};
use drift_core::{ParallelEngine, SequentialEngine};
use drift_kernel::*;

#[test]
fn test_mmd_parallel_matches_sequential() {
    let x_ref = normal_matrix(60, 2, 0.0, 40);
    let x = normal_matrix(50, 2, 0.4, 41);
    let config = MmdConfig::default().with_seed(17).with_n_permutations(128);

    let mut seq = MmdDrift::with_kernel(
        x_ref.clone(),
        GaussianRbf::inferred(),
        SequentialEngine,
        config.clone(),
        None,
    )
    .unwrap();
    let mut par = MmdDrift::with_kernel(
        x_ref,
        GaussianRbf::inferred(),
        ParallelEngine::with_num_threads(4).unwrap(),
        config,
        None,
    )
    .unwrap();

    let (p_seq, d_seq, t_seq) = seq.score(&x).unwrap();
    let (p_par, d_par, t_par) = par.score(&x).unwrap();
    assert_eq!(p_seq, p_par);
    assert_eq!(d_seq, d_par);
    assert_eq!(t_seq, t_par);
}

#[test]
fn test_context_mmd_parallel_matches_sequential() {
    let (x_ref, c_ref) = conditional_sample(80, 0.0, 1.0, 0.0, 42);
    let (x, c) = conditional_sample(60, 0.0, 0.5, 0.2, 43);
    let config = ContextMmdConfig::default()
        .with_seed(18)
        .with_n_permutations(100)
        .with_return_coupling(true);

    let sequential = ContextComponents {
        x_kernel: GaussianRbf::inferred(),
        c_kernel: GaussianRbf::inferred(),
        classifier: KernelSmoother::default(),
        engine: SequentialEngine,
    };
    let parallel = ContextComponents {
        x_kernel: GaussianRbf::inferred(),
        c_kernel: GaussianRbf::inferred(),
        classifier: KernelSmoother::default(),
        engine: ParallelEngine::with_num_threads(4).unwrap(),
    };
    let mut seq = ContextMmdDrift::with_components(
        x_ref.clone(),
        c_ref.clone(),
        sequential,
        config.clone(),
        None,
    )
    .unwrap();
    let mut par = ContextMmdDrift::with_components(x_ref, c_ref, parallel, config, None).unwrap();

    let s = seq.score(&x, &c).unwrap();
    let p = par.score(&x, &c).unwrap();
    assert_eq!(s.p_val, p.p_val);
    assert_eq!(s.distance, p.distance);
    assert_eq!(s.distance_threshold, p.distance_threshold);
    assert_eq!(s.lams, p.lams);
    assert_eq!(s.couplings, p.couplings);
}
