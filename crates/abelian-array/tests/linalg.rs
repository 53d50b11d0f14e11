use abelian_array::{AbelianTensor, ChargeGroup, DenseTensor, Leg, Side, TensorLike};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn legs_a() -> Vec<Leg> {
    vec![
        Leg::new(vec![1, 2], vec![0, 1], 1).unwrap(),
        Leg::new(vec![2, 2], vec![0, 1], -1).unwrap(),
        Leg::new(vec![2, 1], vec![0, 1], 1).unwrap(),
    ]
}

fn legs_b() -> Vec<Leg> {
    vec![
        Leg::new(vec![2, 2], vec![0, 1], 1).unwrap(),
        Leg::new(vec![2, 1], vec![0, 1], -1).unwrap(),
        Leg::new(vec![1, 2], vec![0, 1], 1).unwrap(),
    ]
}

fn assert_dense_close(block: &AbelianTensor<f64>, dense: &DenseTensor<f64>, tol: f64) {
    let got = DenseTensor::new(TensorLike::to_dense(block));
    assert_eq!(got.dims(), dense.dims());
    let dims = got.dims();
    let total: usize = dims.iter().product();
    let mut idx = vec![0usize; dims.len()];
    for _ in 0..total {
        assert!(
            (got.get(&idx) - dense.get(&idx)).abs() <= tol,
            "mismatch at {idx:?}: {} vs {}",
            got.get(&idx),
            dense.get(&idx)
        );
        for ax in (0..dims.len()).rev() {
            idx[ax] += 1;
            if idx[ax] < dims[ax] {
                break;
            }
            idx[ax] = 0;
        }
    }
}

#[test]
fn test_dot_matches_dense_single_pair() {
    let mut rng = ChaCha8Rng::seed_from_u64(300);
    let a = AbelianTensor::<f64>::random(ChargeGroup::Zn(2), legs_a(), 0, &mut rng);
    let b = AbelianTensor::<f64>::random(ChargeGroup::Zn(2), legs_b(), 1, &mut rng);
    // a leg 1 (dir -1) against b leg 0 (dir +1).
    let c = a.dot(&b, &[(1, 0)]).unwrap();
    c.check_consistency().unwrap();
    assert_eq!(c.charge(), 1);
    let da = DenseTensor::new(a.to_dense());
    let db = DenseTensor::new(b.to_dense());
    let dc = da.contract(&db, &[(1, 0)]).unwrap();
    assert_dense_close(&c, &dc, 1e-12);
}

#[test]
fn test_dot_matches_dense_two_pairs() {
    let mut rng = ChaCha8Rng::seed_from_u64(301);
    let a = AbelianTensor::<f64>::random(ChargeGroup::U1, legs_a(), 1, &mut rng);
    let b = AbelianTensor::<f64>::random(ChargeGroup::U1, legs_b(), 0, &mut rng);
    // a legs (1, 2) against b legs (0, 1).
    let c = a.dot(&b, &[(1, 0), (2, 1)]).unwrap();
    c.check_consistency().unwrap();
    assert_eq!(c.rank(), 2);
    let da = DenseTensor::new(a.to_dense());
    let db = DenseTensor::new(b.to_dense());
    let dc = da.contract(&db, &[(1, 0), (2, 1)]).unwrap();
    assert_dense_close(&c, &dc, 1e-12);
}

#[test]
fn test_full_contraction_to_scalar() {
    let mut rng = ChaCha8Rng::seed_from_u64(302);
    let legs = vec![
        Leg::new(vec![2, 3], vec![0, 1], 1).unwrap(),
        Leg::new(vec![2, 3], vec![0, 1], -1).unwrap(),
    ];
    let t = AbelianTensor::<f64>::random(ChargeGroup::U1, legs, 0, &mut rng);
    let conj = t.conjugate();
    // <T, T> contracting both legs pairwise.
    let inner = t.dot(&conj, &[(0, 0), (1, 1)]).unwrap();
    assert_eq!(inner.rank(), 0);
    assert!((inner.value().unwrap() - t.norm_sq()).abs() < 1e-12);
}

#[test]
fn test_outer_product_matches_dense() {
    let mut rng = ChaCha8Rng::seed_from_u64(303);
    let legs = vec![Leg::new(vec![1, 2], vec![0, 1], 1).unwrap()];
    let u = AbelianTensor::<f64>::random(ChargeGroup::U1, legs.clone(), 0, &mut rng);
    let w = AbelianTensor::<f64>::random(ChargeGroup::U1, legs, 1, &mut rng);
    let outer = u.dot(&w, &[]).unwrap();
    assert_eq!(outer.rank(), 2);
    let du = DenseTensor::new(u.to_dense());
    let dw = DenseTensor::new(w.to_dense());
    let douter = du.contract(&dw, &[]).unwrap();
    assert_dense_close(&outer, &douter, 1e-12);
}

#[test]
fn test_scalar_times_tensor() {
    let mut rng = ChaCha8Rng::seed_from_u64(304);
    let t = AbelianTensor::<f64>::random(ChargeGroup::U1, legs_a(), 0, &mut rng);
    let s = AbelianTensor::<f64>::scalar(ChargeGroup::U1, 2.0);
    let doubled = s.dot(&t, &[]).unwrap();
    assert!(doubled.allclose(&t.scale(2.0), 1e-12));
}

#[test]
fn test_trace_matches_dense() {
    let mut rng = ChaCha8Rng::seed_from_u64(305);
    let legs = vec![
        Leg::new(vec![1, 2], vec![0, 1], 1).unwrap(),
        Leg::new(vec![2, 3], vec![0, 1], 1).unwrap(),
        Leg::new(vec![2, 3], vec![0, 1], -1).unwrap(),
    ];
    let t = AbelianTensor::<f64>::random(ChargeGroup::U1, legs, 0, &mut rng);
    let traced = t.trace(1, 2).unwrap();
    traced.check_consistency().unwrap();
    assert_eq!(traced.rank(), 1);
    let dense = DenseTensor::new(t.to_dense());
    let expected = DenseTensor::from_fn(&[3], |idx| {
        (0..5).map(|d| dense.get(&[idx[0], d, d])).sum()
    });
    assert_dense_close(&traced, &expected, 1e-12);
}

#[test]
fn test_trace_rejects_same_direction() {
    let legs = vec![
        Leg::new(vec![2, 3], vec![0, 1], 1).unwrap(),
        Leg::new(vec![2, 3], vec![0, 1], 1).unwrap(),
    ];
    let t = AbelianTensor::<f64>::ones(ChargeGroup::U1, legs, 0);
    assert!(t.trace(0, 1).is_err());
}

#[test]
fn test_additive_properties() {
    let mut rng = ChaCha8Rng::seed_from_u64(306);
    let s = AbelianTensor::<f64>::random(ChargeGroup::Zn(2), legs_a(), 1, &mut rng);
    let t = AbelianTensor::<f64>::random(ChargeGroup::Zn(2), legs_a(), 1, &mut rng);
    let back = s.add(&t).unwrap().sub(&t).unwrap();
    assert!(back.allclose(&s, 1e-12));
    assert_eq!(s.scale(0.0), s.zeros_like());
    assert_eq!(s.mul(&s.ones_like()).unwrap(), s);
}

#[test]
fn test_multiply_diag_absorbs_like_contraction() {
    let mut rng = ChaCha8Rng::seed_from_u64(307);
    let t = AbelianTensor::<f64>::random(ChargeGroup::U1, legs_a(), 0, &mut rng);
    // Diagonal on leg 0 (dir +1), applied from the left.
    let d_leg = Leg::new(vec![1, 2], vec![0, 1], 1).unwrap();
    let ones = AbelianTensor::<f64>::ones(ChargeGroup::U1, vec![d_leg], 0);
    // An all-ones diagonal on the conserving sector changes only what it
    // covers; scaling it doubles those entries.
    let doubled = t.multiply_diag(&ones.scale(2.0), 0, Side::Left).unwrap();
    for (key, block) in t.sects() {
        if key[0] == 0 {
            let got = doubled.get_block(key).unwrap();
            for (x, y) in got.to_flat().into_iter().zip(block.to_flat()) {
                assert!((x - 2.0 * y).abs() < 1e-12);
            }
        }
    }
}

#[test]
fn test_norm_invariant_under_index_algebra() {
    let mut rng = ChaCha8Rng::seed_from_u64(308);
    let t = AbelianTensor::<f64>::random(ChargeGroup::Zn(3), legs_a(), 2, &mut rng);
    let n = t.norm();
    assert!((t.transpose(&[2, 0, 1]).unwrap().norm() - n).abs() < 1e-12);
    assert!((t.flip_dir(1).unwrap().norm() - n).abs() < 1e-12);
    assert!((t.conjugate().norm() - n).abs() < 1e-12);
    assert!((t.join_indices(&[vec![0, 2]], &[1]).unwrap().norm() - n).abs() < 1e-12);
}
