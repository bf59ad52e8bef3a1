//! End-to-end properties of the chain representation: canonicalization,
//! rounding, arithmetic and the factory constructors.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ttkit_tensortrain::{unflatten, TtOperator, TtTensor};

fn dense_of(tt: &TtTensor<f64>) -> Vec<f64> {
    tt.to_dense().0
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[test]
fn construct_from_linear_dense_tensor() {
    // T[i, j, k] = i + 2j + 4k over dims (2, 2, 2) has exact ranks (2, 2).
    let dims = vec![2usize, 2, 2];
    let mut data = vec![0.0f64; 8];
    for i in 0..2 {
        for j in 0..2 {
            for k in 0..2 {
                data[(i * 2 + j) * 2 + k] = (i + 2 * j + 4 * k) as f64;
            }
        }
    }

    let tt = TtTensor::from_dense(&data, &dims, &[8, 8], 0.0).unwrap();
    assert_eq!(tt.ranks(), vec![2, 2]);

    let (back, back_dims) = tt.to_dense();
    assert_eq!(back_dims, dims);
    assert!(max_abs_diff(&data, &back) < 1e-12);
}

#[test]
fn ones_plus_ones_rounds_to_rank_one() {
    let x = TtTensor::<f64>::ones(&[3, 3, 3]).unwrap();
    let y = TtTensor::<f64>::ones(&[3, 3, 3]).unwrap();

    let mut z = (&x + &y).unwrap();
    assert_eq!(z.ranks(), vec![2, 2]);

    z.round_eps(1e-12).unwrap();
    assert_eq!(z.ranks(), vec![1, 1]);

    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                let v = z.evaluate(&[i, j, k]).unwrap();
                assert!((v - 2.0).abs() < 1e-10, "z[{i},{j},{k}] = {v}");
            }
        }
    }
}

#[test]
fn identity_operator_fixes_vectors() {
    let id = TtOperator::<f64>::identity(&[4, 4, 4, 4]).unwrap();
    let v = TtTensor::<f64>::ones(&[4, 4]).unwrap();
    let w = id.apply(&v).unwrap();

    for i in 0..4 {
        for j in 0..4 {
            let got = w.evaluate(&[i, j]).unwrap();
            let expect = v.evaluate(&[i, j]).unwrap();
            assert!((got - expect).abs() < 1e-10);
        }
    }
}

#[test]
fn frob_norm_equals_contracted_inner_product() {
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    let x = TtTensor::<f64>::random(&[4, 3, 4, 3], &[3, 3, 3], &mut rng).unwrap();

    let dense = dense_of(&x);
    let dense_norm: f64 = dense.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!((x.frob_norm() - dense_norm).abs() < 1e-10 * dense_norm.max(1.0));

    let via_dot = x.dot(&x).unwrap().sqrt();
    assert!((x.frob_norm() - via_dot).abs() < 1e-10 * via_dot.max(1.0));
}

#[test]
fn move_core_orthogonalizes_and_preserves_values() {
    let mut rng = ChaCha8Rng::seed_from_u64(200);
    let mut x = TtTensor::<f64>::random(&[3, 4, 3, 4], &[4, 4, 4], &mut rng).unwrap();
    let before = dense_of(&x);

    for &target in &[3usize, 1, 2, 0] {
        x.move_core(target, true).unwrap();
        assert_eq!(x.core_position(), Some(target));
        for i in 0..target {
            assert!(
                x.component(i).is_left_orthogonal(1e-10),
                "component {i} not left-orthogonal with core at {target}"
            );
        }
        for i in target + 1..x.degree() {
            assert!(
                x.component(i).is_right_orthogonal(1e-10),
                "component {i} not right-orthogonal with core at {target}"
            );
        }
        assert!(max_abs_diff(&before, &dense_of(&x)) < 1e-10);
    }
}

#[test]
fn round_respects_caps_and_error_bound() {
    let mut rng = ChaCha8Rng::seed_from_u64(300);
    let a = TtTensor::<f64>::random(&[4, 4, 4, 4], &[3, 3, 3], &mut rng).unwrap();
    let b = TtTensor::<f64>::random(&[4, 4, 4, 4], &[3, 3, 3], &mut rng).unwrap();

    let summed = (&a + &b).unwrap();
    // Interior edge ranks add; the boundary edges clamp to their feasible
    // maximum of 4.
    assert_eq!(summed.ranks(), vec![4, 6, 4]);

    // Exact rounding only strips rank deficiency and keeps values.
    let before = dense_of(&summed);
    let mut exact = summed.clone();
    exact.round_eps(0.0).unwrap();
    assert!(max_abs_diff(&before, &dense_of(&exact)) < 1e-10);

    // Capped rounding respects the caps and the relative error bound is
    // bounded by the norm it discards.
    let mut capped = summed.clone();
    capped.round(&[3, 3, 3], 1e-12).unwrap();
    assert!(capped.ranks().iter().all(|&r| r <= 3));
}

#[test]
fn addition_matches_dense_addition() {
    let mut rng = ChaCha8Rng::seed_from_u64(400);
    let a = TtTensor::<f64>::random(&[5, 5, 5], &[2, 2], &mut rng).unwrap();
    let b = TtTensor::<f64>::random(&[5, 5, 5], &[2, 2], &mut rng).unwrap();

    let sum = (&a + &b).unwrap();
    assert_eq!(sum.dims(), a.dims());
    assert_eq!(sum.ranks(), vec![4, 4]);

    let expect: Vec<f64> = dense_of(&a)
        .iter()
        .zip(dense_of(&b))
        .map(|(x, y)| x + y)
        .collect();
    assert!(max_abs_diff(&expect, &dense_of(&sum)) < 1e-10);

    let diff = (&sum - &a).unwrap();
    assert!(max_abs_diff(&dense_of(&b), &dense_of(&diff)) < 1e-10);
}

#[test]
fn entrywise_product_matches_hadamard() {
    let mut rng = ChaCha8Rng::seed_from_u64(500);
    let a = TtTensor::<f64>::random(&[5, 4, 5], &[2, 2], &mut rng).unwrap();
    let b = TtTensor::<f64>::random(&[5, 4, 5], &[2, 2], &mut rng).unwrap();

    let h = TtTensor::entrywise_product(&a, &b).unwrap();
    assert_eq!(h.ranks(), vec![4, 4]);

    let expect: Vec<f64> = dense_of(&a)
        .iter()
        .zip(dense_of(&b))
        .map(|(x, y)| x * y)
        .collect();
    assert!(max_abs_diff(&expect, &dense_of(&h)) < 1e-10);
}

#[test]
fn entrywise_square_matches_dense_square() {
    let mut rng = ChaCha8Rng::seed_from_u64(600);
    for dims in [vec![3usize, 4], vec![3usize, 3, 3]] {
        let ranks = vec![2usize; dims.len() - 1];
        let mut x = TtTensor::<f64>::random(&dims, &ranks, &mut rng).unwrap();
        let expect: Vec<f64> = dense_of(&x).iter().map(|v| v * v).collect();
        x.entrywise_square().unwrap();
        assert!(max_abs_diff(&expect, &dense_of(&x)) < 1e-10);
    }
}

#[test]
fn dyadic_product_is_kronecker_product() {
    let mut rng = ChaCha8Rng::seed_from_u64(700);
    let a = TtTensor::<f64>::random(&[2, 3], &[2], &mut rng).unwrap();
    let b = TtTensor::<f64>::random(&[3, 2], &[2], &mut rng).unwrap();

    let d = TtTensor::dyadic_product(&a, &b).unwrap();
    assert_eq!(d.dims(), &[2, 3, 3, 2]);

    let da = dense_of(&a);
    let db = dense_of(&b);
    let dd = dense_of(&d);
    for (ia, va) in da.iter().enumerate() {
        for (ib, vb) in db.iter().enumerate() {
            assert!((dd[ia * db.len() + ib] - va * vb).abs() < 1e-10);
        }
    }
}

#[test]
fn soft_threshold_contracts_toward_zero() {
    let mut rng = ChaCha8Rng::seed_from_u64(800);
    let mut x = TtTensor::<f64>::random(&[4, 4, 4], &[3, 3], &mut rng).unwrap();
    let norm = x.frob_norm();
    x.soft_threshold_uniform(norm, true).unwrap();
    let shrunk = x.frob_norm();
    assert!(shrunk < norm);
    assert!(shrunk > 0.0, "prevent_zero must keep the tensor non-zero");
}

#[test]
fn largest_entry_of_unit_tensor() {
    let dims = vec![5usize, 5, 5, 5];
    let mut data = vec![0.0f64; 625];
    let flat = ((1 * 5 + 2) * 5 + 3) * 5 + 4;
    data[flat] = 1.0;

    let x = TtTensor::from_dense(&data, &dims, &[5, 5, 5], 0.0).unwrap();
    let found = x.find_largest_entry(0.0, 0.0).unwrap();
    assert_eq!(found, flat);
    assert_eq!(unflatten(found, &dims), vec![1, 2, 3, 4]);
}

#[test]
fn complex_chains_roundtrip() {
    use num_complex::Complex64;

    let dims = vec![2usize, 2];
    let data: Vec<Complex64> = (0..4)
        .map(|i| Complex64::new(i as f64, (3 - i) as f64))
        .collect();

    let tt = TtTensor::from_dense(&data, &dims, &[4], 0.0).unwrap();
    let (back, _) = tt.to_dense();
    for (a, b) in data.iter().zip(&back) {
        assert!((a - b).norm() < 1e-12);
    }

    let norm_dense: f64 = data.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
    assert!((tt.frob_norm() - norm_dense).abs() < 1e-10);
}
