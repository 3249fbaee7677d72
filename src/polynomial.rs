use nalgebra::{Complex, DMatrix};

/// AR lag polynomial: 1 - phi_1*L - phi_2*L^2 - ...
pub fn make_ar_poly(coeffs: &[f64]) -> Vec<f64> {
    std::iter::once(1.0).chain(coeffs.iter().map(|&c| -c)).collect()
}

/// MA lag polynomial: 1 + theta_1*L + theta_2*L^2 + ...
pub fn make_ma_poly(coeffs: &[f64]) -> Vec<f64> {
    std::iter::once(1.0).chain(coeffs.iter().copied()).collect()
}

/// Roots of `c[0] + c[1] z + ... + c[d] z^d` with `c[0] != 0`.
///
/// Trailing zero coefficients lower the degree. The roots are the reciprocals
/// of the eigenvalues of the companion matrix of the reversed polynomial.
pub fn poly_roots(coeffs: &[f64]) -> Vec<Complex<f64>> {
    let degree = match coeffs.iter().rposition(|&c| c != 0.0) {
        Some(d) if d > 0 => d,
        _ => return vec![],
    };
    let c0 = coeffs[0];
    if c0 == 0.0 {
        return vec![];
    }

    // lambda^d + (c1/c0) lambda^{d-1} + ... + cd/c0
    let mut companion = DMatrix::<f64>::zeros(degree, degree);
    for j in 0..degree {
        companion[(0, j)] = -coeffs[j + 1] / c0;
    }
    for i in 1..degree {
        companion[(i, i - 1)] = 1.0;
    }

    companion
        .complex_eigenvalues()
        .iter()
        .map(|lambda| lambda.inv())
        .collect()
}

/// Roots of the AR polynomial `1 - Σ φ_i z^i`.
pub fn ar_roots(ar: &[f64]) -> Vec<Complex<f64>> {
    poly_roots(&make_ar_poly(ar))
}

/// Roots of the MA polynomial `1 + Σ θ_i z^i`.
pub fn ma_roots(ma: &[f64]) -> Vec<Complex<f64>> {
    poly_roots(&make_ma_poly(ma))
}

/// All AR roots strictly outside the unit circle.
pub fn is_stationary(ar: &[f64]) -> bool {
    ar_roots(ar).iter().all(|z| z.norm() > 1.0)
}

/// All MA roots strictly outside the unit circle.
pub fn is_invertible(ma: &[f64]) -> bool {
    ma_roots(ma).iter().all(|z| z.norm() > 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_ar_poly() {
        assert_eq!(make_ar_poly(&[0.5, -0.3]), vec![1.0, -0.5, 0.3]);
        assert_eq!(make_ar_poly(&[]), vec![1.0]);
    }

    #[test]
    fn test_make_ma_poly() {
        assert_eq!(make_ma_poly(&[0.4]), vec![1.0, 0.4]);
    }

    #[test]
    fn test_ar1_root() {
        // 1 - 0.5 z = 0 -> z = 2
        let roots = ar_roots(&[0.5]);
        assert_eq!(roots.len(), 1);
        assert!((roots[0].re - 2.0).abs() < 1e-12);
        assert!(roots[0].im.abs() < 1e-12);
    }

    #[test]
    fn test_ma1_root() {
        // 1 + 0.25 z = 0 -> z = -4
        let roots = ma_roots(&[0.25]);
        assert!((roots[0].re + 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_ar2_real_roots() {
        // (1 - 0.5z)(1 - 0.25z) = 1 - 0.75z + 0.125z^2 -> phi = [0.75, -0.125]
        let mut roots: Vec<f64> = ar_roots(&[0.75, -0.125]).iter().map(|z| z.re).collect();
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((roots[0] - 2.0).abs() < 1e-10, "roots: {:?}", roots);
        assert!((roots[1] - 4.0).abs() < 1e-10, "roots: {:?}", roots);
    }

    #[test]
    fn test_complex_pair_modulus() {
        // 1 - 1.0z + 0.5z^2: roots 1 ± i, modulus sqrt(2)
        let roots = ar_roots(&[1.0, -0.5]);
        assert_eq!(roots.len(), 2);
        for z in &roots {
            assert!((z.norm() - 2f64.sqrt()).abs() < 1e-10);
            assert!((z.im.abs() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_trailing_zero_lowers_degree() {
        assert_eq!(ar_roots(&[0.5, 0.0]).len(), 1);
        assert!(ar_roots(&[0.0, 0.0]).is_empty());
    }

    #[test]
    fn test_stationarity_checks() {
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.0]));
        assert!(!is_stationary(&[1.2, -0.1]));
        assert!(is_stationary(&[]));
        assert!(is_invertible(&[-0.9]));
        assert!(!is_invertible(&[1.5]));
    }
}
