/// Molar gas constant in J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314_462_618;

/// Site fraction below which `y ln y` is replaced by its second-order Taylor
/// expansion, keeping value, slope and curvature continuous at the boundary.
pub const MIN_SITE_FRACTION: f64 = 1e-12;

#[inline]
pub fn y_ln_y(y: f64) -> f64 {
    if y > MIN_SITE_FRACTION {
        y * y.ln()
    } else {
        let y0 = MIN_SITE_FRACTION;
        let d = y - y0;
        y0 * y0.ln() + (y0.ln() + 1.0) * d + d * d / (2.0 * y0)
    }
}

#[inline]
pub fn y_ln_y_derivative(y: f64) -> f64 {
    if y > MIN_SITE_FRACTION {
        y.ln() + 1.0
    } else {
        let y0 = MIN_SITE_FRACTION;
        y0.ln() + 1.0 + (y - y0) / y0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn y_ln_y_of_one_is_zero() {
        assert!(f64_approx_equal(y_ln_y(1.0), 0.0));
    }

    #[test]
    fn y_ln_y_of_half_matches_closed_form() {
        assert!(f64_approx_equal(y_ln_y(0.5), 0.5 * 0.5f64.ln()));
    }

    #[test]
    fn y_ln_y_is_finite_and_continuous_at_zero() {
        let at_zero = y_ln_y(0.0);
        assert!(at_zero.is_finite());
        assert!(at_zero.abs() < 1e-9);
        let boundary = y_ln_y(MIN_SITE_FRACTION);
        assert_eq!(boundary, MIN_SITE_FRACTION * MIN_SITE_FRACTION.ln());
    }

    #[test]
    fn derivative_is_continuous_at_extension_boundary() {
        let above = y_ln_y_derivative(MIN_SITE_FRACTION * (1.0 + 1e-9));
        let below = y_ln_y_derivative(MIN_SITE_FRACTION * (1.0 - 1e-9));
        assert!((above - below).abs() < 1e-6);
    }
}
