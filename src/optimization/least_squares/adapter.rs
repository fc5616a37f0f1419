//! Adapter that exposes a bounded `LeastSquaresProblem` as an `argmin` problem.
//!
//! argmin's quasi-Newton solvers are unconstrained, so the adapter works in
//! `u`-space with `x = lo + (hi - lo)·σ(u)` element-wise. The cost is
//! `c(u) = 0.5·‖r(x(u))‖²` and its gradient follows from the chain rule,
//! `∂c/∂u_j = (Jᵀr)_j · dx_j/du_j`, where `J = ∂r/∂x` is analytic when the
//! problem supplies one and finite-differenced otherwise.
//!
//! For `|u| > SATURATION_U` the logistic is flat to within `~2e-9` of the
//! box width, so the cost gains a quadratic wall
//! `0.5·WALL_WEIGHT·(|u| − SATURATION_U)²` per coordinate. Far along any
//! search direction the slope is then positive, which the Hager–Zhang
//! bracket requires at its large default maximum step. Inside the wall the
//! cost is the plain least-squares cost.
use crate::optimization::{
    errors::{OptError, OptResult},
    least_squares::{
        finite_diff::jacobian_or_fd,
        traits::{LeastSquaresProblem, half_sum_sq},
        types::{Cost, Grad, Theta},
        validation::{validate_grad, validate_residuals},
    },
    numerical_stability::transformations::{bounded_deriv, from_bounded, to_bounded},
};
use argmin::core::{CostFunction, Error, Gradient};
use ndarray::Zip;

/// `|u|` beyond which the box map is treated as saturated.
pub const SATURATION_U: f64 = 20.0;

/// Curvature of the wall outside `±SATURATION_U`.
pub const WALL_WEIGHT: f64 = 1.0;

/// Bridges a bounded residual model to argmin's `CostFunction` and `Gradient`.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, P: LeastSquaresProblem + ?Sized> {
    pub problem: &'a P,
    pub n_residuals: usize,
}

impl<'a, P: LeastSquaresProblem + ?Sized> ArgMinAdapter<'a, P> {
    /// Construct a new adapter; `n_residuals` is the expected residual length.
    pub fn new(problem: &'a P, n_residuals: usize) -> Self {
        Self { problem, n_residuals }
    }

    /// Map unconstrained `u` into the box.
    pub fn to_x(&self, u: &Theta) -> Theta {
        let (lo, hi) = self.problem.bounds();
        let mut x = Theta::zeros(u.len());
        Zip::from(&mut x).and(u).and(lo).and(hi).for_each(|x, &u, &l, &h| {
            *x = to_bounded(u, l, h);
        });
        x
    }

    /// Map a box-feasible `x` into unconstrained coordinates.
    pub fn to_u(&self, x: &Theta) -> Theta {
        let (lo, hi) = self.problem.bounds();
        let mut u = Theta::zeros(x.len());
        Zip::from(&mut u).and(x).and(lo).and(hi).for_each(|u, &x, &l, &h| {
            *u = from_bounded(x, l, h);
        });
        u
    }

    /// Reject trial points with NaN or infinite coordinates.
    ///
    /// # Errors
    /// [`OptError::NonFiniteTrialPoint`] for the first offending coordinate.
    pub fn check_trial(&self, u: &Theta) -> OptResult<()> {
        match u.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(OptError::NonFiniteTrialPoint { index, value: u[index] }),
            None => Ok(()),
        }
    }
}

fn wall_excess(u: f64) -> f64 {
    (u.abs() - SATURATION_U).max(0.0)
}

fn wall_cost(u: &Theta) -> Cost {
    0.5 * WALL_WEIGHT * u.iter().map(|&v| wall_excess(v).powi(2)).sum::<f64>()
}

impl<'a, P: LeastSquaresProblem + ?Sized> CostFunction for ArgMinAdapter<'a, P> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate `c(u) = 0.5·‖r(x(u))‖²` plus the saturation wall.
    ///
    /// # Errors
    /// Rejects non-finite trial points, propagates residual errors and
    /// rejects non-finite residuals.
    fn cost(&self, u: &Self::Param) -> Result<Self::Output, Error> {
        self.check_trial(u)?;
        let residuals = self.problem.residuals(&self.to_x(u))?;
        validate_residuals(&residuals, self.n_residuals)?;
        let cost = half_sum_sq(&residuals) + wall_cost(u);
        if !cost.is_finite() {
            return Err((OptError::NonFiniteCost { value: cost }).into());
        }
        Ok(cost)
    }
}

impl<'a, P: LeastSquaresProblem + ?Sized> Gradient for ArgMinAdapter<'a, P> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate `∂c/∂u = (Jᵀr) ⊙ dx/du` plus the wall gradient.
    ///
    /// # Errors
    /// - Rejects non-finite trial points.
    /// - Propagates residual and Jacobian errors (analytic or FD).
    /// - Returns validation errors if the gradient is non-finite.
    fn gradient(&self, u: &Self::Param) -> Result<Self::Gradient, Error> {
        self.check_trial(u)?;
        let x = self.to_x(u);
        let residuals = self.problem.residuals(&x)?;
        validate_residuals(&residuals, self.n_residuals)?;
        let jac = jacobian_or_fd(self.problem, &x, self.n_residuals)?;
        let mut grad = jac.t().dot(&residuals);
        let (lo, hi) = self.problem.bounds();
        Zip::from(&mut grad).and(u).and(lo).and(hi).for_each(|g, &u, &l, &h| {
            *g = *g * bounded_deriv(u, l, h) + WALL_WEIGHT * wall_excess(u).copysign(u);
        });
        validate_grad(&grad, u.len())?;
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        errors::OptResult,
        least_squares::types::{Jacobian, Residuals},
    };
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The u ↔ x mapping of the adapter.
    // - Chain-rule gradients versus a finite difference of the cost.
    // - Error propagation from the residual model into argmin errors.
    // - The saturation wall and the rejection of non-finite trial points.
    // -------------------------------------------------------------------------

    /// r(x) = x - target, so c = 0.5·‖x - target‖².
    struct Shifted {
        target: Theta,
        lo: Theta,
        hi: Theta,
    }

    impl LeastSquaresProblem for Shifted {
        fn residuals(&self, x: &Theta) -> OptResult<Residuals> {
            Ok(x - &self.target)
        }

        fn bounds(&self) -> (&Theta, &Theta) {
            (&self.lo, &self.hi)
        }

        fn jacobian(&self, x: &Theta) -> OptResult<Jacobian> {
            Ok(Array2::eye(x.len()))
        }
    }

    fn shifted() -> Shifted {
        Shifted { target: array![0.3, -1.0], lo: array![0.0, -2.0], hi: array![1.0, 2.0] }
    }

    #[test]
    // Purpose
    // -------
    // Verify `to_u` and `to_x` are mutual inverses for interior points.
    //
    // Given
    // -----
    // - Box [0,1]×[-2,2] and x = [0.25, 1.5].
    //
    // Expect
    // ------
    // - `to_x(to_u(x)) ≈ x`.
    fn adapter_maps_between_spaces() {
        // Arrange
        let problem = shifted();
        let adapter = ArgMinAdapter::new(&problem, 2);
        let x = array![0.25, 1.5];

        // Act
        let back = adapter.to_x(&adapter.to_u(&x));

        // Assert
        assert_relative_eq!(back[0], x[0], max_relative = 1e-12);
        assert_relative_eq!(back[1], x[1], max_relative = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Check the chain-rule gradient against a central difference of the
    // cost in u-space.
    //
    // Given
    // -----
    // - The shifted identity model at u = [0.2, -0.4].
    //
    // Expect
    // ------
    // - Agreement to 1e-6 per component.
    fn gradient_matches_central_difference_of_cost() {
        // Arrange
        let problem = shifted();
        let adapter = ArgMinAdapter::new(&problem, 2);
        let u = array![0.2, -0.4];
        let h = 1e-6;

        // Act
        let grad = adapter.gradient(&u).expect("gradient");

        // Assert
        for j in 0..2 {
            let mut up = u.clone();
            let mut dn = u.clone();
            up[j] += h;
            dn[j] -= h;
            let fd = (adapter.cost(&up).expect("cost") - adapter.cost(&dn).expect("cost"))
                / (2.0 * h);
            assert_relative_eq!(grad[j], fd, epsilon = 1e-6);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure a residual length mismatch is reported through argmin's error.
    //
    // Given
    // -----
    // - An adapter expecting 3 residuals over a 2-residual model.
    //
    // Expect
    // ------
    // - Converting the error back yields `ResidualDimMismatch`.
    fn cost_reports_residual_length_mismatch() {
        // Arrange
        let problem = shifted();
        let adapter = ArgMinAdapter::new(&problem, 3);

        // Act
        let err = adapter.cost(&array![0.0, 0.0]).expect_err("length mismatch");

        // Assert
        assert_eq!(OptError::from(err), OptError::ResidualDimMismatch { expected: 3, found: 2 });
    }

    #[test]
    // Purpose
    // -------
    // Ensure a NaN trial point is rejected before the box map runs.
    //
    // Given
    // -----
    // - u = [0, NaN].
    //
    // Expect
    // ------
    // - Cost and gradient both fail with `NonFiniteTrialPoint { index: 1 }`.
    fn non_finite_trial_point_is_rejected() {
        // Arrange
        let problem = shifted();
        let adapter = ArgMinAdapter::new(&problem, 2);
        let u = array![0.0, f64::NAN];

        // Act
        let cost_err = OptError::from(adapter.cost(&u).expect_err("NaN trial"));
        let grad_err = OptError::from(adapter.gradient(&u).expect_err("NaN trial"));

        // Assert
        assert!(matches!(cost_err, OptError::NonFiniteTrialPoint { index: 1, .. }));
        assert!(matches!(grad_err, OptError::NonFiniteTrialPoint { index: 1, .. }));
    }

    #[test]
    // Purpose
    // -------
    // Verify the cost keeps rising past saturation while the interior cost
    // is the plain least-squares cost.
    //
    // Given
    // -----
    // - The shifted identity model; u = [0.2, -0.4], [30, 0] and [60, 0].
    //
    // Expect
    // ------
    // - Interior cost equals 0.5·‖x − target‖².
    // - Saturated cost increases with u₀ and the slope along u₀ is
    //   positive, matching the wall gradient 40 at u₀ = 60.
    fn saturated_region_has_positive_slope() {
        // Arrange
        let problem = shifted();
        let adapter = ArgMinAdapter::new(&problem, 2);
        let inside = array![0.2, -0.4];
        let near = array![30.0, 0.0];
        let far = array![60.0, 0.0];

        // Act
        let x = adapter.to_x(&inside);
        let c_inside = adapter.cost(&inside).expect("cost");
        let c_near = adapter.cost(&near).expect("cost");
        let c_far = adapter.cost(&far).expect("cost");
        let g_far = adapter.gradient(&far).expect("gradient");

        // Assert
        assert_relative_eq!(c_inside, half_sum_sq(&(&x - &problem.target)), max_relative = 1e-14);
        assert!(c_far > c_near);
        assert_relative_eq!(g_far[0], WALL_WEIGHT * (60.0 - SATURATION_U), max_relative = 1e-9);
    }
}
