//! Derivative-free minimisation

use serde::{Deserialize, Serialize};

/// Outcome of a Nelder-Mead search
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    /// Best point found
    pub point: Vec<f64>,
    /// Objective value at `point`
    pub value: f64,
    /// Iterations performed
    pub iterations: usize,
    /// Whether the simplex collapsed below the tolerance before `max_iter`
    pub converged: bool,
}

/// Nelder-Mead coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NelderMeadConfig {
    /// Iteration cap
    pub max_iter: usize,
    /// Convergence tolerance on the spread of objective values
    pub tolerance: f64,
    /// Reflection coefficient
    pub alpha: f64,
    /// Expansion coefficient
    pub gamma: f64,
    /// Contraction coefficient
    pub rho: f64,
    /// Shrink coefficient
    pub sigma: f64,
    /// Step used to build the initial simplex
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-8,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            initial_step: 0.1,
        }
    }
}

/// Minimise `objective` starting from `initial`, keeping every coordinate inside `bounds`
///
/// The search is fully deterministic: the same inputs always yield the same point.
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: &NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 {
        let value = objective(initial);
        return NelderMeadResult {
            point: Vec::new(),
            value,
            iterations: 0,
            converged: value.is_finite(),
        };
    }

    let clamp = |point: Vec<f64>| -> Vec<f64> {
        match bounds {
            Some(bounds) => point
                .into_iter()
                .zip(bounds.iter())
                .map(|(x, &(lo, hi))| x.clamp(lo, hi))
                .collect(),
            None => point,
        }
    };
    // Non-finite objective values are treated as +inf so the simplex moves away from them
    let evaluate = |point: &[f64]| -> f64 {
        let value = objective(point);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(clamp(initial.to_vec()));
    for i in 0..n {
        let mut vertex = initial.to_vec();
        let step = if initial[i].abs() > 1e-8 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        vertex[i] += step;
        simplex.push(clamp(vertex));
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| evaluate(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n - 1];

        if (values[worst] - values[best]).abs() < config.tolerance {
            converged = true;
            break;
        }

        let centroid = centroid_without(&simplex, worst);

        let reflected = clamp(affine(&centroid, &simplex[worst], -config.alpha));
        let reflected_value = evaluate(&reflected);

        if reflected_value < values[best] {
            let expanded = clamp(affine(&centroid, &reflected, config.gamma));
            let expanded_value = evaluate(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (contracted, contracted_value) = if reflected_value < values[worst] {
            let outside = clamp(affine(&centroid, &reflected, config.rho));
            let value = evaluate(&outside);
            (outside, value)
        } else {
            let inside = clamp(affine(&centroid, &simplex[worst], config.rho));
            let value = evaluate(&inside);
            (inside, value)
        };

        if contracted_value < values[worst].min(reflected_value) {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            let shrunk = clamp(affine(&anchor, &simplex[i], config.sigma));
            values[i] = evaluate(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    NelderMeadResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

/// `origin + t * (point - origin)`
fn affine(origin: &[f64], point: &[f64], t: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(point.iter())
        .map(|(o, p)| o + t * (p - o))
        .collect()
}

fn centroid_without(simplex: &[Vec<f64>], excluded: usize) -> Vec<f64> {
    let dims = simplex[0].len();
    let count = (simplex.len() - 1) as f64;
    let mut centroid = vec![0.0; dims];
    for (i, vertex) in simplex.iter().enumerate() {
        if i == excluded {
            continue;
        }
        for (c, v) in centroid.iter_mut().zip(vertex.iter()) {
            *c += v;
        }
    }
    centroid.iter_mut().for_each(|c| *c /= count);
    centroid
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_quadratic_bowl() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
            None,
            &NelderMeadConfig::default(),
        );
        assert!(result.converged);
        assert_approx_eq!(result.point[0], 2.0, 1e-3);
        assert_approx_eq!(result.point[1], -1.0, 1e-3);
    }

    #[test]
    fn test_bounds_are_respected() {
        let bounds = [(-0.5, 0.5)];
        let result = nelder_mead(
            |x| (x[0] - 3.0).powi(2),
            &[0.0],
            Some(&bounds),
            &NelderMeadConfig::default(),
        );
        assert!(result.point[0] <= 0.5);
        assert_approx_eq!(result.point[0], 0.5, 1e-3);
    }

    #[test]
    fn test_deterministic() {
        let f = |x: &[f64]| (x[0] * x[0] - 1.0).powi(2) + x[1].powi(2);
        let config = NelderMeadConfig::default();
        let a = nelder_mead(f, &[0.3, 0.2], None, &config);
        let b = nelder_mead(f, &[0.3, 0.2], None, &config);
        assert_eq!(a.point, b.point);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_zero_dimensional() {
        let result = nelder_mead(|_| 4.0, &[], None, &NelderMeadConfig::default());
        assert!(result.point.is_empty());
        assert_eq!(result.value, 4.0);
    }
}
