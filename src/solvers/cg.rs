//! Preconditioned conjugate gradient solver
//!
//! Solves Ax = b for symmetric positive semi-definite A with a consistent
//! right-hand side (b orthogonal to the null space of A).

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Preconditioned conjugate gradient solver
///
/// # Arguments
/// * `a_op` - Closure that computes A*x
/// * `m_op` - Closure that applies the preconditioner M⁻¹ to a residual
/// * `b` - Right-hand side vector
/// * `x0` - Initial guess
/// * `tol` - Relative residual tolerance (‖r‖ < tol·‖b‖)
/// * `max_iter` - Maximum iterations
///
/// # Returns
/// Solution vector x
pub fn pcg_solve<A, M>(
    a_op: A,
    m_op: M,
    b: &[f64],
    x0: &[f64],
    tol: f64,
    max_iter: usize,
) -> Vec<f64>
where
    A: Fn(&[f64]) -> Vec<f64>,
    M: Fn(&[f64]) -> Vec<f64>,
{
    let n = b.len();
    let mut x = x0.to_vec();

    let b_norm = dot(b, b).sqrt();
    if b_norm == 0.0 {
        return x;
    }

    // r = b - A*x
    let ax = a_op(&x);
    let mut r: Vec<f64> = b.iter().zip(ax.iter())
        .map(|(&bi, &axi)| bi - axi)
        .collect();
    if dot(&r, &r).sqrt() < tol * b_norm {
        return x;
    }

    let mut z = m_op(&r);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);

    for _iter in 0..max_iter {
        if rz <= 0.0 {
            break;
        }

        let ap = a_op(&p);
        let pap = dot(&p, &ap);
        if pap.abs() < 1e-20 {
            break;
        }

        let alpha = rz / pap;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }

        if dot(&r, &r).sqrt() < tol * b_norm {
            break;
        }

        z = m_op(&r);
        let rz_new = dot(&r, &z);
        let beta = rz_new / rz;

        // p = z + beta * p
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }

        rz = rz_new;
    }

    x
}
