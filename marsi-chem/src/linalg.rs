//! Small 3-D vector and 3x3 matrix helpers.
//!
//! Jacobi eigen-decomposition and an SVD built on it, enough for Kabsch
//! superposition and principal-axis frames without a linear algebra crate.

pub(crate) type Vec3 = [f64; 3];

pub(crate) fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub(crate) fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub(crate) fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

pub(crate) fn distance(a: Vec3, b: Vec3) -> f64 {
    norm(sub(a, b))
}

pub(crate) fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return [0.0; 3];
    }
    let sum = points.iter().fold([0.0; 3], |acc, &p| add(acc, p));
    scale(sum, 1.0 / points.len() as f64)
}

/// Angle a-b-c in radians.
pub(crate) fn angle(a: Vec3, b: Vec3, c: Vec3) -> f64 {
    let u = sub(a, b);
    let v = sub(c, b);
    let denom = norm(u) * norm(v);
    if denom < 1e-12 {
        return 0.0;
    }
    (dot(u, v) / denom).clamp(-1.0, 1.0).acos()
}

/// Signed dihedral a-b-c-d in radians, in `(-π, π]`.
pub(crate) fn dihedral(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> f64 {
    let b1 = sub(b, a);
    let b2 = sub(c, b);
    let b3 = sub(d, c);
    let n1 = cross(b1, b2);
    let n2 = cross(b2, b3);
    let b2_len = norm(b2);
    if b2_len < 1e-12 {
        return 0.0;
    }
    let m1 = cross(n1, scale(b2, 1.0 / b2_len));
    dot(m1, n2).atan2(dot(n1, n2))
}

/// A 3x3 matrix stored in row-major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix3x3 {
    pub data: [[f64; 3]; 3],
}

impl Matrix3x3 {
    pub fn zeros() -> Self {
        Self { data: [[0.0; 3]; 3] }
    }

    pub fn identity() -> Self {
        Self {
            data: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn multiply(&self, other: &Matrix3x3) -> Matrix3x3 {
        let mut result = Matrix3x3::zeros();
        for i in 0..3 {
            for j in 0..3 {
                result.data[i][j] = (0..3).map(|k| self.data[i][k] * other.data[k][j]).sum();
            }
        }
        result
    }

    pub fn transpose(&self) -> Matrix3x3 {
        let mut result = Matrix3x3::zeros();
        for i in 0..3 {
            for j in 0..3 {
                result.data[i][j] = self.data[j][i];
            }
        }
        result
    }

    pub fn determinant(&self) -> f64 {
        let d = &self.data;
        d[0][0] * (d[1][1] * d[2][2] - d[1][2] * d[2][1])
            - d[0][1] * (d[1][0] * d[2][2] - d[1][2] * d[2][0])
            + d[0][2] * (d[1][0] * d[2][1] - d[1][1] * d[2][0])
    }

    /// `M · p`.
    pub fn apply(&self, p: Vec3) -> Vec3 {
        [dot(self.data[0], p), dot(self.data[1], p), dot(self.data[2], p)]
    }

    pub fn column(&self, col: usize) -> Vec3 {
        [self.data[0][col], self.data[1][col], self.data[2][col]]
    }
}

/// Orthonormal factors of `A = U · diag(s) · Vᵀ`, singular values descending.
#[derive(Debug, Clone)]
pub(crate) struct Svd3x3 {
    pub u: Matrix3x3,
    pub vt: Matrix3x3,
}

/// SVD through the eigen-decomposition of `AᵀA`, then `U = A·V·S⁻¹`.
pub(crate) fn svd_3x3(matrix: &Matrix3x3) -> Svd3x3 {
    let ata = matrix.transpose().multiply(matrix);
    let (vectors, values) = symmetric_eigen(&ata);

    let mut s = [0.0f64; 3];
    for (k, &value) in values.iter().enumerate() {
        s[k] = value.max(0.0).sqrt();
    }

    let av = matrix.multiply(&vectors);
    let mut u = Matrix3x3::zeros();
    for col in 0..3 {
        let c = if s[col] > 1e-10 {
            scale(av.column(col), 1.0 / s[col])
        } else {
            // Complete the basis for rank-deficient input.
            let c = match col {
                0 => [1.0, 0.0, 0.0],
                1 => orthogonal_to(u.column(0)),
                _ => cross(u.column(0), u.column(1)),
            };
            let len = norm(c);
            if len > 1e-12 { scale(c, 1.0 / len) } else { c }
        };
        for row in 0..3 {
            u.data[row][col] = c[row];
        }
    }

    Svd3x3 { u, vt: vectors.transpose() }
}

fn orthogonal_to(v: Vec3) -> Vec3 {
    let trial = if v[0].abs() < 0.9 { [1.0, 0.0, 0.0] } else { [0.0, 1.0, 0.0] };
    cross(v, trial)
}

/// Eigenvectors (as columns) and eigenvalues of a symmetric matrix, sorted
/// by descending eigenvalue.
pub(crate) fn symmetric_eigen(matrix: &Matrix3x3) -> (Matrix3x3, [f64; 3]) {
    let (vectors, values) = jacobi_eigenvalue(matrix);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let mut sorted_vectors = Matrix3x3::zeros();
    let mut sorted_values = [0.0; 3];
    for (col, &idx) in order.iter().enumerate() {
        sorted_values[col] = values[idx];
        for row in 0..3 {
            sorted_vectors.data[row][col] = vectors.data[row][idx];
        }
    }
    (sorted_vectors, sorted_values)
}

fn jacobi_eigenvalue(matrix: &Matrix3x3) -> (Matrix3x3, [f64; 3]) {
    let mut a = *matrix;
    let mut v = Matrix3x3::identity();
    let tol = 1e-15;

    for _ in 0..100 {
        let mut max_val = 0.0f64;
        let (mut p, mut q) = (0, 1);
        for i in 0..3 {
            for j in (i + 1)..3 {
                if a.data[i][j].abs() > max_val {
                    max_val = a.data[i][j].abs();
                    p = i;
                    q = j;
                }
            }
        }
        if max_val < tol {
            break;
        }

        let app = a.data[p][p];
        let aqq = a.data[q][q];
        let apq = a.data[p][q];
        let theta = if (app - aqq).abs() < tol {
            std::f64::consts::FRAC_PI_4
        } else {
            0.5 * (2.0 * apq / (app - aqq)).atan()
        };
        let (s, c) = theta.sin_cos();

        let mut next = a;
        for i in 0..3 {
            if i != p && i != q {
                let aip = a.data[i][p];
                let aiq = a.data[i][q];
                next.data[i][p] = c * aip + s * aiq;
                next.data[p][i] = next.data[i][p];
                next.data[i][q] = -s * aip + c * aiq;
                next.data[q][i] = next.data[i][q];
            }
        }
        next.data[p][p] = c * c * app + 2.0 * c * s * apq + s * s * aqq;
        next.data[q][q] = s * s * app - 2.0 * c * s * apq + c * c * aqq;
        next.data[p][q] = 0.0;
        next.data[q][p] = 0.0;
        a = next;

        for i in 0..3 {
            let vip = v.data[i][p];
            let viq = v.data[i][q];
            v.data[i][p] = c * vip + s * viq;
            v.data[i][q] = -s * vip + c * viq;
        }
    }

    (v, [a.data[0][0], a.data[1][1], a.data[2][2]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiply_identity() {
        let a = Matrix3x3 {
            data: [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
        };
        assert_eq!(a.multiply(&Matrix3x3::identity()), a);
        assert!((a.transpose().data[0][1] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn determinant() {
        let a = Matrix3x3 {
            data: [[1.0, 2.0, 3.0], [0.0, 1.0, 4.0], [5.0, 6.0, 0.0]],
        };
        assert!((a.determinant() - 1.0).abs() < 1e-10);
    }

    /// `Uᵀ · A · V`, diagonal when the factors are right.
    fn singular_values(a: &Matrix3x3, svd: &Svd3x3) -> Matrix3x3 {
        svd.u.transpose().multiply(a).multiply(&svd.vt.transpose())
    }

    #[test]
    fn svd_reconstructs_rotation() {
        let (s, c) = 0.5f64.sin_cos();
        let rot = Matrix3x3 {
            data: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
        };
        let svd = svd_3x3(&rot);
        let sigma = singular_values(&rot, &svd);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((sigma.data[i][j] - expected).abs() < 1e-6, "[{i}][{j}]");
            }
        }
    }

    #[test]
    fn svd_rank_one_has_orthonormal_u() {
        let m = Matrix3x3 {
            data: [[2.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
        };
        let svd = svd_3x3(&m);
        assert!((singular_values(&m, &svd).data[0][0] - 2.0).abs() < 1e-9);
        let det = svd.u.determinant().abs();
        assert!((det - 1.0).abs() < 1e-6, "det = {det}");
    }

    #[test]
    fn eigen_sorted_descending() {
        let m = Matrix3x3 {
            data: [[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]],
        };
        let (vectors, values) = symmetric_eigen(&m);
        assert_eq!(values, [5.0, 3.0, 1.0]);
        assert!((vectors.column(0)[1].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn geometry_helpers() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];
        assert!((angle(a, b, c) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        let d = [0.0, 1.0, 1.0];
        let phi = dihedral(a, b, c, d);
        assert!((phi.abs() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((distance(a, c) - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(centroid(&[a, c]), [0.5, 0.5, 0.0]);
    }
}
