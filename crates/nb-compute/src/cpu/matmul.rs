//! Row-partitioned matrix product.
//!
//! Output rows are independent, so they are split into contiguous bands and
//! each band is computed on its own scoped thread. Every element is summed in
//! the same order as the single-threaded path, which keeps results
//! bit-identical across thread counts.

/// Below this many multiply-adds the product runs on the calling thread.
pub const PARALLEL_THRESHOLD: usize = 1 << 16;

/// Compute rows `row_start..row_start + out.len() / n` of `a @ b` into `out`.
fn matmul_rows(a: &[f32], b: &[f32], k: usize, n: usize, row_start: usize, out: &mut [f32]) {
    let rows = out.len() / n;
    for r in 0..rows {
        let i = row_start + r;
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let mut sum = 0.0f32;
            for (p, &a_ip) in a_row.iter().enumerate() {
                sum += a_ip * b[p * n + j];
            }
            out[r * n + j] = sum;
        }
    }
}

/// `a` is [m, k], `b` is [k, n]; lengths must already be validated.
pub fn matmul_parallel(
    a: &[f32],
    b: &[f32],
    m: usize,
    k: usize,
    n: usize,
    n_threads: usize,
) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    if m == 0 || n == 0 {
        return c;
    }

    let threads = n_threads.clamp(1, m);
    if threads == 1 || m * k * n < PARALLEL_THRESHOLD {
        matmul_rows(a, b, k, n, 0, &mut c);
        return c;
    }

    let rows_per_band = m.div_ceil(threads);
    std::thread::scope(|scope| {
        for (band, out) in c.chunks_mut(rows_per_band * n).enumerate() {
            scope.spawn(move || matmul_rows(a, b, k, n, band * rows_per_band, out));
        }
    });
    c
}
