//! A non-distributed solver for the same problem: the whole grid in one
//! buffer, with the region beyond the first and last rows held at the
//! boundary temperature. Rows are updated in parallel on the Rayon global
//! pool. Used to check the distributed run cell for cell.

use rayon::prelude::*;

use crate::aggregate::Snapshot;
use crate::config::Config;
use crate::error::Result;

/// Run `config.steps` steps on a single grid and return the final field.
pub fn simulate(config: &Config) -> Result<Snapshot> {
    config.validate()?;

    let n = config.grid_size;
    let (si, sj) = config.source();
    let at = |i: usize, j: usize| (i + 1) * n + j;

    let mut current = vec![config.boundary_temp; (n + 2) * n];
    for x in &mut current[n..(n + 1) * n] {
        *x = config.initial_temp;
    }
    current[at(si, sj)] = config.source_temp;
    let mut next = current.clone();

    for _ in 0..config.steps {
        let alpha = config.alpha;
        let prev = &current;

        next[n..(n + 1) * n]
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, out)| {
                let up = &prev[i * n..(i + 1) * n];
                let mid = &prev[(i + 1) * n..(i + 2) * n];
                let down = &prev[(i + 2) * n..(i + 3) * n];

                for j in 1..n - 1 {
                    out[j] = mid[j]
                        + alpha * (down[j] + up[j] + mid[j + 1] + mid[j - 1] - 4.0 * mid[j]);
                }
                out[0] = config.boundary_temp;
                out[n - 1] = config.boundary_temp;
            });
        next[at(si, sj)] = config.source_temp;

        std::mem::swap(&mut current, &mut next);
    }
    Snapshot::new(n, n, current[n..(n + 1) * n].to_vec())
}
