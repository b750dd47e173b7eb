use crate::config::Config;
use crate::grid::Grid;
use crate::partition::Band;




/**
 * Advance the interior of the owned rows by one explicit step of the 5-point
 * heat equation, reading only from `current` and writing only to `next`.
 * Ghost rows of `current` must already hold the neighbors' boundary rows.
 * The boundary columns of `next` are not written.
 */
pub fn diffuse(current: &Grid, next: &mut Grid, alpha: f64) {
    let n = current.cols();

    for i in current.owned_rows() {
        let up = current.row(i - 1);
        let mid = current.row(i);
        let down = current.row(i + 1);
        let out = next.row_mut(i);

        for j in 1..n - 1 {
            out[j] = mid[j] + alpha * (down[j] + up[j] + mid[j + 1] + mid[j - 1] - 4.0 * mid[j]);
        }
    }
}




/**
 * Re-impose the fixed conditions on `next` after the stencil pass: the heat
 * source is pinned first (if this band owns it), then both boundary columns
 * of every owned row are clamped.
 */
pub fn reapply(next: &mut Grid, band: &Band, config: &Config) {
    if let Some((i, j)) = band.source() {
        next.set(i, j, config.source_temp);
    }
    let last = next.cols() - 1;

    for i in next.owned_rows() {
        let row = next.row_mut(i);
        row[0] = config.boundary_temp;
        row[last] = config.boundary_temp;
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{diffuse, reapply};
    use crate::config::Config;
    use crate::grid::{Grid, UPPER_GHOST};
    use crate::partition::Band;

    #[test]
    fn uniform_field_is_a_fixed_point() {
        let mut current = Grid::new(3, 5, 7.0).unwrap();
        current.fill_row(UPPER_GHOST, 7.0);
        let lower = current.lower_ghost();
        current.fill_row(lower, 7.0);

        let mut next = Grid::new(3, 5, 0.0).unwrap();
        diffuse(&current, &mut next, 0.2);

        for i in next.owned_rows() {
            assert_eq!(&next.row(i)[1..4], &[7.0, 7.0, 7.0]);
            assert_eq!((next.get(i, 0), next.get(i, 4)), (0.0, 0.0));
        }
    }

    #[test]
    fn point_spike_spreads_to_its_four_neighbors() {
        let mut current = Grid::new(3, 5, 0.0).unwrap();
        current.fill_row(UPPER_GHOST, 0.0);
        let lower = current.lower_ghost();
        current.fill_row(lower, 0.0);
        current.set(2, 2, 100.0);

        let mut next = Grid::new(3, 5, 0.0).unwrap();
        diffuse(&current, &mut next, 0.1);

        assert!((next.get(2, 2) - 60.0).abs() < 1e-12);
        for &(i, j) in [(1, 2), (3, 2), (2, 1), (2, 3)].iter() {
            assert!((next.get(i, j) - 10.0).abs() < 1e-12);
        }
        assert_eq!(next.get(1, 1), 0.0);
    }

    #[test]
    fn ghost_rows_feed_the_edge_rows() {
        let mut current = Grid::new(1, 3, 0.0).unwrap();
        current.fill_row(UPPER_GHOST, 10.0);
        current.fill_row(2, 30.0);

        let mut next = Grid::new(1, 3, 0.0).unwrap();
        diffuse(&current, &mut next, 0.25);
        assert_eq!(next.get(1, 1), 10.0);
    }

    #[test]
    fn reapply_pins_source_and_clamps_columns() {
        let config = Config {
            grid_size: 4,
            boundary_temp: -1.0,
            source_temp: 50.0,
            ..Config::default()
        };
        let band = Band::new(0, 1, 4).unwrap();
        let mut next = Grid::new(4, 4, 3.0).unwrap();
        reapply(&mut next, &band, &config);

        assert_eq!(next.get(3, 2), 50.0);
        for i in next.owned_rows() {
            assert_eq!((next.get(i, 0), next.get(i, 3)), (-1.0, -1.0));
        }
        assert_eq!(next.get(1, 1), 3.0);
    }

    #[test]
    fn bands_without_the_source_are_only_clamped() {
        let config = Config { grid_size: 8, ..Config::default() };
        let band = Band::new(0, 2, 8).unwrap();
        let mut next = Grid::new(4, 8, 0.0).unwrap();
        reapply(&mut next, &band, &config);
        assert!(next.owned().iter().all(|&x| x == 0.0 || x == config.boundary_temp));
    }
}
