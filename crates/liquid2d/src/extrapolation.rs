//! Layered extrapolation of sample values into the unknown region.
//!
//! Layer by layer, every sample without a value takes the average of its
//! Finished 4-neighbours. Each layer reads a snapshot of the previous one,
//! so a value travels at most one sample per layer.

use crate::error::Result;
use crate::grid::{Grid, MarkedCell, VectorGrid};

const NEIGHBOURS: [[isize; 2]; 4] = [[-1, 0], [1, 0], [0, -1], [0, 1]];

/// Extend `field` outward from its Finished samples by `floor(bandwidth)`
/// layers. Samples reached are marked Finished; samples more than
/// `bandwidth` steps from any Finished sample keep their value and marker.
pub fn extrapolate_field(
    field: &mut Grid<f64>,
    valid: &mut Grid<MarkedCell>,
    bandwidth: f64,
) -> Result<()> {
    field.check_layout(valid, "extrapolation validity")?;
    let layers = bandwidth.max(0.0).floor() as usize;
    let [nx, ny] = field.size();

    for _ in 0..layers {
        let values = field.clone();
        let marks = valid.clone();

        // (new value, newly finished) for every sample, from the snapshot.
        let mut layer = field.like((0.0, false));
        layer.par_fill_with(|[i, j]| {
            if marks[[i, j]] == MarkedCell::Finished {
                return (values[[i, j]], false);
            }
            let mut sum = 0.0;
            let mut count = 0usize;
            for [di, dj] in NEIGHBOURS {
                let (ni, nj) = (i as isize + di, j as isize + dj);
                if ni < 0 || nj < 0 || ni >= nx as isize || nj >= ny as isize {
                    continue;
                }
                let neighbour = [ni as usize, nj as usize];
                if marks[neighbour] == MarkedCell::Finished {
                    sum += values[neighbour];
                    count += 1;
                }
            }
            if count > 0 {
                (sum / count as f64, true)
            } else {
                (values[[i, j]], false)
            }
        });

        let mut grew = false;
        for ((value, mark), &(new_value, reached)) in field
            .values_mut()
            .iter_mut()
            .zip(valid.values_mut())
            .zip(layer.values())
        {
            if reached {
                *value = new_value;
                *mark = MarkedCell::Finished;
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    Ok(())
}

/// Per-component extrapolation of a vector field.
pub fn extrapolate_vector_field(
    field: &mut VectorGrid<f64>,
    valid: &mut VectorGrid<MarkedCell>,
    bandwidth: f64,
) -> Result<()> {
    field.check_layout(valid, "extrapolation validity")?;
    for axis in 0..2 {
        extrapolate_field(field.grid_mut(axis), valid.grid_mut(axis), bandwidth)?;
    }
    Ok(())
}
