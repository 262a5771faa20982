//! Cross-section output of thermodynamic quantities
//!
//! Requested cross variables are validated once at setup: unknown names are
//! dropped with a warning and the run continues with the cleaned list. The
//! actual I/O backend sits behind [`CrossSink`] so the closure only produces
//! the data.

use tracing::warn;

use crate::error::CrossError;
use crate::grid::{Grid, SpatialOrder};

/// Cross variables the closure can produce at a given spatial order.
///
/// The log-gradient field needs the wide stencils of the 4th-order scheme.
#[must_use]
pub fn allowed_cross_vars(order: SpatialOrder) -> &'static [&'static str] {
    match order {
        SpatialOrder::Second => &["b", "bbot", "bfluxbot", "ql", "qlpath"],
        SpatialOrder::Fourth => &["b", "bbot", "bfluxbot", "blngrad", "ql", "qlpath"],
    }
}

/// Filter a requested cross list down to the supported variables.
///
/// Unknown names are logged and dropped, duplicates are kept once, and the
/// result is sorted. The input list is never mutated in place.
#[must_use]
pub fn validate_cross_list(requested: &[String], order: SpatialOrder) -> Vec<String> {
    let allowed = allowed_cross_vars(order);
    let mut accepted: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        if !allowed.contains(&name.as_str()) {
            warn!(var = %name, "dropping unsupported cross variable");
            continue;
        }
        if accepted.iter().any(|a| a == name) {
            continue;
        }
        accepted.push(name.clone());
    }
    accepted.sort();
    accepted
}

/// Backend that receives produced cross-section data.
pub trait CrossSink {
    /// Store a full 3D field under the given variable name.
    ///
    /// # Errors
    ///
    /// Returns a [`CrossError`] when the backend cannot store the field.
    fn write_volume(&mut self, name: &str, data: &[f64], grid: &Grid) -> Result<(), CrossError>;

    /// Store a horizontal plane (length `ijcells`) under the given name.
    ///
    /// # Errors
    ///
    /// Returns a [`CrossError`] when the backend cannot store the plane.
    fn write_plane(&mut self, name: &str, data: &[f64], grid: &Grid) -> Result<(), CrossError>;
}

/// Column-integrated path `∫ρ·q·dz` as a horizontal plane.
pub fn calc_path_plane(out: &mut [f64], data: &[f64], rhoref: &[f64], grid: &Grid) {
    out.fill(0.0);
    for k in grid.kstart..grid.kend {
        let weight = rhoref[k] * grid.dz[k];
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells;
            for i in grid.istart..grid.iend {
                out[base + i] += weight * data[base + i + k * grid.ijcells];
            }
        }
    }
}

/// Base-10 logarithm of the squared gradient magnitude, 4th-order central
/// differences in all three directions. Brings out fine-scale structure in
/// visualizations the way a schlieren image does.
pub fn calc_lngrad(out: &mut [f64], data: &[f64], grid: &Grid) {
    let ii = 1;
    let jj = grid.icells;
    let kk = grid.ijcells;
    for k in grid.kstart..grid.kend {
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = i + j * jj + k * kk;
                let dx = (data[ijk - 2 * ii] - 8.0 * data[ijk - ii] + 8.0 * data[ijk + ii]
                    - data[ijk + 2 * ii])
                    * grid.dxi
                    / 12.0;
                let dy = (data[ijk - 2 * jj] - 8.0 * data[ijk - jj] + 8.0 * data[ijk + jj]
                    - data[ijk + 2 * jj])
                    * grid.dyi
                    / 12.0;
                let dz = (data[ijk - 2 * kk] - 8.0 * data[ijk - kk] + 8.0 * data[ijk + kk]
                    - data[ijk + 2 * kk])
                    * grid.dzi[k]
                    / 12.0;
                let grad2 = (dx * dx + dy * dy + dz * dz).max(f64::MIN_POSITIVE);
                out[ijk] = grad2.log10();
            }
        }
    }
}

/// In-memory sink, for tests and headless runs without an output backend.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Stored 3D fields keyed by variable name.
    pub volumes: rustc_hash::FxHashMap<String, Vec<f64>>,
    /// Stored horizontal planes keyed by variable name.
    pub planes: rustc_hash::FxHashMap<String, Vec<f64>>,
}

impl CrossSink for MemorySink {
    fn write_volume(&mut self, name: &str, data: &[f64], _grid: &Grid) -> Result<(), CrossError> {
        self.volumes.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn write_plane(&mut self, name: &str, data: &[f64], _grid: &Grid) -> Result<(), CrossError> {
        self.planes.insert(name.to_string(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn unknown_names_are_dropped_and_the_rest_sorted() {
        let list = strs(&["ql", "vorticity", "b", "qlpath"]);
        let cleaned = validate_cross_list(&list, SpatialOrder::Second);
        assert_eq!(cleaned, strs(&["b", "ql", "qlpath"]));
    }

    #[test]
    fn lngrad_needs_fourth_order() {
        let list = strs(&["blngrad"]);
        assert!(validate_cross_list(&list, SpatialOrder::Second).is_empty());
        assert_eq!(
            validate_cross_list(&list, SpatialOrder::Fourth),
            strs(&["blngrad"])
        );
    }

    #[test]
    fn duplicates_collapse_to_one() {
        let list = strs(&["b", "b", "ql", "b"]);
        let cleaned = validate_cross_list(&list, SpatialOrder::Second);
        assert_eq!(cleaned, strs(&["b", "ql"]));
    }

    #[test]
    fn path_plane_integrates_each_column() {
        let grid = Grid::uniform(4, 4, 5, 400.0, 400.0, 500.0, SpatialOrder::Second);
        let mut data = vec![0.0; grid.ijcells * grid.kcells];
        let (i, j) = (grid.istart + 1, grid.jstart + 2);
        for k in grid.kstart..grid.kend {
            data[grid.idx(i, j, k)] = 2.0e-3;
        }
        let rho = vec![1.2; grid.kcells];
        let mut plane = vec![0.0; grid.ijcells];
        calc_path_plane(&mut plane, &data, &rho, &grid);
        let expected = 1.2 * 2.0e-3 * 500.0;
        assert!((plane[grid.ij(i, j)] - expected).abs() < 1e-12);
        assert_eq!(plane[grid.ij(grid.istart, grid.jstart)], 0.0);
    }

    #[test]
    fn lngrad_flags_the_sharp_edge() {
        let grid = Grid::uniform(8, 8, 8, 800.0, 800.0, 800.0, SpatialOrder::Fourth);
        let n = grid.ijcells * grid.kcells;
        // Step in x halfway through the domain.
        let mut data = vec![0.0; n];
        for k in 0..grid.kcells {
            for j in 0..grid.jcells {
                for i in grid.istart + 4..grid.icells {
                    data[grid.idx(i, j, k)] = 1.0;
                }
            }
        }
        let mut out = vec![0.0; n];
        calc_lngrad(&mut out, &data, &grid);
        let at_edge = out[grid.idx(grid.istart + 4, grid.jstart + 4, grid.kstart + 4)];
        let far_away = out[grid.idx(grid.istart + 1, grid.jstart + 4, grid.kstart + 4)];
        assert!(at_edge > far_away);
    }

    #[test]
    fn memory_sink_round_trip() {
        let grid = Grid::uniform(2, 2, 2, 200.0, 200.0, 200.0, SpatialOrder::Second);
        let mut sink = MemorySink::default();
        let plane = vec![1.0; grid.ijcells];
        sink.write_plane("qlpath", &plane, &grid).unwrap();
        assert_eq!(sink.planes["qlpath"], plane);
    }
}
