//! Structured, vertically staggered grid
//!
//! Scalars live at cell centers (full levels `z`), vertical velocity and
//! fluxes at cell faces (half levels `zh`). The horizontal plane is uniform
//! and periodic; the vertical spacing may be stretched. Ghost cells surround
//! the physical domain on every side: one layer for second-order spatial
//! discretization, two for fourth order.

use serde::{Deserialize, Serialize};

/// Order of the horizontal/vertical interpolation stencils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialOrder {
    /// Centered 2-point stencils, one ghost cell.
    Second,
    /// 4-point stencils with weights (−1, 9, 9, −1)/16, two ghost cells.
    Fourth,
}

impl SpatialOrder {
    /// Ghost-cell count on each side of the domain.
    #[must_use]
    pub fn ghost_cells(self) -> usize {
        match self {
            SpatialOrder::Second => 1,
            SpatialOrder::Fourth => 2,
        }
    }
}

/// Local grid of one worker process: the full vertical column plus a
/// horizontal sub-domain with ghost cells. `itot`/`jtot` carry the global
/// horizontal extent for cross-process area normalization.
#[derive(Debug, Clone)]
pub struct Grid {
    /// Interior cells in x on this process.
    pub imax: usize,
    /// Interior cells in y on this process.
    pub jmax: usize,
    /// Interior cells in z (full column on every process).
    pub kmax: usize,
    /// Global interior cells in x.
    pub itot: usize,
    /// Global interior cells in y.
    pub jtot: usize,

    /// Ghost cells per side in x, y, z.
    pub igc: usize,
    /// Ghost cells per side in y.
    pub jgc: usize,
    /// Ghost cells per side in z.
    pub kgc: usize,

    /// Total cells in x including ghosts.
    pub icells: usize,
    /// Total cells in y including ghosts.
    pub jcells: usize,
    /// Total cells in z including ghosts.
    pub kcells: usize,
    /// Cells per horizontal plane, `icells * jcells`.
    pub ijcells: usize,

    /// First interior index in x.
    pub istart: usize,
    /// One past the last interior index in x.
    pub iend: usize,
    /// First interior index in y.
    pub jstart: usize,
    /// One past the last interior index in y.
    pub jend: usize,
    /// First interior index in z.
    pub kstart: usize,
    /// One past the last interior index in z.
    pub kend: usize,

    /// Domain height (m).
    pub zsize: f64,
    /// Horizontal grid spacing in x (m).
    pub dx: f64,
    /// Horizontal grid spacing in y (m).
    pub dy: f64,
    /// Inverse horizontal spacing in x.
    pub dxi: f64,
    /// Inverse horizontal spacing in y.
    pub dyi: f64,

    /// Full-level heights, length `kcells`.
    pub z: Vec<f64>,
    /// Half-level heights; `zh[k]` is the bottom face of cell `k`.
    pub zh: Vec<f64>,
    /// Full-level spacing `zh[k+1] − zh[k]`.
    pub dz: Vec<f64>,
    /// Half-level spacing `z[k] − z[k−1]`.
    pub dzh: Vec<f64>,
    /// Inverse of `dz`.
    pub dzi: Vec<f64>,
    /// Inverse of `dzh`.
    pub dzhi: Vec<f64>,

    /// Stencil order used throughout the closure.
    pub order: SpatialOrder,
}

impl Grid {
    /// Build a grid with uniform vertical spacing.
    ///
    /// # Arguments
    ///
    /// * `imax`, `jmax` - interior horizontal cells on this process
    /// * `kmax` - interior vertical cells
    /// * `xsize`, `ysize`, `zsize` - physical domain extents (m)
    /// * `order` - spatial stencil order
    #[must_use]
    pub fn uniform(
        imax: usize,
        jmax: usize,
        kmax: usize,
        xsize: f64,
        ysize: f64,
        zsize: f64,
        order: SpatialOrder,
    ) -> Self {
        let dz0 = zsize / kmax as f64;
        let z_interior: Vec<f64> = (0..kmax).map(|k| (k as f64 + 0.5) * dz0).collect();
        Self::from_levels(imax, jmax, &z_interior, xsize, ysize, zsize, order)
    }

    /// Build a grid from interior full-level heights, ascending and strictly
    /// inside `(0, zsize)`. Ghost levels are filled by mirror extrapolation
    /// around the surface and the domain top.
    ///
    /// # Panics
    ///
    /// Panics if `z_interior` is empty, not ascending, or reaches outside
    /// the domain. Grid construction happens once at setup; a malformed
    /// height profile is a configuration bug, not a runtime condition.
    #[must_use]
    pub fn from_levels(
        imax: usize,
        jmax: usize,
        z_interior: &[f64],
        xsize: f64,
        ysize: f64,
        zsize: f64,
        order: SpatialOrder,
    ) -> Self {
        let kmax = z_interior.len();
        assert!(kmax >= 2, "at least two interior levels required");
        assert!(
            z_interior.windows(2).all(|w| w[0] < w[1]),
            "full-level heights must be strictly ascending"
        );
        assert!(
            z_interior[0] > 0.0 && z_interior[kmax - 1] < zsize,
            "full-level heights must lie inside (0, zsize)"
        );

        let gc = order.ghost_cells();
        let (igc, jgc, kgc) = (gc, gc, gc);
        let icells = imax + 2 * igc;
        let jcells = jmax + 2 * jgc;
        let kcells = kmax + 2 * kgc;
        let (istart, jstart, kstart) = (igc, jgc, kgc);
        let (iend, jend, kend) = (imax + igc, jmax + jgc, kmax + kgc);

        let mut z = vec![0.0; kcells];
        z[kstart..kend].copy_from_slice(z_interior);
        for g in 1..=kgc {
            z[kstart - g] = -z[kstart + g - 1];
            z[kend + g - 1] = 2.0 * zsize - z[kend - g];
        }

        let mut zh = vec![0.0; kcells];
        zh[kstart] = 0.0;
        for k in kstart + 1..kend {
            zh[k] = 0.5 * (z[k - 1] + z[k]);
        }
        if kend < kcells {
            zh[kend] = zsize;
        }
        for g in 1..=kgc {
            zh[kstart - g] = -zh[kstart + g];
            let idx = kend + g;
            if idx < kcells {
                zh[idx] = 2.0 * zsize - zh[kend - g];
            }
        }

        let mut dzh = vec![0.0; kcells];
        for k in 1..kcells {
            dzh[k] = z[k] - z[k - 1];
        }
        dzh[0] = dzh[1];

        let mut dz = vec![0.0; kcells];
        for k in kstart..kend {
            dz[k] = zh[k + 1] - zh[k];
        }
        for g in 1..=kgc {
            dz[kstart - g] = dz[kstart + g - 1];
            let idx = kend + g - 1;
            if idx < kcells {
                dz[idx] = dz[kend - g];
            }
        }

        let dzi = dz.iter().map(|&d| if d > 0.0 { 1.0 / d } else { 0.0 }).collect();
        let dzhi = dzh.iter().map(|&d| if d > 0.0 { 1.0 / d } else { 0.0 }).collect();

        let dx = xsize / imax as f64;
        let dy = ysize / jmax as f64;

        Self {
            imax,
            jmax,
            kmax,
            itot: imax,
            jtot: jmax,
            igc,
            jgc,
            kgc,
            icells,
            jcells,
            kcells,
            ijcells: icells * jcells,
            istart,
            iend,
            jstart,
            jend,
            kstart,
            kend,
            zsize,
            dx,
            dy,
            dxi: 1.0 / dx,
            dyi: 1.0 / dy,
            z,
            zh,
            dz,
            dzh,
            dzi,
            dzhi,
            order,
        }
    }

    /// Flat index of cell (i, j, k), i fastest.
    #[inline]
    #[must_use]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.icells + k * self.ijcells
    }

    /// Flat index within one horizontal plane.
    #[inline]
    #[must_use]
    pub fn ij(&self, i: usize, j: usize) -> usize {
        i + j * self.icells
    }

    /// Global interior cell count of one horizontal plane.
    #[inline]
    #[must_use]
    pub fn ijtot(&self) -> f64 {
        (self.itot * self.jtot) as f64
    }
}
