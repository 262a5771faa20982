use clap::Parser;
use stratus_core::{
    Fields, Grid, MaskType, MemorySink, Serial, SpatialOrder, Statistics, ThermoConfig,
    ThermoMoist,
};

/// Rising moist thermal demo with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "stratus-demo")]
#[command(about = "Moist thermal demo of the thermodynamics closure", long_about = None)]
struct Args {
    /// Horizontal grid cells in x
    #[arg(long, default_value_t = 32)]
    imax: usize,

    /// Horizontal grid cells in y
    #[arg(long, default_value_t = 32)]
    jmax: usize,

    /// Vertical grid cells
    #[arg(long, default_value_t = 64)]
    kmax: usize,

    /// Domain size in x (m)
    #[arg(long, default_value_t = 3200.0)]
    xsize: f64,

    /// Domain size in y (m)
    #[arg(long, default_value_t = 3200.0)]
    ysize: f64,

    /// Domain height (m)
    #[arg(long, default_value_t = 3200.0)]
    zsize: f64,

    /// Spatial order of the advection scheme (2 or 4)
    #[arg(short, long, default_value_t = 2)]
    order: u8,

    /// Surface pressure (Pa)
    #[arg(long, default_value_t = 1.0e5)]
    ps: f64,

    /// Surface liquid-water potential temperature (K)
    #[arg(long, default_value_t = 299.0)]
    thl_surface: f64,

    /// Lapse rate of thl (K/m)
    #[arg(long, default_value_t = 0.004)]
    thl_lapse: f64,

    /// Surface total water mixing ratio (kg/kg)
    #[arg(long, default_value_t = 0.016)]
    qt_surface: f64,

    /// Drying rate of qt with height (kg/kg per m)
    #[arg(long, default_value_t = 3.0e-6)]
    qt_lapse: f64,

    /// Thermal perturbation amplitude (K)
    #[arg(long, default_value_t = 2.0)]
    bubble_amplitude: f64,

    /// Thermal radius (m)
    #[arg(long, default_value_t = 500.0)]
    bubble_radius: f64,

    /// Number of time steps
    #[arg(short, long, default_value_t = 120)]
    steps: usize,

    /// Time step (s)
    #[arg(long, default_value_t = 5.0)]
    dt: f64,

    /// Refresh the base-state pressure every step
    #[arg(long)]
    update_base_state: bool,

    /// Report interval in steps
    #[arg(short, long, default_value_t = 20)]
    report_interval: usize,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    println!("=== Moist Thermal Demo ===\n");

    let order = match args.order {
        4 => SpatialOrder::Fourth,
        _ => SpatialOrder::Second,
    };
    let grid = Grid::uniform(
        args.imax, args.jmax, args.kmax, args.xsize, args.ysize, args.zsize, order,
    );
    println!(
        "Grid: {}x{}x{} over {:.0}x{:.0}x{:.0} m, {:?} order",
        args.imax, args.jmax, args.kmax, args.xsize, args.ysize, args.zsize, order
    );

    // Initial soundings: weakly stable and drying with height.
    let mut thl_prof = Vec::with_capacity(grid.kmax);
    let mut qt_prof = Vec::with_capacity(grid.kmax);
    for k in 0..grid.kmax {
        let z = grid.z[grid.kstart + k];
        thl_prof.push(args.thl_surface + args.thl_lapse * z);
        qt_prof.push((args.qt_surface - args.qt_lapse * z).max(0.0));
    }

    let mut fields = Fields::new(&grid);
    let config = ThermoConfig {
        ps: args.ps,
        update_base_state: args.update_base_state,
        crosslist: vec!["ql".to_string(), "qlpath".to_string(), "bbot".to_string()],
        thl_diffusivity: 1.0e-5,
        qt_diffusivity: 1.0e-5,
    };
    let ctx = Serial;
    let mut thermo = match ThermoMoist::new(&config, &grid, &mut fields, &thl_prof, &qt_prof) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("initialization failed: {e}");
            std::process::exit(1);
        }
    };
    println!(
        "Base state: p({:.0} m) = {:.0} Pa, surface density {:.3} kg/m3",
        grid.z[grid.kend - 1],
        thermo.base().pref[grid.kend - 1],
        fields.rhorefh[grid.kstart]
    );

    // Fill the scalar fields from the extended soundings, ghost cells
    // included, then drop a warm moist bubble on the center of the domain.
    for k in 0..grid.kcells {
        fields.thl.data[k * grid.ijcells..(k + 1) * grid.ijcells].fill(thermo.base().thl0[k]);
        fields.qt.data[k * grid.ijcells..(k + 1) * grid.ijcells].fill(thermo.base().qt0[k]);
    }
    let (xc, yc, zc) = (args.xsize / 2.0, args.ysize / 2.0, args.bubble_radius);
    for k in grid.kstart..grid.kend {
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let x = (i - grid.istart) as f64 * grid.dx + 0.5 * grid.dx;
                let y = (j - grid.jstart) as f64 * grid.dy + 0.5 * grid.dy;
                let r = ((x - xc).powi(2) + (y - yc).powi(2) + (grid.z[k] - zc).powi(2)).sqrt();
                if r < args.bubble_radius {
                    let shape = (std::f64::consts::FRAC_PI_2 * r / args.bubble_radius).cos();
                    let idx = grid.idx(i, j, k);
                    fields.thl.data[idx] += args.bubble_amplitude * shape * shape;
                    fields.qt.data[idx] += 2.0e-3 * shape * shape;
                }
            }
        }
    }

    let mut stats = Statistics::new(&grid);
    thermo.register_stats(&mut stats, &fields);

    println!("\nRunning {} steps of {:.1} s...\n", args.steps, args.dt);
    for step in 1..=args.steps {
        fields.wt.data.fill(0.0);
        if let Err(e) = thermo.exec(&mut fields, &grid, &ctx) {
            eprintln!("step {step} failed: {e}");
            std::process::exit(1);
        }
        // Buoyancy-only toy integration of the vertical velocity.
        for (w, wt) in fields.w.data.iter_mut().zip(fields.wt.data.iter()) {
            *w += wt * args.dt;
        }

        if step % args.report_interval == 0 || step == args.steps {
            if let Err(e) = report(&thermo, &mut stats, &mut fields, &grid, &ctx, step) {
                eprintln!("statistics failed at step {step}: {e}");
                std::process::exit(1);
            }
        }
    }

    // Final cross sections into the in-memory sink.
    let mut sink = MemorySink::default();
    if let Err(e) = thermo.exec_cross(&mut sink, &mut fields, &grid, &ctx) {
        eprintln!("cross-section extraction failed: {e}");
        std::process::exit(1);
    }
    let lwp_max = sink
        .planes
        .get("qlpath")
        .map_or(0.0, |p| p.iter().copied().fold(0.0, f64::max));
    println!("\nCross sections written: {:?}", thermo.crosslist());
    println!("Peak liquid water path: {lwp_max:.4} kg/m2");
}

fn report(
    thermo: &ThermoMoist,
    stats: &mut Statistics,
    fields: &mut Fields,
    grid: &Grid,
    ctx: &Serial,
    step: usize,
) -> Result<(), stratus_core::ThermoError> {
    // Domain-wide statistics first, then conditioned on the cloud mask.
    stats.set_full_mask(grid);
    thermo.exec_stats(stats, fields, None, grid, ctx)?;
    let wmax = fields.w.data.iter().copied().fold(0.0, f64::max);
    let lwp = stats.tseries("lwp").map_or(0.0, |t| t.value);
    let ccover = stats.tseries("ccover").map_or(0.0, |t| t.value);
    println!(
        "step {step:>5}: w_max = {wmax:7.3} m/s, lwp = {lwp:8.5} kg/m2, cover = {ccover:5.3}"
    );

    if ccover > 0.0 {
        thermo.mask(MaskType::Ql, stats, fields, grid, ctx)?;
        thermo.exec_stats(stats, fields, None, grid, ctx)?;
        if let Some(b) = stats.prof("b") {
            let bmax = b.data.iter().copied().fold(f64::MIN, f64::max);
            println!("             in-cloud buoyancy max = {bmax:.4} m/s2");
        }
    }
    Ok(())
}
