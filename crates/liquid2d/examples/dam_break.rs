//! Headless dam break.
//!
//! A block of liquid collapses under gravity onto a small step. Each frame
//! is split into CFL-limited substeps and a coarse ASCII view is printed.
//!
//! Run with: RUST_LOG=liquid2d=debug cargo run --release --example dam_break

use glam::DVec2;
use liquid2d::{EulerianLiquid, LevelSet, LiquidConfig, Transform};

const CELLS: [usize; 2] = [64, 48];
const DX: f64 = 1.0 / 32.0;
const FRAMES: usize = 40;
const FRAME_TIME: f64 = 1.0 / 30.0;
const GRAVITY: DVec2 = DVec2::new(0.0, -9.8);

fn render(sim: &EulerianLiquid) -> String {
    let mut out = String::new();
    for j in (0..CELLS[1]).rev().step_by(3) {
        for i in (0..CELLS[0]).step_by(2) {
            let cell = [i, j];
            let c = if sim.solid_surface()[cell] <= 0.0 {
                '#'
            } else if sim.liquid_surface()[cell] < 0.0 {
                '~'
            } else {
                ' '
            };
            out.push(c);
        }
        out.push('\n');
    }
    out
}

fn main() -> liquid2d::Result<()> {
    env_logger::init();

    let xform = Transform::new(DX, DVec2::ZERO)?;
    let config = LiquidConfig::default();
    let cfl = config.cfl;
    let mut sim = EulerianLiquid::new(xform, CELLS, config)?;

    let mut step = LevelSet::from_fn(xform, CELLS, |p| (p.y - 0.15).max((p.x - 1.4).abs() - 0.1));
    step.set_inverted();
    sim.set_solid_surface(&step)?;
    sim.set_liquid_surface(&LevelSet::from_fn(xform, CELLS, |p| (p.x - 0.6).max(p.y - 0.9)));

    for frame in 0..FRAMES {
        let mut elapsed = 0.0;
        let mut substeps = 0;
        while elapsed < FRAME_TIME {
            let dt = sim.max_timestep().min(FRAME_TIME - elapsed).min(cfl * DX / 9.8);
            sim.add_uniform_force(dt, GRAVITY);
            sim.run_timestep(dt)?;
            elapsed += dt;
            substeps += 1;
        }
        let area = sim.liquid_cell_count() as f64 * DX * DX;
        println!(
            "frame {:3}: {} substeps, liquid area {:.4}, max speed {:.3}",
            frame,
            substeps,
            area,
            sim.velocity().max_magnitude()
        );
    }

    println!("{}", render(&sim));
    Ok(())
}
