//! GPU backend checked against the CPU backend.

#![cfg(feature = "gpu")]

use std::time::Duration;

use approx::assert_relative_eq;
use heightcut_path::{
    generate_path, generate_radial_path, GpuBackend, RadialParams, WorkerBackend,
};
use heightcut_raster::{build_sparse_tool, create_height_map_from_points, Aabb, SparseTool};

fn gpu() -> GpuBackend {
    GpuBackend::init(Duration::from_secs(30)).expect("GPU backend")
}

fn ball_tool(radius: i32, step: f32) -> SparseTool {
    let r = radius as f32;
    let mut pts = Vec::new();
    for y in -radius..=radius {
        for x in -radius..=radius {
            let r2 = (x * x + y * y) as f32;
            if r2 <= r * r {
                pts.extend_from_slice(&[
                    x as f32 * step,
                    y as f32 * step,
                    (r - (r * r - r2).sqrt()) * step,
                ]);
            }
        }
    }
    build_sparse_tool(&pts, step).unwrap()
}

#[test]
#[ignore = "requires GPU"]
fn test_planar_matches_cpu() {
    let mut pts = Vec::new();
    for y in 0..80 {
        for x in 0..96 {
            // Leave a hole so empty cells are exercised.
            if (30..40).contains(&x) && (20..28).contains(&y) {
                continue;
            }
            let z = (x as f32 * 0.2).sin() * 3.0 + (y as f32 * 0.15).cos() * 2.0;
            pts.extend_from_slice(&[x as f32, y as f32, z]);
        }
    }
    let terrain = create_height_map_from_points(&pts, 1.0, None).unwrap();
    let tool = ball_tool(4, 1.0);
    let bounds = Some(Aabb::new([-6.0, -6.0, 0.0], [101.0, 85.0, 0.0]));

    let cpu = generate_path(&WorkerBackend::new(4), &terrain, &tool, 1, 1, -50.0, bounds).unwrap();
    let gpu = generate_path(&gpu(), &terrain, &tool, 1, 1, -50.0, bounds).unwrap();

    assert_eq!(gpu.data.len(), cpu.data.len());
    for (g, c) in gpu.data.iter().zip(&cpu.data) {
        assert_relative_eq!(*g, *c, epsilon = 1e-5);
    }
}

/// Radial golden test: the GPU strip rasterizer and solver must agree with
/// the CPU reference at every angle.
#[test]
#[ignore = "requires GPU"]
fn test_radial_matches_cpu() {
    // Lumpy solid of revolution: radius varies along X and with angle.
    let facets = 72;
    let stations = 40;
    let at = |s: usize, i: usize| {
        let x = s as f32 * 0.25;
        let a = i as f32 / facets as f32 * std::f32::consts::TAU;
        let r = 4.0 + (x * 0.8).sin() + 0.5 * (3.0 * a).cos();
        [x, r * a.sin(), r * a.cos()]
    };
    let mut tris = Vec::new();
    for s in 0..stations {
        for i in 0..facets {
            let (a, b, c, d) = (at(s, i), at(s + 1, i), at(s + 1, i + 1), at(s, i + 1));
            for v in [a, b, c, a, c, d] {
                tris.extend_from_slice(&v);
            }
        }
    }

    let tool = ball_tool(3, 0.25);
    let params = RadialParams {
        angle_step_deg: 5.0,
        x_step: 2,
        z_floor: -30.0,
        grid_step: 0.25,
        bounds: None,
    };

    let cpu = generate_radial_path(&WorkerBackend::new(4), &tris, &tool, &params, &mut |_| {}).unwrap();
    let gpu = generate_radial_path(&gpu(), &tris, &tool, &params, &mut |_| {}).unwrap();

    assert_eq!((gpu.rotations, gpu.points_per_line), (cpu.rotations, cpu.points_per_line));
    for (g, c) in gpu.data.iter().zip(&cpu.data) {
        assert_relative_eq!(*g, *c, epsilon = 1e-3);
    }
}
