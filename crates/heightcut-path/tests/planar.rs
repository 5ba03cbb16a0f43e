//! End-to-end planar generation on the CPU backend.

use approx::assert_relative_eq;
use heightcut_path::{
    generate_path, PathError, PathGenerator, PathSettings, TerrainSource, TilingConfig,
    WorkerBackend,
};
use heightcut_raster::{
    build_sparse_tool, create_height_map_from_points, lattice_for, rasterize, Aabb, FaceFilter,
    HeightMap, Mesh, SparseTool,
};

fn settings() -> PathSettings {
    PathSettings {
        grid_step: 1.0,
        x_step: 1,
        y_step: 1,
        angle_step_deg: 15.0,
        oob_z: -100.0,
        tiling: TilingConfig {
            memory_budget_bytes: 64 << 20,
            safety_margin: 0.8,
            min_tile_size: 4,
            auto_tiling: true,
        },
        workers: 4,
        readback_timeout_ms: 10_000,
    }
}

/// Two upward triangles covering [x0, x1] x [y0, y1] at height `z`.
fn plane(x0: f32, y0: f32, x1: f32, y1: f32, z: f32) -> Vec<f32> {
    vec![
        x0, y0, z, x1, y0, z, x1, y1, z, //
        x0, y0, z, x1, y1, z, x0, y1, z,
    ]
}

/// Upward-facing height field mesh over an n x n lattice of unit cells.
fn wavy_mesh(n: usize) -> Vec<f32> {
    let z = |x: usize, y: usize| ((x as f32 * 0.45).sin() * 1.5 + (y as f32 * 0.3).cos()) * 2.0;
    let v = |x: usize, y: usize| [x as f32, y as f32, z(x, y)];
    let mut tris = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let (a, b, c, d) = (v(x, y), v(x + 1, y), v(x + 1, y + 1), v(x, y + 1));
            for p in [a, b, c, a, c, d] {
                tris.extend_from_slice(&p);
            }
        }
    }
    tris
}

fn point_tool() -> SparseTool {
    build_sparse_tool(&[0.0, 0.0, 0.0], 1.0).unwrap()
}

fn ball_tool(radius: i32) -> SparseTool {
    let r = radius as f32;
    let mut pts = Vec::new();
    for y in -radius..=radius {
        for x in -radius..=radius {
            let r2 = (x * x + y * y) as f32;
            if r2 <= r * r {
                pts.extend_from_slice(&[x as f32, y as f32, r - (r * r - r2).sqrt()]);
            }
        }
    }
    build_sparse_tool(&pts, 1.0).unwrap()
}

fn terrain_map(triangles: &[f32]) -> HeightMap {
    let raster = rasterize(triangles, 1.0, FaceFilter::UpwardFacing, None).unwrap();
    create_height_map_from_points(&raster.points, 1.0, raster.bounds).unwrap()
}

#[test]
fn test_plane_at_five_with_point_tool() {
    let terrain = terrain_map(&plane(0.0, 0.0, 10.0, 10.0, 5.0));
    assert_eq!((terrain.width(), terrain.height()), (11, 11));

    let path = generate_path(&WorkerBackend::new(4), &terrain, &point_tool(), 1, 1, -100.0, None).unwrap();
    assert_eq!((path.points_per_line, path.scanlines), (11, 11));
    assert!(path.data.iter().all(|&z| z == 5.0));
}

#[test]
fn test_flat_tool_on_flat_terrain() {
    let terrain = terrain_map(&plane(0.0, 0.0, 10.0, 10.0, 0.0));
    let mut pts = Vec::new();
    for y in -2..=2 {
        for x in -2..=2 {
            pts.extend_from_slice(&[x as f32, y as f32, 0.0]);
        }
    }
    let tool = build_sparse_tool(&pts, 1.0).unwrap();
    // Scan two cells further than the tool can reach on every side.
    let bounds = Aabb::new([-4.0, -4.0, 0.0], [14.0, 14.0, 0.0]);
    let path = generate_path(&WorkerBackend::new(2), &terrain, &tool, 1, 1, -100.0, Some(bounds)).unwrap();

    assert_eq!(path.points_per_line, 19);
    for j in 0..path.scanlines {
        for i in 0..path.points_per_line {
            let (x, y) = (i as i64 - 4, j as i64 - 4);
            let reaches = (-2..=12).contains(&x) && (-2..=12).contains(&y);
            let expected = if reaches { 0.0 } else { -100.0 };
            assert_eq!(path.get(i, j), Some(expected), "at ({x}, {y})");
        }
    }
}

#[test]
fn test_no_contact_returns_oob_exactly() {
    let terrain = terrain_map(&plane(0.0, 0.0, 4.0, 4.0, 2.0));
    let bounds = Aabb::new([20.0, 20.0, 0.0], [30.0, 25.0, 0.0]);
    let oob = -123.456f32;
    let path = generate_path(&WorkerBackend::new(3), &terrain, &ball_tool(2), 2, 2, oob, Some(bounds)).unwrap();
    assert!(!path.is_empty());
    assert!(path.data.iter().all(|z| z.to_bits() == oob.to_bits()));
}

#[test]
fn test_sparse_tool_within_dense_grid() {
    for radius in [1, 3, 6] {
        let tool = ball_tool(radius);
        assert!(tool.count() <= tool.dense_cells());
        assert!(tool.count() < tool.dense_cells());
        let (rx, ry) = tool.reach();
        assert!(rx <= tool.grid_width() / 2 && ry <= tool.grid_height() / 2);
    }
}

#[test]
fn test_monotonic_floor_end_to_end() {
    let base = terrain_map(&wavy_mesh(16));
    let tool = ball_tool(2);
    let backend = WorkerBackend::new(4);
    let before = generate_path(&backend, &base, &tool, 1, 1, -100.0, None).unwrap();

    let mut pts = base.to_points();
    // Raise one interior sample.
    let target = pts
        .chunks_exact_mut(3)
        .find(|p| p[0] == 8.0 && p[1] == 7.0)
        .unwrap();
    target[2] += 10.0;
    let raised = create_height_map_from_points(&pts, 1.0, None).unwrap();
    let after = generate_path(&backend, &raised, &tool, 1, 1, -100.0, None).unwrap();

    let mut changed = 0;
    for (b, a) in before.data.iter().zip(&after.data) {
        assert!(a >= b);
        if a > b {
            changed += 1;
        }
    }
    assert!(changed > 0);
}

#[test]
fn test_deterministic_across_worker_counts() {
    let terrain = terrain_map(&wavy_mesh(24));
    let tool = ball_tool(3);
    let reference = generate_path(&WorkerBackend::new(1), &terrain, &tool, 1, 2, -100.0, None).unwrap();
    for workers in [2, 4, 7] {
        let again = generate_path(&WorkerBackend::new(workers), &terrain, &tool, 1, 2, -100.0, None).unwrap();
        assert_eq!(again.data, reference.data, "{workers} workers");
    }
}

#[test]
fn test_tiled_mesh_source_matches_single_pass() {
    let triangles = wavy_mesh(40);
    let tool = ball_tool(3);
    let single = generate_path(&WorkerBackend::new(4), &terrain_map(&triangles), &tool, 1, 1, -100.0, None).unwrap();

    let mut s = settings();
    s.tiling.memory_budget_bytes = 12 << 10;
    let generator = PathGenerator::new(WorkerBackend::new(4), s).unwrap();
    let mesh = Mesh::from_flat(&triangles).unwrap();
    let grid = lattice_for(&mesh, 1.0, None).unwrap().unwrap();
    let source = TerrainSource::Mesh {
        mesh: &mesh,
        filter: FaceFilter::UpwardFacing,
        grid,
    };
    let tiled = generator.generate(&source, &tool, None, &mut |_| {}).unwrap();

    assert!(tiled.report.tiles > 1);
    assert_eq!(tiled.data.len(), single.data.len());
    for (t, s) in tiled.data.iter().zip(&single.data) {
        assert_relative_eq!(*t, *s, epsilon = 1e-4);
    }
}

#[test]
fn test_generate_from_meshes() {
    let generator = PathGenerator::new(WorkerBackend::new(2), settings()).unwrap();
    // Tool: downward-facing 2x2 square, wound clockwise seen from above.
    let tool = [
        -1.0, -1.0, 0.0, -1.0, 1.0, 0.0, 1.0, 1.0, 0.0, //
        -1.0, -1.0, 0.0, 1.0, 1.0, 0.0, 1.0, -1.0, 0.0,
    ];
    let path = generator
        .generate_from_meshes(&plane(0.0, 0.0, 10.0, 10.0, 5.0), &tool, None, &mut |_| {})
        .unwrap();
    assert_eq!((path.points_per_line, path.scanlines), (11, 11));
    assert!(path.data.iter().all(|&z| z == 5.0));
    assert_eq!(path.report.sparse_tool_cells, 9);

    let empty = generator.generate_from_meshes(&[], &tool, None, &mut |_| {}).unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_capacity_error_when_tiling_disabled() {
    let mut s = settings();
    s.tiling.memory_budget_bytes = 4 << 10;
    s.tiling.auto_tiling = false;
    let generator = PathGenerator::new(WorkerBackend::new(2), s).unwrap();
    let terrain = terrain_map(&wavy_mesh(30));
    let err = generator
        .generate(&TerrainSource::Map(&terrain), &ball_tool(2), None, &mut |_| {})
        .unwrap_err();
    match err {
        PathError::Capacity { requested, limit, .. } => assert!(requested > limit),
        other => panic!("expected capacity error, got {other:?}"),
    }
}
