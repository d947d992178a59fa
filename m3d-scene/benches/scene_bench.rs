//! Benchmarks for m3d-scene
//!
//! Measures bounds caching, channel reconciliation and hit testing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{DVec2, DVec3};
use m3d_channel::{MaterialData, RecordingChannel};
use m3d_math::{Color, Ray3D, TransformOp};
use m3d_scene::{MeshGeometry, ObjectId, Scene, SceneConfig};

/// Grid mesh of `cells * cells` quads over the unit square
fn grid(cells: u32) -> MeshGeometry {
    let step = 1.0 / cells as f64;
    let mut positions = Vec::new();
    for y in 0..=cells {
        for x in 0..=cells {
            positions.push(DVec3::new(x as f64 * step, y as f64 * step, 0.0));
        }
    }
    let row = cells + 1;
    let mut indices = Vec::new();
    for y in 0..cells {
        for x in 0..cells {
            let i = y * row + x;
            indices.extend_from_slice(&[i, i + 1, i + row + 1, i, i + row + 1, i + row]);
        }
    }
    MeshGeometry::new(positions, indices)
}

/// Root visual with `count` translated child visuals, returning the root and
/// the transforms
fn populate(scene: &mut Scene, count: usize) -> (ObjectId, Vec<ObjectId>) {
    let root = scene.create_model_visual(ObjectId::default()).unwrap();
    let material = scene.create_material(MaterialData::diffuse(Color::WHITE));
    let mut transforms = Vec::with_capacity(count);
    for i in 0..count {
        let geometry = scene.create_mesh_geometry(MeshGeometry::quad(DVec2::ZERO, DVec2::ONE, 0.0));
        let model = scene.create_geometry_model(geometry, material).unwrap();
        let transform = scene.create_transform(TransformOp::translate(DVec3::new(i as f64 * 2.0, 0.0, 0.0)));
        let visual = scene.create_model_visual(model).unwrap();
        scene.set_transform(visual, transform).unwrap();
        scene.attach(root, visual).unwrap();
        transforms.push(transform);
    }
    (root, transforms)
}

fn bench_bounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtree_bounds");

    for count in [10, 100, 1000].iter() {
        let mut scene = Scene::new();
        let (root, transforms) = populate(&mut scene, *count);
        scene.subtree_bounds(root).unwrap();

        group.bench_with_input(BenchmarkId::new("cached", count), count, |b, _| {
            b.iter(|| black_box(scene.subtree_bounds(root).unwrap()));
        });

        let mut offset = 0.0;
        group.bench_with_input(BenchmarkId::new("one_leaf_moved", count), count, |b, _| {
            b.iter(|| {
                offset += 1.0;
                scene
                    .write_transform(transforms[0], |op| {
                        *op = TransformOp::translate(DVec3::new(0.0, offset, 0.0))
                    })
                    .unwrap();
                black_box(scene.subtree_bounds(root).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for count in [10, 100, 1000].iter() {
        let mut scene = Scene::new();
        let (channel, log) = RecordingChannel::new();
        let channel = scene.add_channel(Box::new(channel)).unwrap();
        let (root, transforms) = populate(&mut scene, *count);
        scene.add_ref_on_channel(root, channel).unwrap();
        scene.reconcile(channel).unwrap();
        log.drain();

        group.bench_with_input(BenchmarkId::new("clean", count), count, |b, _| {
            b.iter(|| black_box(scene.reconcile(channel).unwrap()));
        });

        let mut offset = 0.0;
        group.bench_with_input(BenchmarkId::new("one_transform", count), count, |b, _| {
            b.iter(|| {
                offset += 1.0;
                scene
                    .write_transform(transforms[count / 2], |op| {
                        *op = TransformOp::translate(DVec3::new(0.0, 0.0, offset))
                    })
                    .unwrap();
                let stats = scene.reconcile(channel).unwrap();
                log.drain();
                black_box(stats)
            });
        });
    }

    group.finish();
}

fn bench_hit_test(c: &mut Criterion) {
    let mut group = c.benchmark_group("hit_test");

    for count in [10, 100, 1000].iter() {
        let mut scene = Scene::new();
        let (root, _) = populate(&mut scene, *count);
        scene.subtree_bounds(root).unwrap();
        let ray = Ray3D::new(DVec3::new(0.75, 0.25, 5.0), DVec3::NEG_Z);

        group.bench_with_input(BenchmarkId::new("pruned_tree", count), count, |b, _| {
            b.iter(|| black_box(scene.hit_test_nearest(root, ray).unwrap()));
        });
    }

    for (name, threshold) in [("sequential", usize::MAX), ("parallel", 0)] {
        let mut scene = Scene::with_config(SceneConfig {
            parallel_triangle_threshold: threshold,
            ..Default::default()
        });
        let geometry = scene.create_mesh_geometry(grid(128));
        let model = scene.create_geometry_model(geometry, ObjectId::default()).unwrap();
        let visual = scene.create_model_visual(model).unwrap();
        let ray = Ray3D::new(DVec3::new(0.3, 0.6, 1.0), DVec3::NEG_Z);

        group.bench_function(BenchmarkId::new("dense_mesh", name), |b| {
            b.iter(|| black_box(scene.hit_test_ray(visual, ray).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_bounds, bench_reconcile, bench_hit_test);
criterion_main!(benches);
