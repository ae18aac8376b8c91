//! Performance benchmarks for the per-frame path
//!
//! The window manager runs every frame with the registry locked, so its cost
//! bounds how long command handlers can be kept waiting.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;
use vitrine::{
    decoration::{FrameMetrics, WindowFrame},
    input::{ButtonEdges, FrameInput, InputEvent, InputState},
    protocol::{MouseButton, WindowId},
    server::Registry,
    session::Session,
    window::{Point, Rectangle, Window},
    WindowManager,
};

/// Registry with `count` cascaded windows. Windows bind sockets, so this
/// must run inside a runtime context.
fn populated_registry(dir: &TempDir, count: usize) -> Registry {
    let session = Session::create(dir.path());
    let mut registry = Registry::new(count);
    for i in 0..count {
        let id = registry.allocate_id().unwrap();
        let offset = (i as i32 % 64) * 10;
        let window = Window::create(
            id,
            format!("window {}", i),
            Rectangle::new(offset, offset, 200, 150),
            &session,
            16,
        );
        registry.push(window).unwrap();
    }
    registry
}

/// Benchmark a full window manager pass
fn bench_wm_update(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let mut group = c.benchmark_group("wm_update");

    for window_count in [10, 100, 500].iter() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = populated_registry(&dir, *window_count);
        let mut wm = WindowManager::default();

        group.bench_function(format!("idle_motion_{}_windows", window_count), |b| {
            let input = FrameInput {
                cursor: Point::new(300, 300),
                delta: Point::new(1, 0),
                edges: ButtonEdges::none(),
            };
            b.iter(|| black_box(wm.update(&mut registry, &input)));
        });

        group.bench_function(format!("focus_click_{}_windows", window_count), |b| {
            // Bottom window's title bar, clear of everything stacked above it
            let input = FrameInput {
                cursor: Point::new(150, 5),
                delta: Point::default(),
                edges: ButtonEdges::none().with_press(MouseButton::Left),
            };
            let release = FrameInput {
                edges: ButtonEdges::none().with_release(MouseButton::Left),
                ..input
            };
            b.iter(|| {
                black_box(wm.update(&mut registry, &input));
                black_box(wm.update(&mut registry, &release));
            });
        });
    }

    group.finish();
}

/// Benchmark registry reordering
fn bench_registry_raise(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("registry");

    group.bench_function("raise_bottom_of_500", |b| {
        b.iter_batched(
            || populated_registry(&dir, 500),
            |mut registry| {
                black_box(registry.raise(WindowId(0)).unwrap());
                registry
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

/// Benchmark decoration geometry
fn bench_frame_geometry(c: &mut Criterion) {
    let metrics = FrameMetrics::default();
    let geometry = Rectangle::new(120, 80, 640, 480);

    c.bench_function("window_frame_hit", |b| {
        b.iter(|| {
            let frame = WindowFrame::compute(black_box(&geometry), &metrics);
            black_box(frame.hit(Point::new(400, 90)))
        });
    });
}

/// Benchmark input latching
fn bench_input_processing(c: &mut Criterion) {
    let mut input = InputState::new(&vitrine::config::InputConfig::default());

    c.bench_function("input_frame_with_64_events", |b| {
        b.iter(|| {
            for i in 0..64 {
                input.process(InputEvent::Motion {
                    dx: if i % 2 == 0 { 3 } else { -3 },
                    dy: 1,
                });
            }
            input.process(InputEvent::Button {
                button: MouseButton::Left,
                pressed: true,
            });
            input.process(InputEvent::Button {
                button: MouseButton::Left,
                pressed: false,
            });
            black_box(input.frame())
        });
    });
}

criterion_group!(
    benches,
    bench_wm_update,
    bench_registry_raise,
    bench_frame_geometry,
    bench_input_processing
);

criterion_main!(benches);
