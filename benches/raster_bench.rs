use criterion::{criterion_group, criterion_main, Criterion};

use mathpng::rendering::raster::{Rasterizer, Sizing};
use mathpng::RasterOptions;

// Run with:
//    cargo bench --bench raster_bench

const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="8.976ex" height="2.262ex" viewBox="0 -833.9 3967.6 1000"><g fill="currentColor" transform="scale(1,-1)"><path d="M0 -166H1200V833H0Z"/><path d="M1500 200H2400V400H1500Z"/><path d="M2700 -166H3967V600H2700Z"/></g></svg>"##;

fn bench_rasterize(c: &mut Criterion) {
    let rasterizer = Rasterizer::new(RasterOptions::default());

    c.bench_function("rasterize_default_scale", |b| {
        b.iter(|| {
            rasterizer.rasterize(SVG).unwrap();
        })
    });

    c.bench_function("rasterize_width_1600", |b| {
        b.iter(|| {
            rasterizer.rasterize_with(SVG, Sizing::Width(1600)).unwrap();
        })
    });
}

criterion_group!(benches, bench_rasterize);
criterion_main!(benches);
