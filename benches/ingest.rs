use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use geowatch::{
    Coordinate, EngineConfig, GeoEngine, Geofence, GeofenceCategory, GeofenceIndex,
    InMemoryStores, LocationPing, NewAlertRule, NewGeofence, Polygon,
};

/// A grid of `side * side` one-degree squares starting at (0, 0).
fn grid(side: u32) -> Vec<Polygon> {
    let mut out = Vec::with_capacity((side * side) as usize);
    for row in 0..side {
        for col in 0..side {
            let lat = f64::from(row);
            let lon = f64::from(col);
            out.push(Polygon::from_pairs(&[
                (lat, lon),
                (lat, lon + 1.0),
                (lat + 1.0, lon + 1.0),
                (lat + 1.0, lon),
                (lat, lon),
            ]));
        }
    }
    out
}

fn bench_index_containing(c: &mut Criterion) {
    let mut group = c.benchmark_group("index/containing");
    for side in [4u32, 16, 32] {
        let index = GeofenceIndex::from_geofences(grid(side).into_iter().enumerate().map(|(i, p)| {
            Geofence::new(format!("cell {i}"), GeofenceCategory::DeliveryZone, p).unwrap()
        }))
        .unwrap();
        let point = Coordinate::new(f64::from(side) / 2.0 + 0.5, f64::from(side) / 2.0 + 0.5);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(side * side), &point, |b, p| {
            b.iter(|| black_box(index.containing(black_box(*p))));
        });
    }
    group.finish();
}

fn bench_update_location(c: &mut Criterion) {
    let engine = GeoEngine::new(EngineConfig::default(), InMemoryStores::new());
    for (i, polygon) in grid(16).into_iter().enumerate() {
        let g = engine
            .add_geofence(NewGeofence {
                name: format!("cell {i}"),
                description: None,
                category: "toll_zone".to_string(),
                coordinates: polygon,
            })
            .unwrap();
        if i % 4 == 0 {
            engine
                .configure_alert(NewAlertRule {
                    geofence_id: g.id,
                    vehicle_id: None,
                    event_type: "both".to_string(),
                })
                .unwrap();
        }
    }
    // Keep one drained observer attached so publishing does real work.
    let observer = engine.subscribe();

    let t0 = Utc::now();
    let mut step: i64 = 0;
    c.bench_function("engine/update_location", |b| {
        b.iter(|| {
            step += 1;
            let lat = (step % 16) as f64 + 0.5;
            let lon = ((step / 16) % 16) as f64 + 0.5;
            let ping = LocationPing::new("veh_bench", lat, lon, t0 + Duration::milliseconds(step));
            black_box(engine.update_location(ping).unwrap());
            while let Ok(Some(_)) = observer.try_recv() {}
        });
    });
}

criterion_group!(benches, bench_index_containing, bench_update_location);
criterion_main!(benches);
