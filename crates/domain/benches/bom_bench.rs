use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{BomResolver, InMemoryCatalog, ProductDefinition, ProductType};
use rust_decimal::Decimal;

/// A catalog with `width` models per kit, `width` pieces per model and two
/// parts per piece.
fn wide_catalog(width: usize) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    let mut kit = ProductDefinition::new("KIT", ProductType::Kit);

    for m in 0..width {
        let model_id = format!("M{m}");
        let mut model = ProductDefinition::new(&model_id, ProductType::Modelo);
        for p in 0..width {
            let piece_id = format!("M{m}-P{p}");
            let piece = ProductDefinition::new(&piece_id, ProductType::Peca)
                .with_component(&format!("{piece_id}-A"), 1)
                .with_component(&format!("{piece_id}-B"), 2)
                .with_supply("PLA", Decimal::new(125, 1));
            catalog.insert(ProductDefinition::new(format!("{piece_id}-A"), ProductType::Parte));
            catalog.insert(ProductDefinition::new(format!("{piece_id}-B"), ProductType::Parte));
            catalog.insert(piece);
            model = model.with_component(&piece_id, 3);
        }
        catalog.insert(model);
        kit = kit.with_component(&model_id, 2);
    }

    catalog.insert(kit);
    catalog
}

fn bench_expand(c: &mut Criterion) {
    let mut group = c.benchmark_group("bom/expand");

    for width in [2usize, 8, 16] {
        let catalog = wide_catalog(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &catalog, |b, catalog| {
            b.iter(|| {
                BomResolver::new(catalog)
                    .expand("KIT", Decimal::from(5))
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_expand);
criterion_main!(benches);
