use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use shopclean::{
    aggregate::Aggregates,
    data::Value,
    dataset::{Column, Table, TableRegistry},
    pipeline,
    schema::{ColumnType, SchemaConfig},
};

fn text(value: impl Into<String>) -> Option<Value> {
    Some(Value::String(value.into()))
}

fn synthetic_registry(rows: usize) -> TableRegistry {
    let statuses = ["shipped", "pending", " ", "delivered"];
    let orders = Table::new(
        "orders",
        vec![
            Column::new(
                "order_id",
                ColumnType::Integer,
                (0..rows).map(|i| Some(Value::Integer(i as i64))).collect(),
            ),
            Column::new(
                "customer_id",
                ColumnType::Integer,
                (0..rows)
                    .map(|i| Some(Value::Integer((i % 997) as i64)))
                    .collect(),
            ),
            Column::new(
                "order_date",
                ColumnType::Text,
                (0..rows)
                    .map(|i| text(format!("2024-{:02}-{:02}", i % 12 + 1, i % 28 + 1)))
                    .collect(),
            ),
            Column::new(
                "status",
                ColumnType::Text,
                (0..rows).map(|i| text(statuses[i % statuses.len()])).collect(),
            ),
            Column::new(
                "total_amount",
                ColumnType::Float,
                (0..rows)
                    .map(|i| Some(Value::Float((i % 500) as f64 + 0.25)))
                    .collect(),
            ),
            Column::new(
                "promotion_id",
                ColumnType::Float,
                (0..rows)
                    .map(|i| (i % 3 == 0).then(|| Value::Float((i % 7) as f64)))
                    .collect(),
            ),
            Column::new(
                "notes",
                ColumnType::Text,
                (0..rows)
                    .map(|i| if i % 4 == 0 { text("  ") } else { None })
                    .collect(),
            ),
        ],
    )
    .expect("orders");

    let order_items = Table::new(
        "order_items",
        vec![
            Column::new(
                "order_item_id",
                ColumnType::Integer,
                (0..rows).map(|i| Some(Value::Integer(i as i64))).collect(),
            ),
            Column::new(
                "product_id",
                ColumnType::Integer,
                (0..rows)
                    .map(|i| Some(Value::Integer((i % 50) as i64)))
                    .collect(),
            ),
            Column::new(
                "quantity",
                ColumnType::Integer,
                (0..rows)
                    .map(|i| Some(Value::Integer((i % 5 + 1) as i64)))
                    .collect(),
            ),
        ],
    )
    .expect("order_items");

    let products = Table::new(
        "products",
        vec![
            Column::new(
                "product_id",
                ColumnType::Integer,
                (0..50).map(|i| Some(Value::Integer(i))).collect(),
            ),
            Column::new(
                "product_name",
                ColumnType::Text,
                (0..50).map(|i| text(format!("Product {i}"))).collect(),
            ),
        ],
    )
    .expect("products");

    let mut registry = TableRegistry::new();
    registry.insert(orders);
    registry.insert(order_items);
    registry.insert(products);
    registry
}

fn bench_clean_and_aggregate(c: &mut Criterion) {
    let schema = SchemaConfig::default();
    let mut group = c.benchmark_group("clean_and_aggregate");
    for rows in [1_000usize, 50_000] {
        let registry = synthetic_registry(rows);
        group.bench_function(format!("{rows}_orders"), |b| {
            b.iter_batched(
                || registry.clone(),
                |mut registry| {
                    pipeline::prepare(&mut registry, &schema);
                    Aggregates::compute(&registry).expect("aggregates")
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_clean_and_aggregate);
criterion_main!(benches);
