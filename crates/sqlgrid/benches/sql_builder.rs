use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sqlgrid::Value;
use sqlgrid::ql::mock::mock_builder_for;
use sqlgrid::ql::{Condition, Placeholder};

/// `col0 = ? AND col1 = ? ...` with `n` clauses, ordered and paged.
fn build_condition(n: usize) -> Condition {
    let mut condition = Condition::new();
    for i in 0..n {
        condition.and_where(&format!("col{i} = ?"), vec![Value::Int(i as i64)]);
    }
    condition.order(["-col0", "col1"]).limit(15).offset(30);
    condition
}

fn bench_condition_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/condition_render");

    for n in [1, 5, 10, 50, 100] {
        let condition = build_condition(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &condition, |b, condition| {
            b.iter(|| black_box(condition.render('"')));
        });
    }

    group.finish();
}

fn bench_select_in_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/select_in_list");

    for (name, placeholder) in [("question", Placeholder::QUESTION), ("dollar", Placeholder::DOLLAR)] {
        let (builder, _conn) = mock_builder_for(placeholder, '"');
        for n in [5, 20, 100, 500] {
            let ids: Vec<Value> = (0..n).map(Value::Int).collect();
            group.bench_with_input(BenchmarkId::new(name, n), &ids, |b, ids| {
                b.iter(|| {
                    let select = builder
                        .select("robots")
                        .columns(["id", "name"])
                        .and_where("id IN (?)", vec![Value::List(ids.clone())]);
                    black_box(select.to_sql())
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_condition_render, bench_select_in_list);
criterion_main!(benches);
