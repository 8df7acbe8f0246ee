use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rfbridge::{BridgeConfig, HostMethods, HostValue, ScriptContext};

fn fragment(rows: usize) -> String {
    let mut html = String::from("<body>");
    for i in 0..rows {
        html.push_str(&format!(
            r#"<div style="color:red;width:{}px"><span>row {}</span></div>"#,
            i, i
        ));
    }
    html.push_str("<script>globalThis.rows = document.body.childNodes.length;</script></body>");
    html
}

fn bench_parse_html(c: &mut Criterion) {
    let html = fragment(100);
    c.bench_function("parse_html_100_rows", |b| {
        b.iter(|| {
            let mut ctx = ScriptContext::new(BridgeConfig::default(), HostMethods::new())
                .expect("failed to create context");
            assert!(ctx.parse_html(black_box(&html)));
        })
    });
}

fn bench_callback_round_trip(c: &mut Criterion) {
    let host = HostMethods::new().with_invoke_method(|_call, handle| {
        let _ = handle.complete(HostValue::Null);
    });
    let mut ctx = ScriptContext::new(BridgeConfig::default(), host).expect("failed to create context");

    c.bench_function("invoke_method_round_trip", |b| {
        b.iter(|| {
            ctx.evaluate_script("__rfox_invoke_method__('noop', null, () => {})")
                .expect("evaluate");
            ctx.run_pending_tasks();
        })
    });
}

criterion_group!(benches, bench_parse_html, bench_callback_round_trip);
criterion_main!(benches);
