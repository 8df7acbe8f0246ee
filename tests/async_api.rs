use std::sync::Arc;
use std::time::{Duration, Instant};

use rfbridge::{Bridge, BridgeConfig, Error, HostMethods, HostValue};

#[tokio::test]
async fn evaluate_and_parse_on_worker_thread() -> anyhow::Result<()> {
    let bridge = Bridge::new(None, HostMethods::new()).await?;

    let result = bridge.evaluate("1 + 2").await?;
    assert_eq!(result.value, "3");
    assert!(!result.is_error);

    assert!(bridge.parse_html(r#"<p style="color:red">hi</p>"#).await?);
    assert_eq!(
        bridge.body_markup().await?.as_deref(),
        Some(r#"<body><p style="color:red">hi</p></body>"#)
    );

    bridge.close().await?;
    Ok(())
}

#[tokio::test]
async fn thrown_exception_is_an_error_result() -> anyhow::Result<()> {
    let bridge = Bridge::new(None, HostMethods::new()).await?;
    let result = bridge.evaluate("throw new Error('nope')").await?;
    assert!(result.is_error);
    assert!(result.value.contains("nope"));
    bridge.close().await?;
    Ok(())
}

#[tokio::test]
async fn settle_delivers_host_completions() -> anyhow::Result<()> {
    let host = HostMethods::new().with_invoke_method(|call, handle| {
        std::thread::spawn(move || {
            let _ = handle.complete(HostValue::String(format!("{}!", call.method)));
        });
    });
    let bridge = Bridge::new(None, host).await?;

    bridge
        .evaluate("globalThis.reply = null; __rfox_invoke_method__('hello', null, v => reply = v);")
        .await?;
    bridge.settle().await?;

    let result = bridge.evaluate("reply").await?;
    assert_eq!(result.value, "\"hello!\"");
    bridge.close().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_config_fails_initialization() {
    let config = BridgeConfig {
        context_id: -1,
        ..Default::default()
    };
    let err = Bridge::new(Some(config), HostMethods::new()).await.err();
    assert!(matches!(err, Some(Error::ConfigError(_))));
}

#[tokio::test]
async fn calls_after_close_report_closed_context() -> anyhow::Result<()> {
    let bridge = Bridge::new(None, HostMethods::new()).await?;
    let other = bridge.clone();
    bridge.close().await?;

    // Tasks queued behind the shutdown are dropped unrun.
    assert!(other.evaluate("1").await.is_err());
    Ok(())
}

#[tokio::test]
async fn dropping_last_handle_stops_worker_and_releases_host() -> anyhow::Result<()> {
    let marker = Arc::new(());
    let held = marker.clone();
    let host = HostMethods::new().with_simulate_input_text(move |_| drop(held.clone()));

    let bridge = Bridge::new(None, host).await?;
    let clone = bridge.clone();
    bridge.evaluate("__rfox_simulate_inputtext__('x')").await?;
    drop(bridge);
    // Another clone keeps the worker running.
    assert!(!clone.evaluate("1").await?.is_error);
    assert_eq!(Arc::strong_count(&marker), 2);

    drop(clone);
    let deadline = Instant::now() + Duration::from_secs(5);
    while Arc::strong_count(&marker) > 1 {
        assert!(Instant::now() < deadline, "worker kept the host capabilities alive");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
