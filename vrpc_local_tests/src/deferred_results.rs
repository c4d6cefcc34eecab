use std::time::Duration;

use serde_json::json;
use vrpc_local::{Arg, VrpcConfig, VrpcError, VrpcLocal};

use crate::fixtures::{self, CLASS_NAME, TestBinding};

#[tokio::test]
async fn test_compute_later_resolves() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = vrpc.create(CLASS_NAME, vec![])?;

    let first = test_class.call("computeLater", vec![Arg::plain(1), Arg::plain(2)])?;
    assert!(first.as_str().is_some_and(|r| r.starts_with("__p__")));

    let sum = test_class
        .call_async("computeLater", vec![Arg::plain(20), Arg::plain(22)])
        .await?;
    assert_eq!(sum, json!(42));

    // plain results pass straight through
    assert_eq!(test_class.call_async("hasCategory", vec![Arg::plain("x")]).await?, json!(false));
    Ok(())
}

#[tokio::test]
async fn test_deferred_result_times_out() -> anyhow::Result<()> {
    let binding = TestBinding::new();
    let config = VrpcConfig::default().with_promise_timeout(Duration::from_millis(50));
    let vrpc = VrpcLocal::with_config(binding.clone(), config);

    binding.emit_raw(r#"{"id":"__p__other","data":{"r":1}}"#);
    assert!(matches!(
        vrpc.router().await_promise("__p__never").await,
        Err(VrpcError::PromiseTimeout(_))
    ));
    assert_eq!(vrpc.router().await_promise("__p__other").await?, json!(1));
    Ok(())
}
