use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use serde_json::{Value, json};
use vrpc_local::{Arg, VrpcError, VrpcLocal};

use crate::fixtures::{self, CLASS_NAME, TestBinding};

type Events = Arc<Mutex<Vec<(String, Value)>>>;

fn listener(events: &Events) -> impl Fn(&str, Vec<Value>) + Send + Sync + 'static {
    let events = events.clone();
    move |event: &str, args: Vec<Value>| {
        let first = args.into_iter().next().unwrap_or(Value::Null);
        events.lock().push((event.to_string(), first));
    }
}

#[test]
fn test_create_exposes_member_functions() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = vrpc.create(CLASS_NAME, vec![])?;

    let methods: BTreeSet<&str> = test_class.methods().collect();
    let expected: BTreeSet<&str> = [
        "addEntry",
        "callMeBack",
        "callMeLater",
        "computeLater",
        "echo",
        "getRegistry",
        "hasCategory",
        "notifyOnNew",
        "notifyOnRemoved",
        "removeEntry",
    ]
    .into_iter()
    .collect();
    assert_eq!(methods, expected);
    assert_eq!(test_class.methods().count(), expected.len());
    assert!(!test_class.has_method("crazy"));
    Ok(())
}

#[test]
fn test_registry_lifecycle_with_emitters() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = vrpc.create(CLASS_NAME, vec![])?;
    let events: Events = Arc::new(Mutex::new(Vec::new()));

    assert_eq!(test_class.call("getRegistry", vec![])?, json!({}));
    assert_eq!(test_class.call("hasCategory", vec![Arg::plain("test")])?, json!(false));

    test_class.call("notifyOnNew", vec![Arg::emitter(listener(&events), "new")])?;
    test_class.call("notifyOnRemoved", vec![Arg::emitter(listener(&events), "removed")])?;

    let entry = json!({
        "member1": "first entry",
        "member2": 42,
        "member3": 2.5,
        "member4": [0, 1, 2, 3]
    });
    test_class.call("addEntry", vec![Arg::plain("test"), Arg::plain(entry.clone())])?;
    assert_eq!(test_class.call("hasCategory", vec![Arg::plain("test")])?, json!(true));
    assert_eq!(events.lock().clone(), vec![("new".to_string(), entry.clone())]);
    assert_eq!(test_class.call("getRegistry", vec![])?["test"][0], entry);

    let removed = test_class.call("removeEntry", vec![Arg::plain("test")])?;
    assert_eq!(removed["member1"], json!("first entry"));
    assert_eq!(test_class.call("hasCategory", vec![Arg::plain("test")])?, json!(false));
    assert_eq!(events.lock()[1], ("removed".to_string(), entry));

    match test_class.call("removeEntry", vec![Arg::plain("test")]) {
        Err(err @ VrpcError::RemoteInvocation(_)) => {
            assert_eq!(err.to_string(), "Can not remove non-existing category");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }

    // emitters stay registered for the whole lifetime of the router
    assert_eq!(vrpc.router().registered_emitters(), 2);
    test_class.call("addEntry", vec![Arg::plain("again"), Arg::plain(json!({}))])?;
    assert_eq!(events.lock().len(), 3);
    Ok(())
}

#[test]
fn test_call_me_back_fires_once_per_call() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = vrpc.create(CLASS_NAME, vec![])?;
    let calls = Arc::new(AtomicUsize::new(0));

    for round in 1..=2 {
        let calls_clone = calls.clone();
        test_class.call(
            "callMeBack",
            vec![Arg::callback(move |args| {
                assert_eq!(args, vec![json!(100)]);
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })],
        )?;
        assert_eq!(calls.load(Ordering::SeqCst), round);
        assert_eq!(vrpc.router().pending_callbacks(), 0);
    }
    Ok(())
}

#[test]
fn test_static_calls() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let vrpc = VrpcLocal::new(TestBinding::new());

    assert_eq!(vrpc.call_static(CLASS_NAME, "crazy", vec![])?, json!("who is crazy?"));
    assert_eq!(
        vrpc.call_static(CLASS_NAME, "crazy", vec![Arg::plain("vrpc")])?,
        json!("vrpc is crazy!")
    );
    assert!(matches!(
        vrpc.call_static(CLASS_NAME, "crazy", vec![Arg::callback(|_| {})]),
        Err(VrpcError::Unsupported(_))
    ));
    assert_eq!(
        vrpc.call_static(CLASS_NAME, "sane", vec![]).unwrap_err().to_string(),
        "Could not find function: sane"
    );
    Ok(())
}

#[test]
fn test_echo_keeps_argument_order() -> anyhow::Result<()> {
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = vrpc.create(CLASS_NAME, vec![])?;

    let values: Vec<Value> = (0..15).map(|i| json!(format!("arg{i}"))).collect();
    let echoed = test_class.call("echo", values.iter().cloned().map(Arg::from).collect())?;
    assert_eq!(echoed, Value::Array(values));

    // a two element array is data, not an emitter marker
    let pair = json!([{}, "new"]);
    assert_eq!(test_class.call("echo", vec![Arg::plain(pair.clone())])?, json!([pair]));
    assert_eq!(vrpc.router().registered_emitters(), 0);
    Ok(())
}

#[test]
fn test_constructor_arguments_and_introspection() -> anyhow::Result<()> {
    let binding = TestBinding::new();
    let vrpc = VrpcLocal::new(binding.clone());

    let seeded = vrpc.create(
        CLASS_NAME,
        vec![Arg::plain(json!({ "fruits": [{ "member1": "apple" }] }))],
    )?;
    assert_eq!(seeded.call("hasCategory", vec![Arg::plain("fruits")])?, json!(true));

    assert_eq!(vrpc.available_classes()?, vec![CLASS_NAME.to_string()]);
    assert_eq!(
        vrpc.static_functions(CLASS_NAME)?.into_iter().collect::<Vec<_>>(),
        vec!["crazy".to_string()]
    );

    assert!(matches!(
        vrpc.create("NoSuchClass", vec![]),
        Err(VrpcError::Construction { .. })
    ));

    assert_eq!(binding.instance_count(), 1);
    assert!(vrpc.delete(seeded)?);
    assert_eq!(binding.instance_count(), 0);
    Ok(())
}
