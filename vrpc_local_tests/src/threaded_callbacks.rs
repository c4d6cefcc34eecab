use std::{sync::mpsc, thread, time::Duration};

use ractor::ActorRef;
use serde_json::{Value, json};
use vrpc_local::{Arg, EmitterEvent, EmitterMailbox, VrpcLocal};

use crate::fixtures::{self, CLASS_NAME, TestBinding};

#[test]
fn test_callback_fired_from_binding_thread() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = vrpc.create(CLASS_NAME, vec![])?;

    let (tx, rx) = mpsc::channel::<(thread::ThreadId, Vec<Value>)>();
    test_class.call(
        "callMeLater",
        vec![
            Arg::callback(move |args| {
                let _ = tx.send((thread::current().id(), args));
            }),
            Arg::plain(20),
        ],
    )?;

    // the call returned before the binding fired
    assert_eq!(vrpc.router().pending_callbacks(), 1);

    let (fired_on, args) = rx.recv_timeout(Duration::from_secs(2))?;
    assert_ne!(fired_on, thread::current().id());
    assert_eq!(args, vec![json!("later"), json!(20)]);
    assert_eq!(vrpc.router().pending_callbacks(), 0);
    Ok(())
}

#[test]
fn test_callback_outliving_its_proxy() -> anyhow::Result<()> {
    let vrpc = VrpcLocal::new(TestBinding::new());
    let (tx, rx) = mpsc::channel::<Vec<Value>>();
    {
        let test_class = vrpc.create(CLASS_NAME, vec![])?;
        test_class.call(
            "callMeLater",
            vec![
                Arg::callback(move |args| {
                    let _ = tx.send(args);
                }),
                Arg::plain(10),
            ],
        )?;
    }
    assert_eq!(rx.recv_timeout(Duration::from_secs(2))?[0], json!("later"));
    Ok(())
}

#[test]
fn test_concurrent_registrations_stay_distinct() -> anyhow::Result<()> {
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = std::sync::Arc::new(vrpc.create(CLASS_NAME, vec![])?);
    let (tx, rx) = mpsc::channel::<()>();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let test_class = test_class.clone();
            let tx = tx.clone();
            thread::spawn(move || -> anyhow::Result<()> {
                for _ in 0..25 {
                    let tx = tx.clone();
                    test_class.call(
                        "callMeLater",
                        vec![
                            Arg::callback(move |_| {
                                let _ = tx.send(());
                            }),
                            Arg::plain(1),
                        ],
                    )?;
                }
                Ok(())
            })
        })
        .collect();
    drop(tx);

    for worker in workers {
        worker.join().map_err(|_| anyhow::anyhow!("worker panicked"))??;
    }
    for _ in 0..200 {
        rx.recv_timeout(Duration::from_secs(2))?;
    }
    assert_eq!(vrpc.router().pending_callbacks(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_emitter_into_actor() -> anyhow::Result<()> {
    fixtures::init_tracing();
    let vrpc = VrpcLocal::new(TestBinding::new());
    let test_class = vrpc.create(CLASS_NAME, vec![])?;
    let (mut mailbox, _handle) = EmitterMailbox::spawn().await?;
    let listener: ActorRef<EmitterEvent> = mailbox.actor_ref.clone();

    test_class.call("notifyOnNew", vec![Arg::actor(listener.clone(), "new")])?;
    test_class.call("notifyOnRemoved", vec![Arg::actor(listener, "removed")])?;

    test_class.call("addEntry", vec![Arg::plain("a"), Arg::plain(json!({ "n": 1 }))])?;
    test_class.call("removeEntry", vec![Arg::plain("a")])?;

    for expected in ["new", "removed"] {
        let event = tokio::time::timeout(Duration::from_secs(1), mailbox.rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("mailbox closed"))?;
        assert_eq!(event.context, expected);
        assert_eq!(event.args, vec![json!({ "n": 1 })]);
    }

    assert!(test_class.off("notifyOnNew", 0));
    test_class.call("addEntry", vec![Arg::plain("b"), Arg::plain(json!({}))])?;
    let nothing = tokio::time::timeout(Duration::from_millis(100), mailbox.rx.recv()).await;
    assert!(nothing.is_err());
    Ok(())
}
