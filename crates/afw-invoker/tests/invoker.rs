use afw_invoker::Invoker;
use afw_operation::{InvokeError, Operation, OperationResolver, Position, ResolverBuilder};
use afw_testkit::ops::{self, AddInput, Number};
use afw_testkit::{ResolverSet, init_test_logging};
use anyhow::anyhow;
use serde_json::json;

fn invoker() -> (Invoker, ResolverSet) {
    init_test_logging();
    let resolvers = ResolverSet::new(ops::resolvers());
    (Invoker::new(resolvers.clone()), resolvers)
}

fn pick() -> Operation<Number, String> {
    Operation::new("test.pick")
}

fn pick_builder() -> ResolverBuilder<Number, String> {
    OperationResolver::builder(&pick())
}

fn tagged(builder: ResolverBuilder<Number, String>, tag: &'static str) -> OperationResolver {
    builder.sync_handler(move |_, _| Ok(tag.to_string()))
}

#[tokio::test]
async fn compute_doubles_its_input() {
    let (invoker, _) = invoker();
    let output = invoker.invoke(&ops::compute(), Number::new(2)).await.expect("compute");
    assert_eq!(output, Number::new(4));
}

#[tokio::test]
async fn filtered_resolver_wins_and_fallback_catches_the_rest() {
    let (invoker, resolvers) = invoker();
    resolvers.push(tagged(pick_builder().filter(|input: &Number| input.value == 1), "filtered"));
    resolvers.push(tagged(pick_builder().fallback(), "fallback"));

    assert_eq!(invoker.invoke(&pick(), Number::new(1)).await.expect("value 1"), "filtered");
    assert_eq!(invoker.invoke(&pick(), Number::new(2)).await.expect("value 2"), "fallback");
}

#[tokio::test]
async fn hoisted_resolver_beats_earlier_registrations() {
    let (invoker, resolvers) = invoker();
    resolvers.push(tagged(pick_builder(), "default"));
    resolvers.push(tagged(pick_builder().position(Position::Hoist), "hoist"));
    resolvers.push(tagged(pick_builder(), "second-default"));

    assert_eq!(invoker.invoke(&pick(), Number::new(0)).await.expect("pick"), "hoist");
}

#[tokio::test]
async fn missing_handler_fails_without_publishing() {
    let (invoker, _) = invoker();
    let mut events = invoker.invocations();

    let err = invoker
        .invoke(&pick(), Number::new(1))
        .await
        .expect_err("nothing registered for pick");
    assert!(matches!(err, InvokeError::NoHandler(ref key) if key == pick().key()));
    assert!(err.is_no_handler());
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn filter_rejecting_every_candidate_is_no_handler() {
    let (invoker, resolvers) = invoker();
    resolvers.push(tagged(pick_builder().filter(|input: &Number| input.value == 1), "only-one"));

    let err = invoker.invoke(&pick(), Number::new(2)).await.expect_err("filter rejects");
    assert!(err.is_no_handler());
}

#[tokio::test]
async fn resolvers_are_read_fresh_on_every_call() {
    let (invoker, resolvers) = invoker();
    assert!(invoker.invoke(&pick(), Number::new(0)).await.is_err());

    resolvers.push(tagged(pick_builder(), "late"));
    assert_eq!(invoker.invoke(&pick(), Number::new(0)).await.expect("registered"), "late");

    resolvers.remove(pick().key());
    assert!(invoker.invoke(&pick(), Number::new(0)).await.is_err());
}

#[tokio::test]
async fn successful_invocations_are_published_in_order() {
    let (invoker, _) = invoker();
    let mut events = invoker.invocations();

    invoker.invoke(&ops::add(), AddInput { a: 1, b: 2 }).await.expect("add");
    invoker.invoke(&ops::halve(), Number::new(8)).await.expect("halve");
    let _ = invoker.invoke(&ops::fail(), ()).await;

    let first = events.recv().await.expect("add event");
    assert_eq!(first.operation.key(), ops::add().key());
    assert_eq!(first.input, json!({ "a": 1, "b": 2 }));
    assert_eq!(first.output, json!(3));

    let second = events.recv().await.expect("halve event");
    assert_eq!(second.operation.key(), ops::halve().key());
    assert_eq!(second.output, json!({ "value": 4 }));
    assert!(second.seq > first.seq);

    assert!(events.try_recv().is_none(), "failed invocations are not published");
}

#[tokio::test]
async fn late_subscribers_miss_earlier_events() {
    let (invoker, _) = invoker();
    let mut early = invoker.invocations();
    invoker.invoke(&ops::add(), AddInput { a: 2, b: 2 }).await.expect("add");

    let mut late = invoker.invocations();
    invoker.invoke(&ops::add(), AddInput { a: 3, b: 3 }).await.expect("add");

    assert_eq!(early.recv().await.expect("first").output, json!(4));
    assert_eq!(early.recv().await.expect("second").output, json!(6));
    assert_eq!(late.recv().await.expect("only second").output, json!(6));
    assert!(late.try_recv().is_none());
}

#[tokio::test]
async fn handler_errors_keep_their_cause() {
    let (invoker, _) = invoker();
    let err = invoker.invoke(&ops::fail(), ()).await.expect_err("fail");
    match err {
        InvokeError::Handler(cause) => assert_eq!(cause.to_string(), "boom"),
        other => panic!("expected handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn outcome_reports_data_or_error() {
    let (invoker, _) = invoker();

    let ok = invoker.invoke_outcome(&ops::add(), AddInput { a: 4, b: 5 }).await;
    assert!(ok.is_ok());
    assert_eq!(ok.data(), Some(&9));

    let failed = invoker.invoke_outcome(&pick(), Number::new(0)).await;
    assert!(failed.data().is_none());
    assert!(matches!(failed.error(), Some(InvokeError::NoHandler(_))));
}

#[tokio::test]
async fn nested_invocations_publish_both_and_propagate_errors() {
    let (invoker, resolvers) = invoker();
    let outer: Operation<Number, Number> = Operation::new("test.outer");
    let broken: Operation<Number, Number> = Operation::new("test.broken");
    resolvers.push(OperationResolver::new(&outer, |input: Number, ctx| async move {
        let doubled = ctx.invoke(&ops::compute(), input).await?;
        ctx.invoke(&ops::halve(), doubled).await.map_err(anyhow::Error::from)
    }));
    resolvers.push(OperationResolver::new(&broken, |input: Number, ctx| async move {
        let missing: Operation<Number, Number> = Operation::new("test.missing");
        ctx.invoke(&missing, input).await.map_err(anyhow::Error::from)
    }));

    let mut events = invoker.invocations();
    let output = invoker.invoke(&outer, Number::new(1)).await.expect("outer");
    assert_eq!(output, Number::new(1));

    let keys: Vec<_> = [
        events.recv().await.expect("compute"),
        events.recv().await.expect("halve"),
        events.recv().await.expect("outer"),
    ]
    .iter()
    .map(|event| event.operation.key().to_string())
    .collect();
    assert_eq!(keys, vec!["test.compute", "test.halve", "test.outer"]);

    let err = invoker.invoke(&broken, Number::new(1)).await.expect_err("inner missing");
    assert!(matches!(err, InvokeError::NoHandler(ref key) if key.as_str() == "test.missing"));
}

#[tokio::test]
async fn invoke_sync_completes_non_suspending_chains() {
    let (invoker, resolvers) = invoker();
    let sum_twice: Operation<AddInput, i64> = Operation::new("test.sum-twice");
    resolvers.push(OperationResolver::sync(&sum_twice, |input: AddInput, ctx| {
        let once = ctx.invoke_sync(&ops::add(), input)?;
        Ok(ctx.invoke_sync(&ops::add(), AddInput { a: once, b: once })?)
    }));
    let mut events = invoker.invocations();

    let output = invoker.invoke_sync(&sum_twice, AddInput { a: 1, b: 2 }).expect("sync chain");
    assert_eq!(output, 6);

    let mut published = 0;
    while events.try_recv().is_some() {
        published += 1;
    }
    assert_eq!(published, 3);
}

#[tokio::test]
async fn invoke_sync_rejects_suspending_handlers() {
    let (invoker, _) = invoker();
    let mut events = invoker.invocations();

    let err = invoker
        .invoke_sync(&ops::compute(), Number::new(3))
        .expect_err("compute sleeps");
    assert!(matches!(err, InvokeError::WouldSuspend(ref key) if key == ops::compute().key()));
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn invoke_sync_accepts_async_handlers_that_never_wait() {
    let (invoker, resolvers) = invoker();
    let ready: Operation<Number, Number> = Operation::new("test.ready");
    resolvers.push(OperationResolver::new(&ready, |input: Number, _ctx| async move {
        anyhow::Ok(Number::new(input.value + 1))
    }));

    assert_eq!(invoker.invoke_sync(&ready, Number::new(1)).expect("ready"), Number::new(2));
}

#[tokio::test]
async fn undecodable_input_is_reported_for_the_operation() {
    let (invoker, _) = invoker();
    let loose: Operation<serde_json::Value, Number> = Operation::new(ops::halve().key().clone());
    let err = invoker
        .invoke(&loose, json!({ "wrong": true }))
        .await
        .expect_err("shape mismatch");
    assert!(matches!(err, InvokeError::DecodeInput { ref key, .. } if key == ops::halve().key()));
}

#[tokio::test]
async fn handler_failures_can_be_caught_by_callers() {
    let (invoker, resolvers) = invoker();
    let guarded: Operation<(), String> = Operation::new("test.guarded");
    resolvers.push(OperationResolver::new(&guarded, |_: (), ctx| async move {
        match ctx.invoke(&ops::fail(), ()).await {
            Ok(()) => Err(anyhow!("expected failure")),
            Err(err) => Ok(format!("recovered: {err}")),
        }
    }));

    let output = invoker.invoke(&guarded, ()).await.expect("guarded");
    assert_eq!(output, "recovered: boom");
}
