mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{Recorder, scripted, scripted_with_close_delay, spec};
use streaming_http::prelude::*;

#[tokio::test]
async fn end_to_end_open_message_done() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    let id = correlator
        .start(spec("h1"), recorder.listeners("h1"))
        .await
        .expect("start");
    assert!(correlator.is_active(&id));

    transport.open("h1");
    transport.message("h1", r#"{"content":"Hi"}"#);
    transport.message("h1", "[DONE]");

    assert_eq!(
        recorder.entries(),
        vec!["h1:open", "h1:message:Hi", "h1:complete:Hi"]
    );
    assert!(!correlator.is_active(&id));
    assert_eq!(correlator.active_count(), 0);
    assert_eq!(correlator.bus().listener_count(), 0);
}

#[tokio::test]
async fn fragments_accumulate_into_completion_text() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    correlator
        .start(spec("h1"), recorder.listeners("h1"))
        .await
        .expect("start");

    transport.content("h1", "Hel");
    transport.content("h1", "lo");
    transport.content("h1", "!");
    assert_eq!(
        correlator.accumulated_text(&"h1".into()).as_deref(),
        Some("Hello!")
    );
    transport.message("h1", "[DONE]");

    assert_eq!(
        recorder.entries(),
        vec![
            "h1:message:Hel",
            "h1:message:Hello",
            "h1:message:Hello!",
            "h1:complete:Hello!"
        ]
    );
}

#[tokio::test]
async fn events_never_cross_between_identifiers() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    correlator
        .start(spec("a"), recorder.listeners("a"))
        .await
        .expect("start a");
    correlator
        .start(spec("b"), recorder.listeners("b"))
        .await
        .expect("start b");

    transport.open("b");
    transport.open("a");
    transport.content("a", "1");
    transport.content("b", "x");
    transport.content("a", "2");
    transport.error("b", "boom");
    transport.content("a", "3");
    transport.complete("a", Some("[DONE]"));
    transport.close("b");
    transport.close("a");

    assert_eq!(
        recorder.entries_for("a"),
        vec![
            "a:open",
            "a:message:1",
            "a:message:12",
            "a:message:123",
            "a:complete:123"
        ]
    );
    assert_eq!(
        recorder.entries_for("b"),
        vec!["b:open", "b:message:x", "b:error:boom"]
    );
}

#[tokio::test]
async fn only_the_first_terminal_event_is_surfaced() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    correlator
        .start(spec("ok"), recorder.listeners("ok"))
        .await
        .expect("start ok");
    correlator
        .start(spec("bad"), recorder.listeners("bad"))
        .await
        .expect("start bad");
    correlator
        .start(spec("drop"), recorder.listeners("drop"))
        .await
        .expect("start drop");

    transport.complete("ok", None);
    transport.close("ok");
    transport.error("ok", "late");

    transport.error("bad", "refused");
    transport.close("bad");
    transport.complete("bad", None);

    transport.content("drop", "partial");
    transport.close("drop");
    transport.error("drop", "late");

    assert_eq!(recorder.entries_for("ok"), vec!["ok:complete:"]);
    assert_eq!(recorder.entries_for("bad"), vec!["bad:error:refused"]);
    assert_eq!(
        recorder.entries_for("drop"),
        vec!["drop:message:partial", "drop:close:Transport"]
    );
    assert_eq!(correlator.active_count(), 0);
    assert_eq!(correlator.bus().listener_count(), 0);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    let id = correlator
        .start(spec("h1"), recorder.listeners("h1"))
        .await
        .expect("start");
    transport.open("h1");

    assert_eq!(correlator.cancel(&id).await, Ok(true));
    assert_eq!(correlator.cancel(&id).await, Ok(false));
    transport.content("h1", "late");
    transport.close("h1");

    assert_eq!(recorder.entries(), vec!["h1:open", "h1:close:Cancelled"]);
    assert_eq!(transport.close_calls(), vec![Some(id)]);
}

#[tokio::test]
async fn cancel_after_natural_end_is_a_no_op() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    let id = correlator
        .start(spec("h1"), recorder.listeners("h1"))
        .await
        .expect("start");
    transport.content("h1", "done");
    transport.message("h1", "[DONE]");

    assert_eq!(correlator.cancel(&id).await, Ok(false));
    assert_eq!(
        recorder.entries(),
        vec!["h1:message:done", "h1:complete:done"]
    );
    assert!(transport.close_calls().is_empty());
}

#[tokio::test]
async fn reusing_a_live_identifier_preempts_the_old_session() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    correlator
        .start(spec("h1"), recorder.listeners("old"))
        .await
        .expect("start old");
    transport.open("h1");
    transport.content("h1", "stale");

    correlator
        .start(spec("h1"), recorder.listeners("new"))
        .await
        .expect("start new");
    transport.open("h1");
    transport.content("h1", "fresh");
    transport.message("h1", "[DONE]");

    assert_eq!(
        recorder.entries(),
        vec![
            "old:open",
            "old:message:stale",
            "old:close:Preempted",
            "new:open",
            "new:message:fresh",
            "new:complete:fresh"
        ]
    );
    assert_eq!(transport.request_count(), 2);
    assert_eq!(correlator.bus().listener_count(), 0);
}

#[tokio::test]
async fn cancel_all_clears_registry_and_bus() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    for id in ["a", "b", "c"] {
        correlator
            .start(spec(id), recorder.listeners(id))
            .await
            .expect("start");
    }
    transport.complete("c", None);
    let stray = recorder.clone();
    correlator
        .bus()
        .add_listener("onMessage", move |_| stray.push("global:message".into()));

    assert_eq!(correlator.cancel_all().await, Ok(2));
    assert_eq!(correlator.active_count(), 0);
    assert_eq!(correlator.bus().listener_count(), 0);
    assert_eq!(transport.close_calls(), vec![None]);

    transport.content("a", "stale");
    transport.close("b");

    let mut entries = recorder.entries();
    entries.sort();
    assert_eq!(
        entries,
        vec!["a:close:Cancelled", "b:close:Cancelled", "c:complete:"]
    );
}

#[tokio::test]
async fn error_path_does_not_leak_partial_text() {
    let (correlator, transport) = scripted();
    let failures = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = failures.clone();
    correlator
        .start(
            spec("h1"),
            StreamListeners::new().on_error(move |failure| {
                sink.lock().expect("lock").push(failure.clone())
            }),
        )
        .await
        .expect("start");

    transport.content("h1", "half an ans");
    transport.error("h1", "connection reset");

    assert_eq!(
        *failures.lock().expect("lock"),
        vec![StreamFailure {
            id: "h1".into(),
            message: "connection reset".into()
        }]
    );
    assert!(correlator.accumulated_text(&"h1".into()).is_none());
}

#[tokio::test]
async fn malformed_payloads_are_dropped() {
    let (correlator, _transport) = scripted();
    let recorder = Recorder::new();
    correlator
        .start(spec("h1"), recorder.listeners("h1"))
        .await
        .expect("start");

    correlator
        .bus()
        .emit(EventKind::Message, &serde_json::json!({"hash_id": "h1"}));
    correlator
        .bus()
        .emit(EventKind::Error, &serde_json::json!({"hash_id": "h1", "message": 3}));

    assert!(recorder.entries().is_empty());
    assert!(correlator.is_active(&"h1".into()));
}

#[tokio::test]
async fn non_json_fragments_are_forwarded_without_content() {
    let (correlator, transport) = scripted();
    let deltas = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = deltas.clone();
    correlator
        .start(
            spec("h1"),
            StreamListeners::new().on_message(move |delta| {
                sink.lock().expect("lock").push(delta.clone())
            }),
        )
        .await
        .expect("start");

    transport.message("h1", "keep-alive");
    let deltas = deltas.lock().expect("lock");
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].data, "keep-alive");
    assert_eq!(deltas[0].content, None);
    assert_eq!(deltas[0].accumulated, "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_streams_keep_independent_state() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    let ids: Vec<String> = (0..16).map(|n| format!("req-{n}")).collect();
    for id in &ids {
        correlator
            .start(spec(id), recorder.listeners(id))
            .await
            .expect("start");
    }

    let mut tasks = Vec::new();
    for id in ids.clone() {
        let transport = transport.clone();
        tasks.push(tokio::spawn(async move {
            transport.open(&id);
            for n in 0..10 {
                transport.content(&id, &n.to_string());
                tokio::task::yield_now().await;
            }
            transport.message(&id, "[DONE]");
            transport.close(&id);
        }));
    }
    for task in tasks {
        task.await.expect("emitter task");
    }

    for id in &ids {
        let entries = recorder.entries_for(id);
        assert_eq!(entries.len(), 12, "{id}: {entries:?}");
        assert_eq!(entries[0], format!("{id}:open"));
        assert_eq!(entries[11], format!("{id}:complete:0123456789"));
    }
    assert_eq!(correlator.active_count(), 0);
    assert_eq!(correlator.bus().listener_count(), 0);
}

#[tokio::test]
async fn abandoned_cancel_still_tears_the_session_down() {
    let (correlator, transport) = scripted_with_close_delay(Some(Duration::from_millis(200)));
    let recorder = Recorder::new();
    let id = correlator
        .start(spec("h1"), recorder.listeners("h1"))
        .await
        .expect("start");

    let outcome = tokio::time::timeout(Duration::from_millis(20), correlator.cancel(&id)).await;
    assert!(outcome.is_err(), "close should still be pending");

    assert!(!correlator.is_active(&id));
    assert_eq!(correlator.bus().listener_count(), 0);
    transport.close("h1");
    transport.content("h1", "late");
    assert_eq!(recorder.entries(), vec!["h1:close:Cancelled"]);
}

#[tokio::test]
async fn abandoned_preemption_still_closes_the_old_session() {
    let (correlator, transport) = scripted_with_close_delay(Some(Duration::from_millis(200)));
    let recorder = Recorder::new();
    correlator
        .start(spec("h1"), recorder.listeners("old"))
        .await
        .expect("start old");

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        correlator.start(spec("h1"), recorder.listeners("new")),
    )
    .await;
    assert!(outcome.is_err(), "preemption should still be closing");

    assert_eq!(correlator.active_count(), 0);
    assert_eq!(correlator.bus().listener_count(), 0);
    transport.close("h1");
    assert_eq!(recorder.entries(), vec!["old:close:Preempted"]);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn abandoned_cancel_all_still_clears_everything() {
    let (correlator, _transport) = scripted_with_close_delay(Some(Duration::from_millis(200)));
    let recorder = Recorder::new();
    for id in ["a", "b"] {
        correlator
            .start(spec(id), recorder.listeners(id))
            .await
            .expect("start");
    }

    let outcome = tokio::time::timeout(Duration::from_millis(20), correlator.cancel_all()).await;
    assert!(outcome.is_err());

    assert_eq!(correlator.active_count(), 0);
    assert_eq!(correlator.bus().listener_count(), 0);
    let mut entries = recorder.entries();
    entries.sort();
    assert_eq!(entries, vec!["a:close:Cancelled", "b:close:Cancelled"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_waits_for_an_in_flight_message_callback() {
    let (correlator, transport) = scripted();
    let recorder = Recorder::new();
    let entered = Arc::new(AtomicBool::new(false));
    let (on_message, on_close, flag) = (recorder.clone(), recorder.clone(), entered.clone());
    let id = correlator
        .start(
            spec("h1"),
            StreamListeners::new()
                .on_message(move |_| {
                    flag.store(true, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(100));
                    on_message.push("message".into());
                })
                .on_close(move |notice| on_close.push(format!("close:{:?}", notice.reason))),
        )
        .await
        .expect("start");

    let emitter = {
        let transport = transport.clone();
        tokio::task::spawn_blocking(move || transport.content("h1", "slow"))
    };
    while !entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(correlator.cancel(&id).await, Ok(true));
    emitter.await.expect("emitter");
    transport.content("h1", "late");

    assert_eq!(recorder.entries(), vec!["message", "close:Cancelled"]);
}
