//! Host context tests, mostly driven end to end against a real worker context

use std::collections::HashMap;
use std::sync::Arc;

use maplit::hashmap;

use super::*;
use crate::fetch::StaticFetcher;
use crate::protocol::{pair, Endpoint};
use crate::storage::MemoryStore;
use crate::stream::ConsoleEvent;
use crate::types::INTERACTIVE_SENTINEL;
use crate::worker::WorkerContext;

fn host_with(
    endpoint: Endpoint,
    resources: HashMap<String, Vec<u8>>,
    options: HostOptions,
) -> HostContext {
    let Endpoint { outbox, inbox } = endpoint;
    let host = HostContext::new(
        outbox,
        Box::new(MemoryStore::new()),
        Arc::new(StaticFetcher::new(resources)),
        options,
    );
    tokio::spawn(serve(host.clone(), inbox));
    host
}

/// Worker context whose inbox is pumped in the background.
fn worker(endpoint: Endpoint) -> WorkerContext {
    let Endpoint { outbox, mut inbox } = endpoint;
    let context = WorkerContext::new(outbox, INTERACTIVE_SENTINEL);
    let pump = context.clone();
    tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            pump.dispatch(message).await;
        }
        pump.abandon_pending().await;
    });
    context
}

fn bridge(resources: HashMap<String, Vec<u8>>, options: HostOptions) -> (HostContext, WorkerContext) {
    let (worker_end, host_end) = pair();
    (host_with(host_end, resources, options), worker(worker_end))
}

#[tokio::test]
async fn test_prompt_output_is_visible_while_read_waits() {
    let (host, worker) = bridge(HashMap::new(), HostOptions::default());
    let mut events = host.console().subscribe();
    let h = Handle(3);
    worker.bind(h, "<sys>").await.unwrap();

    let reader = tokio::spawn({
        let worker = worker.clone();
        async move { (worker.read(h).await, worker.read(h).await) }
    });
    assert_eq!(events.recv().await.unwrap(), ConsoleEvent::Prompt);

    // The read is still suspended, yet output flows.
    worker.write(h, b'>').await.unwrap();
    assert_eq!(events.recv().await.unwrap(), ConsoleEvent::Output(b">".to_vec()));
    assert_eq!(host.transcript(), ">");

    assert_eq!(host.deliver_input("5\n"), 1);
    let (first, second) = reader.await.unwrap();
    assert_eq!(first, Ok(Some(b'5')));
    assert_eq!(second, Ok(Some(b'\n')));
}

#[tokio::test]
async fn test_persistent_round_trip() {
    let (host, worker) = bridge(HashMap::new(), HostOptions::default());
    let h = Handle(5);
    worker.bind(h, "scores").await.unwrap();
    worker.write_all(h, b"42").await.unwrap();

    assert_eq!(worker.read(h).await, Ok(Some(b'4')));
    assert_eq!(worker.read(h).await, Ok(Some(b'2')));
    assert_eq!(worker.read(h).await, Ok(None));
    assert_eq!(host.stored("scores").await, Ok(Some(b"42".to_vec())));
}

#[tokio::test]
async fn test_rebind_isolates_targets() {
    let (host, worker) = bridge(HashMap::new(), HostOptions::default());
    let h = Handle(5);
    worker.bind(h, "a").await.unwrap();
    worker.write(h, b'x').await.unwrap();

    worker.bind(h, "b").await.unwrap();
    assert_eq!(worker.read(h).await, Ok(None));

    assert_eq!(host.stored("a").await, Ok(Some(b"x".to_vec())));
    assert_eq!(host.stored("b").await, Ok(None));
}

#[tokio::test]
async fn test_remote_reads_serve_fetched_body() {
    let resources = hashmap! {
        "file://greeting".to_string() => b"hi".to_vec(),
    };
    let (host, worker) = bridge(resources, HostOptions::default());
    let h = Handle(8);
    worker.bind(h, "file://greeting").await.unwrap();

    assert_eq!(worker.read(h).await, Ok(Some(b'h')));
    assert_eq!(worker.read(h).await, Ok(Some(b'i')));
    assert_eq!(worker.read(h).await, Ok(None));

    // Writes to a remote resource are accepted and ignored.
    worker.write(h, b'!').await.unwrap();
    assert_eq!(worker.read(h).await, Ok(None));
    assert_eq!(host.stream_kind(h).await, Ok(StreamKind::Remote));
}

#[tokio::test]
async fn test_missing_remote_resource_reads_as_exhausted() {
    let (_host, worker) = bridge(HashMap::new(), HostOptions::default());
    worker.bind(Handle(8), "file://missing").await.unwrap();
    assert_eq!(worker.read(Handle(8)).await, Ok(None));
}

#[tokio::test]
async fn test_echo_input_appends_line_to_transcript() {
    let options = HostOptions {
        echo_input: true,
        ..HostOptions::default()
    };
    let (host, worker) = bridge(HashMap::new(), options);
    let mut events = host.console().subscribe();
    worker.bind(Handle(1), "<sys>").await.unwrap();

    let reader = tokio::spawn({
        let worker = worker.clone();
        async move { worker.read(Handle(1)).await }
    });
    assert_eq!(events.recv().await.unwrap(), ConsoleEvent::Prompt);
    host.deliver_input("yes");

    assert_eq!(reader.await.unwrap(), Ok(Some(b'y')));
    assert_eq!(host.transcript(), "yes\n");
}

#[tokio::test]
async fn test_echo_keeps_a_single_terminator() {
    let options = HostOptions {
        echo_input: true,
        ..HostOptions::default()
    };
    let (host, worker) = bridge(HashMap::new(), options);
    let mut events = host.console().subscribe();
    worker.bind(Handle(1), "<sys>").await.unwrap();

    let reader = tokio::spawn({
        let worker = worker.clone();
        async move { worker.read(Handle(1)).await }
    });
    assert_eq!(events.recv().await.unwrap(), ConsoleEvent::Prompt);
    host.deliver_input("5\r\n");

    assert_eq!(reader.await.unwrap(), Ok(Some(b'5')));
    assert_eq!(worker.read(Handle(1)).await, Ok(Some(b'\n')));
    assert_eq!(host.transcript(), "5\n");
}

#[tokio::test]
async fn test_host_bind_reaches_worker() {
    let (mut worker_end, host_end) = pair();
    let host = host_with(host_end, HashMap::new(), HostOptions::default());

    host.bind(Handle(2), "notes").await.unwrap();
    assert_eq!(worker_end.inbox.recv().await.unwrap(), Message::bind(Handle(2), "notes"));
    assert_eq!(host.stream_kind(Handle(2)).await, Ok(StreamKind::Persistent));
}

#[tokio::test]
async fn test_run_and_completion() {
    let (mut worker_end, host_end) = pair();
    let host = host_with(host_end, HashMap::new(), HostOptions::default());

    host.load_archive(b"module \"main\"".to_vec()).unwrap();
    host.run(Some("main".to_string())).unwrap();
    assert_eq!(
        worker_end.inbox.recv().await.unwrap(),
        Message::LoadJar(b"module \"main\"".to_vec())
    );
    assert_eq!(
        worker_end.inbox.recv().await.unwrap(),
        Message::Run(Some("main".to_string()))
    );
    assert!(host.outcome().is_none());

    worker_end.outbox.send(Message::Run(Some("done".to_string()))).unwrap();
    let outcome = host.wait_for_completion().await.unwrap();
    assert_eq!(outcome.report, "done");
    assert_eq!(host.outcome().map(|o| o.report), Some("done".to_string()));
}

#[tokio::test]
async fn test_output_for_unbound_handle_is_dropped() {
    let (_worker_end, host_end) = pair();
    let host = HostContext::new(
        host_end.outbox,
        Box::new(MemoryStore::new()),
        Arc::new(StaticFetcher::default()),
        HostOptions::default(),
    );

    host.dispatch(Message::output(Handle(9), b"lost")).await;
    host.dispatch(Message::input_response(Handle(9), b"wrong way")).await;
    assert_eq!(host.transcript(), "");
    assert_eq!(
        host.stream_kind(Handle(9)).await,
        Err(crate::error::BridgeError::UnboundHandle(Handle(9)))
    );
}
