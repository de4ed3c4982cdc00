use super::*;
use crate::dispatch::Disposition;
use crate::mock::{MockTransport, Scripted};
use serde_json::json;

const TEST_TIMEOUT: Duration = Duration::from_millis(100);

fn client_with(
    build: impl FnOnce(Dispatcher) -> MockTransport,
) -> (RpcClient<MockTransport>, MockTransport) {
    let dispatcher = Dispatcher::default();
    let mock = build(dispatcher.clone());
    let client = RpcClient::new(mock.clone(), &dispatcher, TEST_TIMEOUT);
    (client, mock)
}

#[tokio::test]
async fn test_echo_returns_payload_for_every_request_code() {
    let (client, mock) = client_with(MockTransport::echo);
    for op in OpCode::REQUESTS {
        let payload = json!({ "op_name": op.name(), "n": op.wire() });
        let result = client.call(op, payload.clone()).await.unwrap();
        assert_eq!(result, payload, "{}", op);
    }
    assert_eq!(mock.sent_count(), OpCode::REQUESTS.len());
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn test_error_sentinel_becomes_remote_error() {
    let (client, _mock) = client_with(|d| MockTransport::failing(d, "x"));
    let err = client.call(OpCode::DisableUser, json!({ "user_id": 1 })).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == "x"));
    assert!(!err.is_retryable());
}

fn answering(d: Value) -> impl FnOnce(Dispatcher) -> MockTransport {
    move |dispatcher| {
        MockTransport::new(dispatcher, move |_| {
            Scripted::Reply(InboundFrame {
                op: OpCode::Error.wire(),
                d: d.clone(),
                req_id: None,
            })
        })
    }
}

#[tokio::test]
async fn test_error_sentinel_with_bare_string_body() {
    let (client, _mock) = client_with(answering(json!("Invalid OP code")));
    let err = client.call(OpCode::Search, json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == "Invalid OP code"));
}

#[tokio::test]
async fn test_error_sentinel_with_null_body() {
    let (client, _mock) = client_with(answering(Value::Null));
    let err = client.call(OpCode::Search, json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == "null"));
}

#[tokio::test]
async fn test_error_sentinel_with_object_lacking_message() {
    let (client, _mock) = client_with(answering(json!({ "code": 3 })));
    let err = client.call(OpCode::Search, json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == r#"{"code":3}"#));
}

#[tokio::test]
async fn test_error_flag_without_sentinel_is_remote_error() {
    let (client, _mock) = client_with(|d| {
        MockTransport::new(d, |_| {
            Scripted::Reply(InboundFrame {
                op: OpCode::Reply.wire(),
                d: json!({ "error": true, "message": { "code": 404 } }),
                req_id: None,
            })
        })
    });
    let err = client.call(OpCode::EnableUser, json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == r#"{"code":404}"#));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_leaves_no_pending_entry() {
    let (client, mock) = client_with(MockTransport::silent);
    let err = client.call(OpCode::KeyCount, json!({})).await.unwrap_err();

    match &err {
        RpcError::Timeout { op, correlation_id, timeout } => {
            assert_eq!(*op, OpCode::KeyCount);
            assert_eq!(*timeout, TEST_TIMEOUT);
            assert!(!client.registry().contains(correlation_id));
            assert_eq!(
                mock.deliver(correlation_id, InboundFrame::reply(json!(1))),
                Disposition::Dropped
            );
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert!(client.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reverse_order_replies_reach_their_callers() {
    let (client, _mock) = client_with(|d| {
        MockTransport::new(d, |envelope| {
            let delay = match envelope.payload["n"].as_u64() {
                Some(1) => Duration::from_millis(80),
                _ => Duration::from_millis(10),
            };
            Scripted::After(delay, InboundFrame::reply(envelope.payload.clone()))
        })
    });

    let first = client.call(OpCode::Search, json!({ "n": 1 }));
    let second = client.call(OpCode::Search, json!({ "n": 2 }));
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), json!({ "n": 1 }));
    assert_eq!(second.unwrap(), json!({ "n": 2 }));
    assert!(client.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stray_reply_does_not_disturb_pending_call() {
    let (client, mock) = client_with(|d| {
        MockTransport::new(d, |envelope| {
            let reply = InboundFrame::reply(envelope.payload.clone());
            Scripted::After(Duration::from_millis(50), reply)
        })
    });

    let call = client.call(OpCode::UserCount, json!(7));
    let stray = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        mock.deliver("unknown-id", InboundFrame::reply(json!(999)))
    };
    let (result, disposition) = tokio::join!(call, stray);

    assert_eq!(disposition, Disposition::Dropped);
    assert_eq!(result.unwrap(), json!(7));
}

#[tokio::test]
async fn test_key_count_decodes_integer() {
    let (client, mock) =
        client_with(|d| MockTransport::replying(d, vec![(OpCode::KeyCount, json!(42))]));
    assert_eq!(client.key_count().await.unwrap(), 42);
    let sent = mock.sent();
    assert_eq!(sent[0].operation, OpCode::KeyCount);
    assert_eq!(sent[0].payload, json!({}));
}

#[tokio::test]
async fn test_search_decodes_results_and_null() {
    let (client, _mock) = client_with(|d| {
        MockTransport::replying(d, vec![(OpCode::Search, json!({ "kid": "k", "keys": [] }))])
    });
    let results = client.search(&"a".repeat(32)).await.unwrap().unwrap();
    assert!(results.is_empty());

    let (client, _mock) =
        client_with(|d| MockTransport::replying(d, vec![(OpCode::Search, Value::Null)]));
    assert!(client.search(&"a".repeat(32)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_typed_helpers_send_expected_payloads() {
    let (client, mock) = client_with(MockTransport::echo);
    client.disable_users(vec![1, 2]).await.unwrap();
    client
        .update_permissions(5, FlagAction::Add, UserFlag::BetaTester)
        .await
        .unwrap();
    client.reset_api_key(6).await.unwrap();

    let sent = mock.sent();
    assert_eq!(sent[0].operation, OpCode::DisableUserBulk);
    assert_eq!(sent[0].payload, json!({ "user_ids": [1, 2] }));
    assert_eq!(sent[1].operation, OpCode::UpdatePermissions);
    assert_eq!(
        sent[1].payload,
        json!({ "user_id": 5, "permission_action": "add", "permissions": 2 })
    );
    assert_eq!(sent[2].operation, OpCode::ResetApiKey);
}

#[tokio::test]
async fn test_malformed_count_reply() {
    let (client, _mock) =
        client_with(|d| MockTransport::replying(d, vec![(OpCode::UserCount, json!("lots"))]));
    let err = client.user_count().await.unwrap_err();
    assert!(matches!(err, RpcError::MalformedReply(_)));
}

#[tokio::test]
async fn test_error_opcode_is_rejected_before_sending() {
    let (client, mock) = client_with(MockTransport::echo);
    let err = client.call(OpCode::Error, json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidOperation(OpCode::Error)));
    assert_eq!(mock.sent_count(), 0);
}

#[tokio::test]
async fn test_send_failure_is_transport_error_and_cleans_up() {
    let (client, mock) = client_with(MockTransport::echo);
    mock.disconnect();
    let err = client.call(OpCode::KeyCount, json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(TransportError::Closed)));
    assert!(client.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_fails_in_flight_call_at_once() {
    let dispatcher = Dispatcher::default();
    let mock = MockTransport::silent(dispatcher.clone());
    let client = RpcClient::new(mock.clone(), &dispatcher, Duration::from_secs(60));

    let started = tokio::time::Instant::now();
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call(OpCode::KeyCount, json!({})).await }
    });
    while mock.sent_count() == 0 {
        tokio::task::yield_now().await;
    }
    mock.disconnect();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, RpcError::Transport(TransportError::Closed)), "{:?}", err);
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(client.registry().is_empty());

    let err = client.call(OpCode::UserCount, json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(TransportError::Closed)));
    assert_eq!(mock.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reply_route_released_on_every_path() {
    let (client, mock) = client_with(MockTransport::echo);
    client.call(OpCode::KeyCount, json!(1)).await.unwrap();
    assert_eq!(mock.open_routes(), 0);

    let (client, mock) = client_with(MockTransport::silent);
    client.call(OpCode::KeyCount, json!({})).await.unwrap_err();
    assert_eq!(mock.open_routes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_call_releases_reply_route() {
    let (client, mock) = client_with(MockTransport::silent);
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        client.call(OpCode::KeyCount, json!({})),
    )
    .await;
    assert!(abandoned.is_err());

    // The release runs on a spawned task.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(mock.open_routes(), 0);
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_replies() {
    struct Broken;

    #[async_trait::async_trait]
    impl crate::router::InboundHandler for Broken {
        async fn handle(&self, _op: OpCode, _payload: Value) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    let (client, mock) = client_with(MockTransport::echo);
    client.router().register(OpCode::Quarantine, Broken);
    assert_eq!(
        mock.push(OpCode::Quarantine, json!({ "user_id": 1 })),
        Disposition::Routed
    );
    tokio::task::yield_now().await;
    assert_eq!(client.call(OpCode::KeyCount, json!(3)).await.unwrap(), json!(3));
}
