use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use code_digest_core::analysis::{AnalysisClient, AnalysisFailure, RemoteErrorKind, RetryPolicy};
use code_digest_core::config::FlowConfig;
use code_digest_core::contract::{FlowEvent, FlowEventStream, InvokeError, MockFlowInvoker};
use futures::StreamExt;

fn flow() -> FlowConfig {
    FlowConfig {
        flow_id: "flow-123".to_string(),
        flow_alias_id: "alias-456".to_string(),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

fn stream_of(events: Vec<Result<FlowEvent, InvokeError>>) -> FlowEventStream {
    futures::stream::iter(events).boxed()
}

fn output(text: &str) -> Result<FlowEvent, InvokeError> {
    Ok(FlowEvent::Output(Some(text.to_string())))
}

fn client(invoker: MockFlowInvoker) -> AnalysisClient<MockFlowInvoker> {
    AnalysisClient::new(invoker, flow()).with_retry_policy(fast_retry())
}

#[test]
fn backoff_doubles_per_attempt() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.backoff(0), Duration::from_secs(1));
    assert_eq!(policy.backoff(1), Duration::from_secs(2));
}

#[test]
fn only_access_denied_and_internal_server_are_transient() {
    assert!(RemoteErrorKind::AccessDenied.is_transient());
    assert!(RemoteErrorKind::InternalServer.is_transient());
    for kind in [
        RemoteErrorKind::Throttling,
        RemoteErrorKind::Validation,
        RemoteErrorKind::ResourceNotFound,
        RemoteErrorKind::Transport,
        RemoteErrorKind::Unknown,
    ] {
        assert!(!kind.is_transient(), "{kind} should not be retried");
    }
}

#[tokio::test]
async fn sends_document_to_the_configured_flow() {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(1).returning(|request| {
        assert_eq!(request.flow_identifier, "flow-123");
        assert_eq!(request.flow_alias_identifier, "alias-456");
        assert_eq!(request.document, "print('hi')");
        Ok(stream_of(vec![output("# Result")]))
    });

    let result = client(invoker).analyze("print('hi')", "a.py").await;
    assert_eq!(result, Ok("# Result".to_string()));
}

#[tokio::test]
async fn transient_errors_are_retried_until_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(3).returning(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(InvokeError::new(RemoteErrorKind::InternalServer, "try again")),
            1 => Err(InvokeError::new(RemoteErrorKind::AccessDenied, "try again")),
            _ => Ok(stream_of(vec![output("# Recovered")])),
        }
    });

    let result = client(invoker).analyze("code", "a.py").await;
    assert_eq!(result, Ok("# Recovered".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn waits_one_then_two_base_delays_between_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(3).returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(InvokeError::new(RemoteErrorKind::InternalServer, "try again"))
        } else {
            Ok(stream_of(vec![output("# Result")]))
        }
    });
    let client = AnalysisClient::new(invoker, flow()).with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
    });

    let start = tokio::time::Instant::now();
    let result = client.analyze("code", "a.py").await;

    assert_eq!(result, Ok("# Result".to_string()));
    assert_eq!(tokio::time::Instant::now() - start, Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn no_wait_after_the_final_attempt() {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(3).returning(|_| {
        Err(InvokeError::new(RemoteErrorKind::AccessDenied, "denied"))
    });
    let client = AnalysisClient::new(invoker, flow()).with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
    });

    let start = tokio::time::Instant::now();
    let failure = client.analyze("code", "a.py").await.unwrap_err();

    assert_eq!(failure.attempts(), 3);
    assert_eq!(tokio::time::Instant::now() - start, Duration::from_secs(3));
}

#[tokio::test]
async fn gives_up_after_three_transient_failures() {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(3).returning(|_| {
        Err(InvokeError::new(RemoteErrorKind::InternalServer, "still down"))
    });

    let failure = client(invoker).analyze("code", "a.py").await.unwrap_err();
    assert_eq!(failure.attempts(), 3);
    match failure {
        AnalysisFailure::RetriesExhausted { error, .. } => {
            assert_eq!(error.kind, RemoteErrorKind::InternalServer)
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn non_transient_errors_fail_immediately() {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(1).returning(|_| {
        Err(InvokeError::new(RemoteErrorKind::Throttling, "slow down"))
    });

    let failure = client(invoker).analyze("code", "a.py").await.unwrap_err();
    assert_eq!(failure.attempts(), 1);
    assert!(matches!(failure, AnalysisFailure::Remote(ref e) if e.kind == RemoteErrorKind::Throttling));
    assert!(failure.to_string().contains("ThrottlingException"));
}

#[tokio::test]
async fn keeps_the_last_non_empty_chunk() {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(1).returning(|_| {
        Ok(stream_of(vec![
            output("partial"),
            output(""),
            Ok(FlowEvent::Other),
            output("final"),
            Ok(FlowEvent::Output(None)),
            Ok(FlowEvent::Completion("SUCCESS".to_string())),
        ]))
    });

    let result = client(invoker).analyze("code", "a.py").await;
    assert_eq!(result, Ok("final".to_string()));
}

#[tokio::test]
async fn empty_output_is_a_failure_without_retry() {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(1).returning(|_| {
        Ok(stream_of(vec![
            output(""),
            Ok(FlowEvent::Completion("SUCCESS".to_string())),
        ]))
    });

    let failure = client(invoker).analyze("code", "a.py").await.unwrap_err();
    assert_eq!(failure, AnalysisFailure::EmptyOutput);
    assert_eq!(failure.to_string(), "Empty output from flow");
}

#[tokio::test]
async fn transient_error_mid_stream_restarts_the_invocation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(2).returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(stream_of(vec![
                output("half an answer"),
                Err(InvokeError::new(RemoteErrorKind::AccessDenied, "stream dropped")),
            ]))
        } else {
            Ok(stream_of(vec![output("whole answer")]))
        }
    });

    let result = client(invoker).analyze("code", "a.py").await;
    assert_eq!(result, Ok("whole answer".to_string()));
}

#[tokio::test]
async fn non_transient_error_mid_stream_discards_partial_output() {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(1).returning(|_| {
        Ok(stream_of(vec![
            output("half an answer"),
            Err(InvokeError::new(RemoteErrorKind::Validation, "bad input")),
        ]))
    });

    let failure = client(invoker).analyze("code", "a.py").await.unwrap_err();
    assert!(matches!(failure, AnalysisFailure::Remote(_)));
}
