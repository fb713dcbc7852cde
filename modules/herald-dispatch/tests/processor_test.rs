//! Event processor behaviour against in-memory stores and recording channels.

mod harness;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use harness::{payload, Pipeline, DEFAULT_CHAT};
use herald_common::{ActionConfig, Conditions, EventProcessingState, EventType, Payload, Predicate};
use herald_dispatch::{
    Action, ActionError, ActionKind, ProcessError, ProcessOutcome, RenderedAction, TemplateError,
};
use serde_json::json;

use EventProcessingState::{Failed, InProgress, Sent, Success};

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_chat_action_succeeds() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_REGISTERED,
        vec![ActionConfig::new("send_chat_message").with_receiver("chat-123")],
    );

    let msg = pipeline
        .record(EventType::USER_REGISTERED, payload(json!({"username": "alice"})))
        .await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(outcome, ProcessOutcome::Succeeded { executed: 1, skipped: 0 }));
    assert_eq!(pipeline.log.history(msg.id), vec![Sent, InProgress, Success]);

    let calls = pipeline.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].channel, "chat");
    assert_eq!(calls[0].recipient, "chat-123");
    assert_eq!(calls[0].message, "Event user_registered");
}

#[tokio::test]
async fn missing_configuration_fails_without_side_effects() {
    let pipeline = Pipeline::new();

    let msg = pipeline
        .record(EventType::USER_REGISTERED, payload(json!({"username": "alice"})))
        .await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(
        outcome,
        ProcessOutcome::Failed {
            error: ProcessError::NoConfiguration(ref t)
        } if *t == EventType::USER_REGISTERED
    ));
    assert_eq!(pipeline.log.history(msg.id), vec![Sent, InProgress, Failed]);
    assert!(pipeline.calls().is_empty());

    let entry = pipeline.entry(msg.id).await;
    assert!(entry.error.unwrap().contains("user_registered"));
}

#[tokio::test]
async fn second_action_failure_keeps_first_side_effect() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_REGISTERED,
        vec![
            ActionConfig::new("send_chat_message").with_receiver("chat-123"),
            ActionConfig::new("send_sms").with_receiver("+15551234567"),
        ],
    );
    pipeline.sms.set_failing(true);

    let msg = pipeline
        .record(EventType::USER_REGISTERED, payload(json!({"username": "alice"})))
        .await;
    let outcome = pipeline.processor.process_event(&msg).await;

    match outcome {
        ProcessOutcome::Failed { error } => {
            assert_eq!(error.action_index(), Some(1));
            assert!(matches!(
                error,
                ProcessError::Execute {
                    action: ActionKind::SendSms,
                    source: ActionError::Channel(_),
                    ..
                }
            ));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    assert_eq!(pipeline.state(msg.id).await, Some(Failed));
    let calls = pipeline.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].channel, "chat");
}

#[tokio::test]
async fn disabled_action_is_skipped_and_event_succeeds() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_REGISTERED,
        vec![ActionConfig::new("send_chat_message")
            .with_receiver("chat-123")
            .with_conditions(Conditions::AlwaysSkip)],
    );

    let msg = pipeline.record(EventType::USER_REGISTERED, Payload::new()).await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(outcome, ProcessOutcome::Succeeded { executed: 0, skipped: 1 }));
    assert_eq!(pipeline.state(msg.id).await, Some(Success));
    assert!(pipeline.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Ordering and failure boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn actions_run_in_configured_order() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::DECK_COMPLETED,
        vec![
            ActionConfig::new("webhook").with_receiver("https://hooks.example.com/{{ deck }}"),
            ActionConfig::new("send_email")
                .with_receiver("{{ email }}")
                .with_subject("Deck {{ deck }} done")
                .with_message("Well played, {{ username }}"),
            ActionConfig::new("send_sms").with_receiver("{{ phone }}"),
            ActionConfig::new("send_chat_message"),
        ],
    );

    let msg = pipeline
        .record(
            EventType::DECK_COMPLETED,
            payload(json!({
                "username": "alice",
                "email": "alice@example.com",
                "phone": "+15551234567",
                "deck": "starter"
            })),
        )
        .await;
    let outcome = pipeline.processor.process_event(&msg).await;
    assert!(outcome.is_success());

    let calls = pipeline.calls();
    let channels: Vec<&str> = calls.iter().map(|c| c.channel).collect();
    assert_eq!(channels, vec!["webhook", "email", "sms", "chat"]);

    assert_eq!(calls[0].recipient, "https://hooks.example.com/starter");
    assert_eq!(calls[1].recipient, "alice@example.com");
    assert_eq!(calls[1].subject.as_deref(), Some("Deck starter done"));
    assert_eq!(calls[1].message, "Well played, alice");
    assert_eq!(calls[2].subject, None);
    // No receiver configured: the chat action uses the operator chat.
    assert_eq!(calls[3].recipient, DEFAULT_CHAT);
}

#[tokio::test]
async fn nothing_runs_after_the_failing_index() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_REGISTERED,
        vec![
            ActionConfig::new("send_chat_message").with_receiver("c1"),
            ActionConfig::new("send_email").with_receiver("{{ email }}"),
            ActionConfig::new("send_chat_message").with_receiver("c2"),
            ActionConfig::new("send_sms").with_receiver("+15551234567"),
        ],
    );

    // `email` is absent: action #1 fails at rendering.
    let msg = pipeline
        .record(EventType::USER_REGISTERED, payload(json!({"username": "alice"})))
        .await;
    let outcome = pipeline.processor.process_event(&msg).await;

    match outcome {
        ProcessOutcome::Failed {
            error: ProcessError::Render { index, field, source, .. },
        } => {
            assert_eq!(index, 1);
            assert_eq!(field, "receiver");
            assert_eq!(source, TemplateError::MissingVariable("email".into()));
        }
        other => panic!("expected render failure, got {other:?}"),
    }

    let recipients: Vec<String> = pipeline.calls().into_iter().map(|c| c.recipient).collect();
    assert_eq!(recipients, vec!["c1"]);
    assert_eq!(pipeline.state(msg.id).await, Some(Failed));
}

#[tokio::test]
async fn unknown_action_type_fails_at_its_index() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_LOGGED_IN,
        vec![
            ActionConfig::new("send_chat_message").with_receiver("c1"),
            ActionConfig::new("send_pigeon").with_receiver("roof"),
        ],
    );

    let msg = pipeline.record(EventType::USER_LOGGED_IN, Payload::new()).await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(
        outcome,
        ProcessOutcome::Failed { error: ProcessError::Registry { index: 1, .. } }
    ));
    assert_eq!(pipeline.calls().len(), 1);
}

#[tokio::test]
async fn skipped_action_is_never_executed_even_if_unresolvable() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_LOGGED_IN,
        vec![
            ActionConfig::new("send_pigeon").with_conditions(Conditions::AlwaysSkip),
            ActionConfig::new("send_email")
                .with_receiver("{{ missing }}")
                .with_conditions(Conditions::AlwaysSkip),
        ],
    );

    let msg = pipeline.record(EventType::USER_LOGGED_IN, Payload::new()).await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(outcome, ProcessOutcome::Succeeded { executed: 0, skipped: 2 }));
    assert!(pipeline.calls().is_empty());
}

#[tokio::test]
async fn predicate_conditions_are_treated_as_always_run() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::SEASON_STARTED,
        vec![ActionConfig::new("send_chat_message")
            .with_receiver("c1")
            .with_conditions(Conditions::Predicates(vec![Predicate {
                field: "level".into(),
                operator: "gt".into(),
                value: json!(1000),
            }]))],
    );

    let msg = pipeline
        .record(EventType::SEASON_STARTED, payload(json!({"level": 1})))
        .await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(outcome, ProcessOutcome::Succeeded { executed: 1, .. }));
}

#[tokio::test]
async fn empty_action_list_succeeds() {
    let pipeline = Pipeline::new();
    pipeline.configure(EventType::SEASON_STARTED, vec![]);

    let msg = pipeline.record(EventType::SEASON_STARTED, Payload::new()).await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(outcome, ProcessOutcome::Succeeded { executed: 0, skipped: 0 }));
    assert_eq!(pipeline.state(msg.id).await, Some(Success));
}

#[tokio::test]
async fn missing_receiver_is_an_action_failure() {
    let pipeline = Pipeline::new();
    pipeline.configure(EventType::USER_REGISTERED, vec![ActionConfig::new("send_sms")]);

    let msg = pipeline.record(EventType::USER_REGISTERED, Payload::new()).await;
    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(
        outcome,
        ProcessOutcome::Failed {
            error: ProcessError::Execute {
                source: ActionError::MissingReceiver {
                    action: ActionKind::SendSms
                },
                ..
            }
        }
    ));
}

// ---------------------------------------------------------------------------
// Redelivery and log failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn redelivery_overwrites_the_same_row() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_REGISTERED,
        vec![ActionConfig::new("send_sms").with_receiver("+15551234567")],
    );

    let msg = pipeline.record(EventType::USER_REGISTERED, Payload::new()).await;

    pipeline.sms.set_failing(true);
    assert!(!pipeline.processor.process_event(&msg).await.is_success());
    assert_eq!(pipeline.state(msg.id).await, Some(Failed));

    pipeline.sms.set_failing(false);
    assert!(pipeline.processor.process_event(&msg).await.is_success());

    assert_eq!(pipeline.log.len(), 1);
    let entry = pipeline.entry(msg.id).await;
    assert_eq!(entry.state, Success);
    assert_eq!(entry.error, None);
    assert_eq!(
        pipeline.log.history(msg.id),
        vec![Sent, InProgress, Failed, InProgress, Success]
    );
}

#[tokio::test]
async fn in_progress_write_failure_skips_actions() {
    let pipeline = Pipeline::new();
    pipeline.configure(
        EventType::USER_REGISTERED,
        vec![ActionConfig::new("send_chat_message").with_receiver("c1")],
    );

    let msg = pipeline.record(EventType::USER_REGISTERED, Payload::new()).await;
    pipeline.log.set_fail_writes(true);

    let outcome = pipeline.processor.process_event(&msg).await;

    assert!(matches!(
        outcome,
        ProcessOutcome::Failed { error: ProcessError::LogWrite(_) }
    ));
    assert!(pipeline.calls().is_empty());
    assert_eq!(pipeline.state(msg.id).await, Some(Sent));
}

// ---------------------------------------------------------------------------
// Custom actions
// ---------------------------------------------------------------------------

/// Counts invocations and sees the execution context.
struct CountingWebhook {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Action for CountingWebhook {
    fn kind(&self) -> ActionKind {
        ActionKind::Webhook
    }

    async fn execute(
        &self,
        params: &RenderedAction,
        context: &Payload,
    ) -> Result<(), ActionError> {
        assert_eq!(params.message, "level 7");
        assert!(context.contains_key("event_id"));
        assert_eq!(context["event_type"], json!("season_started"));
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn registered_action_replaces_standard_one() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counting = Arc::new(CountingWebhook { runs: runs.clone() });
    let pipeline = Pipeline::with_registry(|registry| registry.with(counting));
    pipeline.configure(
        EventType::SEASON_STARTED,
        vec![ActionConfig::new("ActionWebhook").with_message("level {{ level }}")],
    );

    let msg = pipeline
        .record(EventType::SEASON_STARTED, payload(json!({"level": 7})))
        .await;
    assert!(pipeline.processor.process_event(&msg).await.is_success());

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(pipeline.calls().is_empty());
}
