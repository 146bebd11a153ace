mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ticketflow::agent::ActionOrigin;
use ticketflow::prediction::PredictionTask;
use ticketflow::tools::ToolName;
use ticketflow::tracker::Verb;
use ticketflow::SubmissionResult;

const SUBJECT: &str = "SSO login fails";
const BODY: &str = "I cannot log in since this morning.\n\nThanks,\nJane";
const CLEAN_BODY: &str = "I cannot log in since this morning.";

fn well_behaved_turns() -> Vec<String> {
    let cleaned = json!({"subject": SUBJECT, "body": CLEAN_BODY});
    vec![
        turn("clean_text", json!({"subject": SUBJECT, "body": BODY})),
        turn("check_duplicate", cleaned.clone()),
        turn("predict_pipeline", cleaned),
        turn(
            "create_clickup_task",
            json!({
                "subject": SUBJECT,
                "body": CLEAN_BODY,
                "pred": {"priority": "High", "type": "Incident", "department": "IT", "tags": ["Login", "SSO"]}
            }),
        ),
    ]
}

#[tokio::test(start_paused = true)]
async fn sso_ticket_becomes_a_populated_task() {
    let config = config();
    let tracker = MemoryTracker::new();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));
    let model = ScriptedModel::new(well_behaved_turns());

    let run = pipeline
        .agent_with_model(model.clone(), &config)
        .run_with_transcript(SUBJECT, BODY)
        .await;

    assert_eq!(
        run.result.to_json(),
        json!({"ok": true, "task_id": "task-1", "task_url": "https://app.example/t/task-1"})
    );
    assert_eq!(tracker.created_count(), 1);
    let created = tracker.created.lock().unwrap()[0].clone();
    assert_eq!(created["name"], SUBJECT);
    assert_eq!(created["priority"], 2);

    assert_eq!(tracker.field(TYPE_FIELD), Some(json!("t-incident")));
    assert_eq!(tracker.field(DEPARTMENT_FIELD), Some(json!("d-it")));
    // Exact matches leave the description untouched.
    assert_eq!(tracker.description(), CLEAN_BODY);
    assert_eq!(*tracker.tags.lock().unwrap(), vec!["Login", "SSO"]);

    let tools: Vec<ToolName> = run.transcript.records().iter().map(|r| r.tool).collect();
    assert_eq!(
        tools,
        vec![
            ToolName::CleanText,
            ToolName::CheckDuplicate,
            ToolName::PredictPipeline,
            ToolName::CreateClickupTask
        ]
    );
    assert!(run
        .transcript
        .records()
        .iter()
        .all(|r| r.origin == ActionOrigin::Model));
    assert_eq!(model.prompt_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn resubmission_within_ttl_is_rejected_without_a_second_task() {
    let config = config();
    let tracker = MemoryTracker::new();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));

    let first = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;
    assert!(first.is_ok());

    let second = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run_with_transcript(SUBJECT, BODY)
        .await;
    assert_eq!(second.result, SubmissionResult::failed("duplicate_found"));
    assert_eq!(tracker.created_count(), 1);

    let last = second.transcript.records().last().unwrap();
    assert_eq!(last.tool, ToolName::CheckDuplicate);
    assert_eq!(last.observation["reason"], "duplicate_found");
    assert!(last.observation["dup_hash"].is_string());
}

#[tokio::test(start_paused = true)]
async fn stalled_priority_classifier_fails_before_creation() {
    let config = config();
    let tracker = MemoryTracker::new();
    let classifier =
        Arc::new(sso_classifier().stalling(PredictionTask::Priority, Duration::from_secs(30)));
    let pipeline = pipeline(&config, tracker.clone(), classifier.clone());

    let result = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;

    match result {
        SubmissionResult::Failed { reason } => {
            assert!(reason.starts_with("prediction_failed: priority"), "{}", reason);
            assert!(reason.contains("timed out"), "{}", reason);
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    // One attempt plus one retry.
    assert_eq!(classifier.calls_for(PredictionTask::Priority), 2);
    assert_eq!(tracker.created_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn premature_create_is_forced_back_to_clean_text() {
    let config = config();
    let tracker = MemoryTracker::new();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));
    let model = ScriptedModel::new(vec![turn(
        "create_clickup_task",
        json!({"subject": SUBJECT, "body": BODY, "pred": {"type": "Incident"}}),
    )]);

    let run = pipeline
        .agent_with_model(model, &config)
        .run_with_transcript(SUBJECT, BODY)
        .await;

    assert!(run.result.is_ok());
    let first = &run.transcript.records()[0];
    assert_eq!(first.tool, ToolName::CleanText);
    assert_eq!(first.origin, ActionOrigin::Forced);
    assert_eq!(first.thought, "next step is create_clickup_task");
    assert_eq!(tracker.created_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unparseable_replies_still_reach_a_task() {
    let config = config();
    let tracker = MemoryTracker::new();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));
    let model = ScriptedModel::new(vec![
        "```json\n{\"subject\": \"SSO\"}\n```",
        "Action: clean_text",
        "Final Answer: done",
        "Action: drop_tables\nAction Input: {}",
    ]);

    let run = pipeline
        .agent_with_model(model.clone(), &config)
        .run_with_transcript(SUBJECT, BODY)
        .await;

    assert!(run.result.is_ok());
    assert_eq!(run.transcript.len(), 4);
    assert!(run
        .transcript
        .records()
        .iter()
        .all(|r| r.origin == ActionOrigin::Synthesized));
    // Each step re-prompts once before falling back.
    assert_eq!(model.prompt_count(), 8);

    // The synthesized steps carry the cleaned text forward.
    let create = &run.transcript.records()[3];
    assert_eq!(create.input["body"], CLEAN_BODY);
    assert_eq!(create.input["pred"]["type"], "Incident");
    assert_eq!(tracker.field(TYPE_FIELD), Some(json!("t-incident")));
}

#[tokio::test(start_paused = true)]
async fn fuzzy_type_is_written_and_annotated() {
    let config = config();
    let tracker = MemoryTracker::new();
    let classifier = Arc::new(FixedClassifier::new("Normal", "Service Requst", "IT", &[]));
    let pipeline = pipeline(&config, tracker.clone(), classifier);

    let result = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;

    assert!(result.is_ok());
    assert_eq!(tracker.field(TYPE_FIELD), Some(json!("t-request")));
    assert!(tracker
        .description()
        .ends_with("**Predicted Type:** \"Service Requst\" → set to **Service Request**"));
}

#[tokio::test(start_paused = true)]
async fn unmatched_department_fails_after_the_task_exists() {
    let config = config();
    let tracker = MemoryTracker::new();
    let classifier = Arc::new(FixedClassifier::new("Low", "Incident", "Legal", &[]));
    let pipeline = pipeline(&config, tracker.clone(), classifier);

    let result = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;

    match result {
        SubmissionResult::Failed { reason } => {
            assert!(reason.starts_with("clickup_failed: department_set: "), "{}", reason)
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    assert_eq!(tracker.created_count(), 1);
    assert_eq!(tracker.field(TYPE_FIELD), Some(json!("t-incident")));
    assert_eq!(tracker.field(DEPARTMENT_FIELD), None);
}

#[tokio::test(start_paused = true)]
async fn lagging_read_back_is_pending_and_annotated() {
    let config = config();
    let tracker = MemoryTracker::lagging();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));

    let result = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;

    assert!(result.is_ok());
    let description = tracker.description();
    assert!(description.contains("**Predicted Type:** \"Incident\" → set to **Incident** (pending verification)"));
    assert!(description.contains("**Predicted Department:** \"IT\" → set to **IT** (pending verification)"));
}

#[tokio::test(start_paused = true)]
async fn strict_mode_rejects_an_unverified_write() {
    let mut config = config();
    config.reconcile.strict = true;
    let tracker = MemoryTracker::lagging();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));

    let result = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;

    match result {
        SubmissionResult::Failed { reason } => {
            assert!(reason.starts_with("clickup_failed: type_set: "), "{}", reason);
            assert!(reason.contains("not persisted"), "{}", reason);
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    // Read-backs never happen after the wait budget.
    let reads = tracker
        .requests
        .lock()
        .unwrap()
        .iter()
        .filter(|(verb, path)| *verb == Verb::Get && path == "/task/task-1")
        .count();
    assert!((2..=6).contains(&reads), "{} read-backs", reads);
}

#[tokio::test(start_paused = true)]
async fn small_step_budget_ends_incomplete() {
    let mut config = config();
    config.agent.max_steps = Some(2);
    let tracker = MemoryTracker::new();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));

    let run = pipeline
        .agent_with_model(ScriptedModel::silent(), &config)
        .run_with_transcript(SUBJECT, BODY)
        .await;

    assert_eq!(run.result, SubmissionResult::failed("agent_incomplete"));
    assert_eq!(run.transcript.len(), 2);
    assert_eq!(tracker.created_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn blank_ticket_is_rejected_before_any_tool_runs() {
    let config = config();
    let tracker = MemoryTracker::new();
    let pipeline = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));
    let model = ScriptedModel::silent();

    let run = pipeline
        .agent_with_model(model.clone(), &config)
        .run_with_transcript("  ", "\n")
        .await;

    assert_eq!(
        run.result,
        SubmissionResult::failed("prediction_failed: Empty ticket after preprocessing")
    );
    assert!(run.transcript.is_empty());
    assert_eq!(model.prompt_count(), 0);
    assert!(tracker.requests.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_run_does_not_block_a_retry() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.dedup.path = Some(dir.path().join("dup_cache.json"));

    let stalled =
        Arc::new(sso_classifier().stalling(PredictionTask::Department, Duration::from_secs(60)));
    let failing = pipeline(&config, MemoryTracker::new(), stalled);
    let result = failing
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;
    assert!(!result.is_ok());

    let tracker = MemoryTracker::new();
    let healthy = pipeline(&config, tracker.clone(), Arc::new(sso_classifier()));
    let retry = healthy
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;
    assert!(retry.is_ok());

    // A fresh pipeline reads the persisted hash back.
    let reloaded = pipeline(&config, MemoryTracker::new(), Arc::new(sso_classifier()));
    let again = reloaded
        .agent_with_model(ScriptedModel::silent(), &config)
        .run(SUBJECT, BODY)
        .await;
    assert_eq!(again, SubmissionResult::failed("duplicate_found"));
    assert_eq!(tracker.created_count(), 1);
}
