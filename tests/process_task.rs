// tests/process_task.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;

use caseflow::case::{NodeId, NodeState, Transition};
use caseflow::engine::CaseService;
use caseflow::errors::CaseError;
use caseflow::model::{CaseDefinition, PlanItem};
use caseflow::process::{ProcessEngine, SpawnRequest};
use caseflow::types::{CaseInstanceId, ProcessHandle};
use caseflow_test_utils::builders::{
    automatic_process_task_case, EngineConfigBuilder, one_process_task_and_one_human_task_case,
    one_process_task_case, DEFINITION_KEY, HUMAN_TASK_KEY, PROCESS_DEFINITION_KEY,
    PROCESS_TASK_KEY, TWO_TASK_DEFINITION_KEY,
};
use caseflow_test_utils::{
    init_tracing, service_with_fake_engine, with_timeout, FakeProcessEngine,
};

type TestResult = Result<(), Box<dyn Error>>;

type Setup = (CaseService, FakeProcessEngine, CaseInstanceId);

async fn one_task_setup() -> Result<Setup, Box<dyn Error>> {
    init_tracing();
    let (service, engine) = service_with_fake_engine(&[PROCESS_DEFINITION_KEY]);
    service.deploy(one_process_task_case()).await;
    let case = service
        .create_case_instance(DEFINITION_KEY, BTreeMap::new())
        .await?;
    Ok((service, engine, case))
}

async fn task_id(service: &CaseService, case: CaseInstanceId) -> Result<NodeId, CaseError> {
    Ok(service.query_node(case, PROCESS_TASK_KEY).await?.id)
}

#[tokio::test]
async fn test_manual_start() -> TestResult {
    let (service, engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    assert_eq!(engine.start_count(), 0);

    service.with_case_execution(case, task).manual_start().await?;

    let starts = engine.starts();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].request.case_instance_id, case);
    assert_eq!(starts[0].request.definition_key, PROCESS_DEFINITION_KEY);
    assert_eq!(starts[0].request.node, task);

    let node = service.query_node(case, PROCESS_TASK_KEY).await?;
    assert!(node.is_active());
    assert_eq!(node.binding.as_ref(), Some(&starts[0].handle));
    Ok(())
}

#[tokio::test]
async fn test_manual_start_with_variables() -> TestResult {
    let (service, engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service
        .with_case_execution(case, task)
        .set_variable("aVariableName", "abc")
        .set_variable("anotherVariableName", 999)
        .manual_start()
        .await?;

    // Case-wide variables live on the root.
    let instances = service.variable_instances(case).await?;
    assert_eq!(instances.len(), 2);
    for variable in &instances {
        assert_eq!(variable.activity_id, DEFINITION_KEY);
        match variable.name.as_str() {
            "aVariableName" => assert_eq!(variable.value, json!("abc")),
            "anotherVariableName" => assert_eq!(variable.value, json!(999)),
            other => panic!("unexpected variable {other}"),
        }
    }

    let start = engine.start_for(PROCESS_TASK_KEY).expect("process started");
    assert_eq!(start.request.variables["aVariableName"], json!("abc"));
    assert_eq!(start.request.variables["anotherVariableName"], json!(999));
    Ok(())
}

#[tokio::test]
async fn test_manual_start_with_local_variables() -> TestResult {
    let (service, engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    let mut variables = BTreeMap::new();
    variables.insert("aVariableName".to_string(), json!("abc"));
    variables.insert("anotherVariableName".to_string(), json!(999));

    service
        .with_case_execution(case, task)
        .set_variables_local(variables)
        .manual_start()
        .await?;

    let instances = service.variable_instances(case).await?;
    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|v| v.node == task));
    assert!(service.visible_variables(case, NodeId::ROOT).await?.is_empty());

    let start = engine.start_for(PROCESS_TASK_KEY).expect("process started");
    assert_eq!(start.request.variables.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_reenable_an_enabled_process_task() -> TestResult {
    let (service, engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    let err = service
        .with_case_execution(case, task)
        .reenable()
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert_eq!(engine.start_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_reenable_a_disabled_process_task() -> TestResult {
    init_tracing();
    // Disabling the only task would complete the case, so use a case with a
    // human task next to it.
    let (service, _engine) = service_with_fake_engine(&[PROCESS_DEFINITION_KEY]);
    service.deploy(one_process_task_and_one_human_task_case()).await;
    let case = service
        .create_case_instance(TWO_TASK_DEFINITION_KEY, BTreeMap::new())
        .await?;
    let task = task_id(&service, case).await?;

    service.with_case_execution(case, task).disable().await?;
    service.with_case_execution(case, task).reenable().await?;

    assert!(service.query_node(case, PROCESS_TASK_KEY).await?.is_enabled());
    Ok(())
}

#[tokio::test]
async fn test_reenable_after_case_completed() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.with_case_execution(case, task).disable().await?;
    assert!(service.is_completed(case).await?);

    let err = service
        .with_case_execution(case, task)
        .reenable()
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert!(service.query_node(case, PROCESS_TASK_KEY).await?.is_disabled());
    Ok(())
}

#[tokio::test]
async fn test_reenable_an_active_process_task() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.with_case_execution(case, task).manual_start().await?;
    let err = service
        .with_case_execution(case, task)
        .reenable()
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    Ok(())
}

#[tokio::test]
async fn test_disable_a_disabled_process_task() -> TestResult {
    init_tracing();
    let (service, _engine) = service_with_fake_engine(&[PROCESS_DEFINITION_KEY]);
    service.deploy(one_process_task_and_one_human_task_case()).await;
    let case = service
        .create_case_instance(TWO_TASK_DEFINITION_KEY, BTreeMap::new())
        .await?;
    let task = task_id(&service, case).await?;

    service.transition(case, task, Transition::Disable).await?;
    assert!(service.query_node(case, PROCESS_TASK_KEY).await?.is_disabled());

    let err = service
        .transition(case, task, Transition::Disable)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    Ok(())
}

#[tokio::test]
async fn test_disable_an_active_process_task() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.transition(case, task, Transition::ManualStart).await?;
    let err = service
        .transition(case, task, Transition::Disable)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert!(service.query_node(case, PROCESS_TASK_KEY).await?.is_active());
    Ok(())
}

#[tokio::test]
async fn test_manual_start_of_a_disabled_process_task() -> TestResult {
    init_tracing();
    let (service, engine) = service_with_fake_engine(&[PROCESS_DEFINITION_KEY]);
    service.deploy(one_process_task_and_one_human_task_case()).await;
    let case = service
        .create_case_instance(TWO_TASK_DEFINITION_KEY, BTreeMap::new())
        .await?;
    let task = task_id(&service, case).await?;

    service.transition(case, task, Transition::Disable).await?;
    let err = service
        .transition(case, task, Transition::ManualStart)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert_eq!(engine.start_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_manual_start_of_an_active_process_task() -> TestResult {
    let (service, engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.transition(case, task, Transition::ManualStart).await?;
    let err = service
        .transition(case, task, Transition::ManualStart)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert_eq!(engine.start_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_complete_is_not_a_caller_operation_for_process_tasks() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.with_case_execution(case, task).manual_start().await?;
    let err = service
        .with_case_execution(case, task)
        .complete()
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    Ok(())
}

#[tokio::test]
async fn test_complete_process_instance_should_complete_process_task() -> TestResult {
    let (service, engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.with_case_execution(case, task).manual_start().await?;
    let start = engine.start_for(PROCESS_TASK_KEY).expect("process started");

    with_timeout(engine.complete(&start.handle)).await?;

    // Queries go through the same inbox, after the notification.
    let node = service.query_node(case, PROCESS_TASK_KEY).await?;
    assert!(node.is_completed());
    assert!(service.is_completed(case).await?);

    // A duplicate notification is a no-op.
    engine.complete(&start.handle).await?;
    assert!(service.is_completed(case).await?);
    Ok(())
}

#[tokio::test]
async fn test_disable_should_complete_case_instance() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.with_case_execution(case, task).disable().await?;

    let snapshot = service.snapshot(case).await?;
    assert!(snapshot.completed);
    assert_eq!(
        snapshot.node(PROCESS_TASK_KEY).map(|n| n.state),
        Some(NodeState::Disabled)
    );
    Ok(())
}

#[tokio::test]
async fn test_complete_an_enabled_process_task() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    let err = service
        .with_case_execution(case, task)
        .complete()
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    Ok(())
}

#[tokio::test]
async fn test_close_an_enabled_process_task() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    let err = service
        .with_case_execution(case, task)
        .close()
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert!(service.query_node(case, PROCESS_TASK_KEY).await?.is_enabled());
    Ok(())
}

#[tokio::test]
async fn test_illegal_transition_writes_no_variables() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    let err = service
        .with_case_execution(case, task)
        .set_variable("aVariableName", "abc")
        .set_variable_local("local", true)
        .complete()
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());
    assert!(service.variable_instances(case).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_set_variable_without_transition() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.set_variable(case, task, "shared", "value", false).await?;
    service.set_variable(case, task, "mine", 1, true).await?;
    service.with_case_execution(case, task).set_variable("more", json!([1, 2])).execute().await?;

    assert_eq!(
        service.get_variable(case, NodeId::ROOT, "shared").await?,
        Some(json!("value"))
    );
    assert_eq!(service.get_variable(case, task, "mine").await?, Some(json!(1)));
    assert_eq!(
        service.get_variable(case, NodeId::ROOT, "mine").await?,
        None
    );
    assert_eq!(service.visible_variables(case, task).await?.len(), 3);

    // Node state untouched by pure variable commands.
    assert!(service.query_node(case, PROCESS_TASK_KEY).await?.is_enabled());
    Ok(())
}

#[tokio::test]
async fn test_process_failure_leaves_case_open_until_terminated() -> TestResult {
    let (service, engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;

    service.transition(case, task, Transition::ManualStart).await?;
    let start = engine.start_for(PROCESS_TASK_KEY).expect("process started");
    engine.fail(&start.handle, "incident").await?;

    let node = service.query_node(case, PROCESS_TASK_KEY).await?;
    assert_eq!(node.state, NodeState::Failed);
    assert_eq!(node.binding, None);
    assert!(!service.is_completed(case).await?);

    service.transition(case, task, Transition::Terminate).await?;
    assert!(service.is_completed(case).await?);
    Ok(())
}

#[tokio::test]
async fn test_unknown_process_definition_keeps_task_active_for_retry() -> TestResult {
    init_tracing();
    // The fake engine knows nothing at first.
    let (service, engine) = service_with_fake_engine(&[]);
    service.deploy(one_process_task_case()).await;
    let case = service
        .create_case_instance(DEFINITION_KEY, BTreeMap::new())
        .await?;
    let task = task_id(&service, case).await?;

    let err = service
        .transition(case, task, Transition::ManualStart)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::DefinitionNotFound(ref key) if key == PROCESS_DEFINITION_KEY));

    let node = service.query_node(case, PROCESS_TASK_KEY).await?;
    assert!(node.is_active());
    assert_eq!(node.binding, None);
    assert_eq!(engine.rejected(), vec![PROCESS_DEFINITION_KEY.to_string()]);

    // Still unknown: retry fails the same way.
    let err = service.retry_spawn(case, task).await.unwrap_err();
    assert!(matches!(err, CaseError::DefinitionNotFound(_)));

    // The operator deploys the process; the retry now binds the task.
    engine.register(PROCESS_DEFINITION_KEY);
    service.retry_spawn(case, task).await?;

    let start = engine.start_for(PROCESS_TASK_KEY).expect("process started on retry");
    let node = service.query_node(case, PROCESS_TASK_KEY).await?;
    assert_eq!(node.binding, Some(start.handle.clone()));

    engine.complete(&start.handle).await?;
    assert!(service.is_completed(case).await?);
    Ok(())
}

#[tokio::test]
async fn test_retry_spawn_requires_an_unbound_active_task() -> TestResult {
    init_tracing();
    let (service, engine) = service_with_fake_engine(&[PROCESS_DEFINITION_KEY]);
    service.deploy(one_process_task_case()).await;
    let case = service
        .create_case_instance(DEFINITION_KEY, BTreeMap::new())
        .await?;
    let task = task_id(&service, case).await?;

    // Nothing to retry while the task is still enabled.
    let err = service.retry_spawn(case, task).await.unwrap_err();
    assert!(matches!(err, CaseError::NotAwaitingSpawn(_)));

    service.transition(case, task, Transition::ManualStart).await?;
    let err = service.retry_spawn(case, task).await.unwrap_err();
    assert!(matches!(err, CaseError::NotAwaitingSpawn(_)));
    assert_eq!(engine.start_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_human_task_sibling_keeps_case_open() -> TestResult {
    init_tracing();
    let (service, engine) = service_with_fake_engine(&[PROCESS_DEFINITION_KEY]);
    service.deploy(one_process_task_and_one_human_task_case()).await;
    let case = service
        .create_case_instance(TWO_TASK_DEFINITION_KEY, BTreeMap::new())
        .await?;
    let task = task_id(&service, case).await?;
    let human = service.query_node(case, HUMAN_TASK_KEY).await?.id;

    service.transition(case, task, Transition::ManualStart).await?;
    let start = engine.start_for(PROCESS_TASK_KEY).expect("process started");
    engine.complete(&start.handle).await?;
    assert!(!service.is_completed(case).await?);

    service.transition(case, human, Transition::ManualStart).await?;
    service.transition(case, human, Transition::Complete).await?;
    assert!(service.is_completed(case).await?);

    let root = NodeId::ROOT;
    service.transition(case, root, Transition::Close).await?;

    // A closed case is gone from the service.
    assert!(service.case_instance_ids().await.is_empty());
    let err = service.snapshot(case).await.unwrap_err();
    assert!(matches!(err, CaseError::CaseInstanceNotFound(id) if id == case));
    Ok(())
}

#[tokio::test]
async fn test_failed_automatic_spawn_fails_creation() -> TestResult {
    init_tracing();
    let (service, engine) = service_with_fake_engine(&[]);
    service
        .deploy(automatic_process_task_case("autoCase", "missingProcess"))
        .await;

    let err = service
        .create_case_instance("autoCase", BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::DefinitionNotFound(_)));
    assert!(service.case_instance_ids().await.is_empty());
    // The unknown key is caught before the engine is asked to spawn.
    assert!(engine.rejected().is_empty());
    assert_eq!(engine.start_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_automatic_spawn_binds_at_creation() -> TestResult {
    init_tracing();
    let (service, engine) = service_with_fake_engine(&["autoProcess"]);
    service
        .deploy(automatic_process_task_case("autoCase", "autoProcess"))
        .await;

    let mut variables = BTreeMap::new();
    variables.insert("input".to_string(), json!({ "id": 1 }));
    let case = service.create_case_instance("autoCase", variables).await?;

    let node = service.query_node(case, PROCESS_TASK_KEY).await?;
    assert!(node.is_active());
    let start = engine.start_for(PROCESS_TASK_KEY).expect("spawned at creation");
    assert_eq!(node.binding, Some(start.handle.clone()));
    assert_eq!(start.request.variables["input"], json!({ "id": 1 }));

    engine.complete(&start.handle).await?;
    assert!(service.is_completed(case).await?);
    Ok(())
}

#[tokio::test]
async fn test_unknown_case_definition_and_instance() -> TestResult {
    init_tracing();
    let (service, _engine) = service_with_fake_engine(&[]);

    let err = service
        .create_case_instance("nope", BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::CaseDefinitionNotFound(_)));

    let err = service.is_completed(CaseInstanceId(42)).await.unwrap_err();
    assert!(matches!(err, CaseError::CaseInstanceNotFound(CaseInstanceId(42))));
    Ok(())
}

#[tokio::test]
async fn test_query_unknown_activity() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let err = service.query_node(case, "missing").await.unwrap_err();
    assert!(matches!(err, CaseError::NodeNotFound(ref id) if id == "missing"));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_forgets_the_instance() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    assert_eq!(service.case_instance_ids().await, vec![case]);

    service.shutdown(case).await?;
    assert!(service.case_instance_ids().await.is_empty());
    assert!(matches!(
        service.snapshot(case).await,
        Err(CaseError::CaseInstanceNotFound(_))
    ));
    Ok(())
}

/// Reports every process instance as finished before `spawn` returns.
#[derive(Default)]
struct InstantEngine {
    spawned: AtomicU64,
}

impl ProcessEngine for InstantEngine {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = caseflow::errors::Result<ProcessHandle>> + Send + '_>> {
        Box::pin(async move {
            let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
            let handle = ProcessHandle::new(format!("instant-{n}"));
            request.notifier.process_completed(handle.clone()).await?;
            Ok(handle)
        })
    }
}

#[tokio::test]
async fn test_processes_finishing_during_creation_complete_the_case() -> TestResult {
    init_tracing();
    let config = EngineConfigBuilder::new().inbox_capacity(1).build();
    let service = CaseService::new(&config, Arc::new(InstantEngine::default()));
    let definition = CaseDefinition::builder("instantCase")
        .plan_item(PlanItem::process_task("first", "instant").automatic())
        .plan_item(PlanItem::process_task("second", "instant").automatic())
        .build()?;
    service.deploy(definition).await;

    let case = with_timeout(service.create_case_instance("instantCase", BTreeMap::new()))
        .await?;

    let snapshot = service.snapshot(case).await?;
    assert!(snapshot.completed);
    assert_eq!(snapshot.node("first").map(|n| n.state), Some(NodeState::Completed));
    assert_eq!(snapshot.node("second").map(|n| n.state), Some(NodeState::Completed));
    Ok(())
}

#[tokio::test]
async fn test_process_finishing_during_manual_start() -> TestResult {
    init_tracing();
    let config = EngineConfigBuilder::new().inbox_capacity(1).build();
    let service = CaseService::new(&config, Arc::new(InstantEngine::default()));
    service.deploy(one_process_task_case()).await;
    let case = service
        .create_case_instance(DEFINITION_KEY, BTreeMap::new())
        .await?;
    let task = task_id(&service, case).await?;

    with_timeout(service.transition(case, task, Transition::ManualStart)).await?;

    let node = service.query_node(case, PROCESS_TASK_KEY).await?;
    assert_eq!(node.state, NodeState::Completed);
    assert_eq!(node.binding, Some(ProcessHandle::new("instant-1")));
    assert!(service.is_completed(case).await?);
    Ok(())
}

#[tokio::test]
async fn test_unknown_automatic_definition_starts_no_process() -> TestResult {
    init_tracing();
    let (service, engine) = service_with_fake_engine(&["known"]);
    let definition = CaseDefinition::builder("mixedCase")
        .plan_item(PlanItem::process_task("knownTask", "known").automatic())
        .plan_item(PlanItem::process_task("unknownTask", "unknown").automatic())
        .build()?;
    service.deploy(definition).await;

    let err = service
        .create_case_instance("mixedCase", BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::DefinitionNotFound(ref key) if key == "unknown"));
    assert_eq!(engine.start_count(), 0);
    assert!(service.case_instance_ids().await.is_empty());

    engine.register("unknown");
    let case = service
        .create_case_instance("mixedCase", BTreeMap::new())
        .await?;
    assert_eq!(engine.start_count(), 2);
    assert_eq!(service.case_instance_ids().await, vec![case]);
    Ok(())
}

#[tokio::test]
async fn test_closing_a_terminated_case_unregisters_it() -> TestResult {
    let (service, _engine, case) = one_task_setup().await?;
    let task = task_id(&service, case).await?;
    service.transition(case, task, Transition::ManualStart).await?;

    service.transition(case, NodeId::ROOT, Transition::Terminate).await?;
    assert_eq!(service.case_instance_ids().await, vec![case]);

    service.with_case_execution(case, NodeId::ROOT).close().await?;
    assert!(service.case_instance_ids().await.is_empty());

    let err = service
        .transition(case, task, Transition::Disable)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseError::CaseInstanceNotFound(id) if id == case));
    Ok(())
}
