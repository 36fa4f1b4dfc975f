//! End-to-end engine scenarios exercising the full run lifecycle:
//! enqueue, layered dispatch, batch merge, nested runs, and terminal
//! reporting.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use layerflow::{
    AsyncTaskEntry, ChatMessage, Config, DbCollection, EdgeModel, Engine, EngineBuilder, FieldRecord, LayerflowError, MessageStatus, NODE_STREAMING, NodeModel,
    ProgressTracker, RunFrom, RunOptions, RunRecord, RunStatus, StatusReport, StepOutcome, TaskContext, TaskHandler, WorkflowModel, WorkflowState,
};

/// Echoes its resolved `input` into `output`, tagged with the node id.
struct Echo;

#[async_trait]
impl TaskHandler for Echo {
    async fn run(
        &self,
        _ctx: &TaskContext,
        data: WorkflowModel,
        node_id: &str,
    ) -> StepOutcome {
        let mut state = WorkflowState::new(data);
        let input = match state.get_node_field_value(node_id, "input") {
            JsonValue::String(s) => s,
            JsonValue::Null => String::new(),
            other => other.to_string(),
        };
        state.update_node_field_value(node_id, "output", json!(format!("{node_id}:{input}")));
        StepOutcome::Done(state.into_model())
    }
}

/// Pushes partial chunks into the streaming buffer before completing.
struct StreamChunks;

#[async_trait]
impl TaskHandler for StreamChunks {
    async fn run(
        &self,
        ctx: &TaskContext,
        data: WorkflowModel,
        node_id: &str,
    ) -> StepOutcome {
        let progress = ProgressTracker::new(ctx.cache.clone(), Duration::from_secs(60), Duration::from_secs(60));
        progress.report_node_status(&data.rid, node_id, NODE_STREAMING);
        progress.push_node_data(&data.rid, node_id, json!({"content": "hel"}));
        progress.push_node_data(&data.rid, node_id, json!({"content": "lo"}));
        StepOutcome::Done(data)
    }
}

struct AlwaysFail;

#[async_trait]
impl TaskHandler for AlwaysFail {
    async fn run(
        &self,
        _ctx: &TaskContext,
        _data: WorkflowModel,
        _node_id: &str,
    ) -> StepOutcome {
        StepOutcome::Failed("boom".to_string())
    }
}

struct AlwaysPanic;

#[async_trait]
impl TaskHandler for AlwaysPanic {
    async fn run(
        &self,
        _ctx: &TaskContext,
        _data: WorkflowModel,
        _node_id: &str,
    ) -> StepOutcome {
        panic!("handler crashed");
    }
}

fn echo_node(id: &str) -> NodeModel {
    NodeModel::new(id, "Echo", "processing", "test.echo")
        .with_field("input", FieldRecord::with_value(JsonValue::Null))
        .with_field("output", FieldRecord::output(JsonValue::Null))
}

fn text_output_node(
    id: &str,
    title: &str,
) -> NodeModel {
    let mut output = FieldRecord::output(JsonValue::Null);
    output.extra.insert("display_name".to_string(), json!(title));
    NodeModel::new(id, "Text", "outputs", "output.text").with_field("text", FieldRecord::with_value(JsonValue::Null)).with_field("output", output)
}

/// A -> (B, C) -> D, with D rendering B's output.
fn diamond_model() -> WorkflowModel {
    WorkflowModel {
        wid: "diamond".to_string(),
        nodes: vec![echo_node("A"), echo_node("B"), echo_node("C"), text_output_node("D", "Result")],
        edges: vec![
            EdgeModel::new("A", "output", "B", "input"),
            EdgeModel::new("A", "output", "C", "input"),
            EdgeModel::new("B", "output", "D", "text"),
            EdgeModel::new("C", "output", "D", "unused"),
        ],
        ..Default::default()
    }
}

fn engine() -> Engine {
    let mut config = Config::default();
    config.async_worker_thread_number = 4;
    config.retry.retry_interval_ms = 20;
    config.retry.max_task_retries = 200;

    let engine = EngineBuilder::new()
        .config(config)
        .register("test.echo", Arc::new(Echo))
        .register("test.fail", Arc::new(AlwaysFail))
        .register("test.stream", Arc::new(StreamChunks))
        .register("test.panic", Arc::new(AlwaysPanic))
        .build()
        .unwrap();
    engine.launch();
    engine
}

fn wait_terminal(
    engine: &Engine,
    record_id: &str,
) -> StatusReport {
    for _ in 0..400 {
        let report = engine.check_status(record_id).unwrap();
        if matches!(report.status, RunStatus::Finished | RunStatus::Failed) {
            return report;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("run {record_id} did not reach a terminal state");
}

#[test]
fn test_diamond_run_finishes_with_layered_order() {
    let engine = engine();
    let record_id = engine.run(diamond_model()).unwrap();

    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Finished);
    assert!(report.error_task.is_empty());

    // D consumed B's output, which consumed A's.
    assert_eq!(report.outputs.len(), 1);
    assert_eq!(report.outputs[0].title, "Result");
    assert_eq!(report.outputs[0].value, json!("B:A:"));

    // Layered order: A before B and C, D last.
    let pos = |id: &str| report.finished_nodes.iter().position(|n| n == id).unwrap();
    assert_eq!(report.finished_nodes.len(), 4);
    assert!(pos("A") < pos("B"));
    assert!(pos("A") < pos("C"));
    assert_eq!(pos("D"), 3);

    // Every executed node persists a non-negative run time.
    let record = engine.store().run_records().find(&record_id).unwrap();
    let model = WorkflowModel::from_value(record.data).unwrap();
    for node in &model.nodes {
        assert!(node.data.run_time >= 0.0, "node {} kept the unmeasured sentinel", node.id);
        assert_eq!(node.data.status, 200, "node {} not marked finished", node.id);
    }

    // Nothing is streaming on a finished run; clearing the progress keys
    // empties the polling view without touching the persisted record.
    assert!(report.streaming_nodes.is_empty());
    engine.clear_progress(&record_id).unwrap();
    let cleared = engine.check_status(&record_id).unwrap();
    assert!(cleared.finished_nodes.is_empty());
    assert_eq!(cleared.status, RunStatus::Finished);

    engine.shutdown();
}

#[test]
fn test_nested_invoke_creates_exactly_one_sub_run() {
    let sub = WorkflowModel {
        wid: "sub-w".to_string(),
        nodes: vec![{
            let mut node = text_output_node("s-out", "Sub");
            node.data.template.get_mut("text").unwrap().value = json!("hello sub");
            node
        }],
        ..Default::default()
    };

    let mut invoke = NodeModel::new("inv", "WorkflowInvoke", "control_flows", "control_flows.workflow_invoke");
    invoke.data.template.insert("workflow_id".to_string(), FieldRecord::with_value(json!("sub-w")));
    let mut result = FieldRecord::output(JsonValue::Null);
    result.node = Some("s-out".to_string());
    result.output_field_key = Some("output".to_string());
    invoke.data.template.insert("result".to_string(), result);

    let mut model = WorkflowModel {
        wid: "parent".to_string(),
        nodes: vec![invoke],
        ..Default::default()
    };
    model.related_workflows.insert("sub-w".to_string(), sub);

    let engine = engine();
    let record_id = engine.run(model).unwrap();

    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Finished);

    // Exactly one parent and one nested record, however many polls happened.
    assert_eq!(engine.store().run_records().count().unwrap(), 2);

    // The nested run's output landed on the invoke node, bookkeeping gone.
    let record = engine.store().run_records().find(&record_id).unwrap();
    let final_model = WorkflowModel::from_value(record.data).unwrap();
    assert_eq!(final_model.nodes[0].data.template["result"].value, json!("hello sub"));
    assert!(final_model.async_tasks.is_empty());

    engine.shutdown();
}

#[test]
fn test_batch_failure_blames_task_and_keeps_sibling_output() {
    let mut model = diamond_model();
    let node_c = model.nodes.iter_mut().find(|n| n.id == "C").unwrap();
    node_c.data.task_name = "test.fail".to_string();

    let engine = engine();
    let record_id = engine.run(model).unwrap();

    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.error_task, "test.fail");
    assert!(report.outputs.is_empty());

    // B ran in the same batch and its output survived the merge.
    let record = engine.store().run_records().find(&record_id).unwrap();
    assert_eq!(record.error_task, "test.fail");
    let final_model = WorkflowModel::from_value(record.data).unwrap();
    let node_b = final_model.nodes.iter().find(|n| n.id == "B").unwrap();
    assert_eq!(node_b.data.template["output"].value, json!("B:A:"));

    engine.shutdown();
}

#[test]
fn test_panicking_serial_handler_fails_the_run() {
    let model = WorkflowModel {
        wid: "panic-w".to_string(),
        nodes: vec![NodeModel::new("P", "Boom", "processing", "test.panic")],
        ..Default::default()
    };

    let engine = engine();
    let record_id = engine.run(model).unwrap();

    // The run must reach a terminal state instead of sitting Running.
    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.error_task, "test.panic");

    engine.shutdown();
}

#[test]
fn test_panicking_batch_member_fails_run_and_keeps_sibling_output() {
    let mut model = diamond_model();
    let node_c = model.nodes.iter_mut().find(|n| n.id == "C").unwrap();
    node_c.data.task_name = "test.panic".to_string();

    let engine = engine();
    let record_id = engine.run(model).unwrap();

    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.error_task, "test.panic");

    let record = engine.store().run_records().find(&record_id).unwrap();
    let final_model = WorkflowModel::from_value(record.data).unwrap();
    let node_b = final_model.nodes.iter().find(|n| n.id == "B").unwrap();
    assert_eq!(node_b.data.template["output"].value, json!("B:A:"));

    engine.shutdown();
}

#[test]
fn test_cyclic_graph_rejected_before_any_record() {
    let mut model = diamond_model();
    model.edges.push(EdgeModel::new("D", "output", "A", "input"));

    let engine = engine();
    match engine.run(model) {
        Err(LayerflowError::Cycle(_)) => {}
        other => panic!("expected cycle rejection, got {other:?}"),
    }
    assert_eq!(engine.store().run_records().count().unwrap(), 0);

    engine.shutdown();
}

#[test]
fn test_chat_run_delivers_result_to_source_message() {
    let engine = engine();
    engine
        .store()
        .messages()
        .create(&ChatMessage {
            mid: "m1".to_string(),
            status: MessageStatus::RunningWorkflow,
            metadata: json!({}),
            create_time: 0,
            update_time: 0,
        })
        .unwrap();

    let mut model = WorkflowModel {
        wid: "chat-w".to_string(),
        nodes: vec![text_output_node("out", "Answer")],
        ..Default::default()
    };
    model.nodes[0].data.template.get_mut("text").unwrap().value = json!("hello chat");

    let record_id = engine
        .run_with(model, RunOptions {
            run_from: RunFrom::Chat,
            source_message_id: Some("m1".to_string()),
        })
        .unwrap();

    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Finished);

    let message = engine.store().messages().find("m1").unwrap();
    assert_eq!(message.status, MessageStatus::Success);
    assert_eq!(message.metadata["workflow_result"], json!("# Answer\nhello chat"));

    engine.shutdown();
}

#[test]
fn test_streamed_chunks_survive_until_pulled() {
    let model = WorkflowModel {
        wid: "stream-w".to_string(),
        nodes: vec![NodeModel::new("S", "Stream", "processing", "test.stream")],
        ..Default::default()
    };

    let engine = engine();
    let record_id = engine.run(model).unwrap();
    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Finished);

    // The finish report cleared the streaming marker but not the buffer.
    assert!(report.streaming_nodes.is_empty());
    let chunks = engine.pull_node_stream(&record_id, "S");
    assert_eq!(chunks, vec![json!({"content": "hel"}), json!({"content": "lo"})]);
    assert!(engine.pull_node_stream(&record_id, "S").is_empty());

    engine.shutdown();
}

#[test]
fn test_deployed_workflow_runs_by_id() {
    let mut model = diamond_model();
    model.extra.insert("title".to_string(), json!("Diamond"));

    let engine = engine();
    assert!(engine.deploy(&model).unwrap());

    // Re-deploying updates in place rather than duplicating.
    assert!(engine.deploy(&model).unwrap());
    assert_eq!(engine.store().workflows().count().unwrap(), 1);
    assert_eq!(engine.store().workflows().find("diamond").unwrap().title, "Diamond");

    let record_id = engine.run_deployed("diamond", RunOptions::default()).unwrap();
    let report = wait_terminal(&engine, &record_id);
    assert_eq!(report.status, RunStatus::Finished);
    assert_eq!(report.outputs[0].value, json!("B:A:"));

    engine.shutdown();
}

#[test]
fn test_fail_timed_out_force_fails_expired_async_run() {
    let engine = engine();

    // A run stuck on a nested workflow whose expire time has long passed.
    let mut model = WorkflowModel {
        wid: "stuck-w".to_string(),
        rid: "r-stuck".to_string(),
        nodes: vec![NodeModel::new("inv", "WorkflowInvoke", "control_flows", "control_flows.workflow_invoke")],
        ..Default::default()
    };
    model.async_tasks.insert("inv".to_string(), AsyncTaskEntry {
        data: json!({"record_id": "gone"}),
        start_time: 10.0,
        expire_time: 20.0,
    });
    engine
        .store()
        .run_records()
        .create(&RunRecord {
            rid: "r-stuck".to_string(),
            wid: "stuck-w".to_string(),
            status: RunStatus::Running,
            data: model.to_value().unwrap(),
            run_from: RunFrom::Web,
            source_message_id: None,
            start_time: 0,
            end_time: 0,
            error_task: String::new(),
        })
        .unwrap();

    assert!(engine.fail_timed_out("r-stuck").unwrap());

    let record = engine.store().run_records().find("r-stuck").unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.error_task, "async.timeout");
    // Bookkeeping was stripped from the persisted snapshot.
    let final_model = WorkflowModel::from_value(record.data).unwrap();
    assert!(final_model.async_tasks.is_empty());

    // Already terminal: a second sweep is a no-op.
    assert!(!engine.fail_timed_out("r-stuck").unwrap());

    engine.shutdown();
}

#[test]
fn test_run_rejected_when_engine_not_launched() {
    let engine = EngineBuilder::new().async_worker_thread_number(2).build().unwrap();
    assert!(matches!(engine.run(diamond_model()), Err(LayerflowError::Engine(_))));
}
