use std::fs;

use serde_json::json;

use flowcore::{validate_flow, AgentDefinitionLoader, Flow, FlowCoreError, FlowLoader, YamlFlowLoader};

#[test]
fn yaml_flow_parses_all_task_fields() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("review.yaml"),
        r#"
id: review
name: Review pipeline
type: sequential
description: Collects and scores feedback.
globals:
  env: staging
tasks:
  - id: collect
    agentId: collector
    input:
      topic: ${topic}
    outputKey: feedback
    loopOver: sources
  - id: score
    agentId: scorer
    input:
      items: ${feedback}
    outputKey: scores
    condition: data.feedback != null
    optional: true
  - id: archive
    flowRef: archive.yaml
"#,
    )
    .unwrap();

    let loader = YamlFlowLoader::new(dir.path());
    let flow = loader.load("review.yaml").unwrap();

    assert_eq!(flow.id, "review");
    assert_eq!(flow.flow_type, "sequential");
    assert_eq!(flow.globals.get("env"), Some(&json!("staging")));
    assert_eq!(flow.tasks.len(), 3);

    let collect = &flow.tasks[0];
    assert_eq!(collect.agent_id, "collector");
    assert_eq!(collect.output_key.as_deref(), Some("feedback"));
    assert_eq!(collect.loop_over.as_deref(), Some("sources"));
    assert_eq!(collect.input.get("topic"), Some(&json!("${topic}")));

    let score = &flow.tasks[1];
    assert!(score.optional);
    assert_eq!(score.condition.as_deref(), Some("data.feedback != null"));

    assert_eq!(flow.tasks[2].flow_ref.as_deref(), Some("archive.yaml"));
}

#[test]
fn json_flows_are_supported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("simple.json"),
        r#"{
  "id": "simple",
  "name": "Simple",
  "type": "parallel",
  "tasks": [ { "id": "t1", "agentId": "a" } ]
}"#,
    )
    .unwrap();

    let loader = YamlFlowLoader::new(dir.path());
    let flow = loader.load("simple.json").unwrap();
    assert_eq!(flow.flow_type, "parallel");
    assert_eq!(flow.tasks[0].agent_id, "a");
}

#[test]
fn missing_file_is_a_loader_error() {
    let dir = tempfile::tempdir().unwrap();
    let loader = YamlFlowLoader::new(dir.path());

    let error = loader.load("ghost.yaml").unwrap_err();
    assert!(matches!(error, FlowCoreError::Loader(_)));
}

#[test]
fn invalid_documents_are_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("dup.yaml"),
        r#"
id: dup
name: Dup
type: sequential
tasks:
  - id: t1
    agentId: a
  - id: t1
    agentId: b
"#,
    )
    .unwrap();

    let loader = YamlFlowLoader::new(dir.path());
    let error = loader.load("dup.yaml").unwrap_err();
    assert!(matches!(error, FlowCoreError::Loader(_)));
}

fn parse(doc: serde_json::Value) -> Flow {
    serde_json::from_value(doc).unwrap()
}

#[test]
fn validation_rejects_structural_problems() {
    // Task with neither agent nor subflow.
    let flow = parse(json!({
        "id": "f", "name": "F", "type": "sequential",
        "tasks": [ { "id": "t1" } ]
    }));
    assert!(validate_flow(&flow).is_err());

    // Empty task id.
    let flow = parse(json!({
        "id": "f", "name": "F", "type": "sequential",
        "tasks": [ { "id": " ", "agentId": "a" } ]
    }));
    assert!(validate_flow(&flow).is_err());

    // Missing flow type.
    let flow = parse(json!({
        "id": "f", "name": "F", "type": "",
        "tasks": []
    }));
    assert!(validate_flow(&flow).is_err());

    // A subflow-only task is fine.
    let flow = parse(json!({
        "id": "f", "name": "F", "type": "sequential",
        "tasks": [ { "id": "t1", "flowRef": "other.yaml" } ]
    }));
    assert!(validate_flow(&flow).is_ok());
}

#[test]
fn agent_definitions_load_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agents.yaml");
    fs::write(
        &path,
        r#"
- agentId: helper
  name: Helper
  type: llm
  systemPrompt: Be brief.
  enabledExtensions: [lookup]
  config:
    model: small
- agentId: echo_agent
  type: native
  config:
    entry: echo
"#,
    )
    .unwrap();

    let definitions = AgentDefinitionLoader::load(&path).unwrap();
    assert_eq!(definitions.len(), 2);

    let helper = &definitions[0];
    assert_eq!(helper.agent_id, "helper");
    assert_eq!(helper.agent_type, "llm");
    assert_eq!(helper.system_prompt(), "Be brief.");
    assert_eq!(helper.enabled_extensions(), ["lookup".to_string()]);
    assert_eq!(helper.config().get("model").map(String::as_str), Some("small"));

    let echo = &definitions[1];
    assert_eq!(echo.system_prompt(), "");
    assert!(echo.enabled_extensions().is_empty());
    assert_eq!(echo.config().get("entry").map(String::as_str), Some("echo"));
}
