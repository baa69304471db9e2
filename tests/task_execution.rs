//! Integration tests for task execution

#![cfg(unix)]

mod common;

use common::{create_tasks_file, host, read_output, runner, write_file};
use maru::error::{ConfigError, ExecutionError, IncludeError, MaruError, VariableError};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

fn no_presets() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[test]
fn test_variable_default_reaches_command() {
    let (dir, path) = create_tasks_file(
        r#"
variables:
  - name: FOO
    default: bar
tasks:
  - name: default
    actions:
      - cmd: echo "$FOO ${FOO}" > out.txt
"#,
    );
    let host = host("MARU_IT_DEFAULT");
    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "out.txt"), "bar bar\n");
}

#[test]
fn test_preset_overrides_default() {
    let (dir, path) = create_tasks_file(
        r#"
variables:
  - name: FOO
    default: bar
tasks:
  - name: default
    actions:
      - cmd: echo "$FOO" > out.txt
"#,
    );
    let host = host("MARU_IT_PRESET");
    let presets = BTreeMap::from([("foo".to_string(), "baz".to_string())]);
    runner(&host, &path).run("default", &presets).unwrap();
    assert_eq!(read_output(dir.path(), "out.txt"), "baz\n");
}

#[test]
fn test_env_fallback_beats_default() {
    let (dir, path) = create_tasks_file(
        r#"
variables:
  - name: REGION
    default: us-east-1
tasks:
  - name: default
    actions:
      - cmd: echo "$REGION" > out.txt
"#,
    );
    std::env::set_var("MARU_IT_FALLBACK_REGION", "eu-west-2");
    let host = host("MARU_IT_FALLBACK");
    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "out.txt"), "eu-west-2\n");
}

#[test]
fn test_environment_precedence() {
    let (dir, path) = create_tasks_file(
        r#"
variables:
  - name: FOO
    default: from-store
tasks:
  - name: default
    actions:
      - cmd: echo "$FOO $ONLY_ACTION $SHARED" > out.txt
        env:
          - FOO=from-action
          - ONLY_ACTION=kept
          - SHARED=from-action
"#,
    );
    let mut host = host("MARU_IT_PRECEDENCE");
    host.add_extra_env("SHARED", "from-host");
    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "out.txt"), "from-store kept from-host\n");
}

#[test]
fn test_set_variables_flow_between_actions() {
    let (dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - cmd: echo hello
        mute: true
        setVariables:
          - name: GREETING
      - cmd: echo "${GREETING} world" > out.txt
      - task: later
  - name: later
    actions:
      - cmd: echo "$GREETING again" > later.txt
"#,
    );
    let host = host("MARU_IT_SETVAR");
    let mut runner = runner(&host, &path);
    runner.run("default", &no_presets()).unwrap();

    assert_eq!(read_output(dir.path(), "out.txt"), "hello world\n");
    assert_eq!(read_output(dir.path(), "later.txt"), "hello again\n");
    assert_eq!(runner.variables().get_set_variable("GREETING").unwrap().value, "hello");
}

#[test]
fn test_captured_value_must_match_pattern() {
    let (_dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - cmd: echo "Not-A-Number"
        mute: true
        setVariables:
          - name: COUNT
            pattern: "^[0-9]+$"
"#,
    );
    let host = host("MARU_IT_CAPTURE_PATTERN");
    let err = runner(&host, &path).run("default", &no_presets()).unwrap_err();
    assert!(matches!(
        err,
        MaruError::Variable(VariableError::PatternMismatch { .. })
    ));
}

#[test]
fn test_preset_must_match_declared_pattern() {
    let (_dir, path) = create_tasks_file(
        r#"
variables:
  - name: ENV_NAME
    default: dev
    pattern: "^[a-z]+$"
tasks:
  - name: default
    actions:
      - cmd: "true"
"#,
    );
    let host = host("MARU_IT_PRESET_PATTERN");
    let presets = BTreeMap::from([("ENV_NAME".to_string(), "PROD-1".to_string())]);
    let err = runner(&host, &path).run("default", &presets).unwrap_err();
    assert_eq!(
        err.to_string(),
        "provided value for variable \"ENV_NAME\" does not match pattern \"^[a-z]+$\""
    );
}

#[test]
fn test_condition_skips_actions() {
    let (dir, path) = create_tasks_file(
        r#"
variables:
  - name: MODE
    default: fast
tasks:
  - name: default
    actions:
      - cmd: echo skipped > skipped.txt
        if: variables.MODE == "slow"
      - cmd: echo ran > ran.txt
        if: ${{ variables.MODE == "fast" }}
"#,
    );
    let host = host("MARU_IT_CONDITION");
    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert!(!dir.path().join("skipped.txt").exists());
    assert_eq!(read_output(dir.path(), "ran.txt"), "ran\n");
}

#[test]
fn test_inputs_are_templated_and_exported() {
    let (dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - task: greet
        with:
          name: world
  - name: greet
    inputs:
      name:
        description: Who to greet
        required: true
      punctuation:
        description: Trailing mark
        default: "!"
    actions:
      - cmd: echo "hello ${{ inputs.name }}${{ inputs.punctuation }} $INPUT_NAME $INPUT_PUNCTUATION" > out.txt
"#,
    );
    let host = host("MARU_IT_INPUTS");
    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "out.txt"), "hello world! world !\n");
}

#[test]
fn test_missing_required_input() {
    let (_dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - task: greet
  - name: greet
    inputs:
      name:
        description: Who to greet
        required: true
    actions:
      - cmd: echo "hi ${{ inputs.name }}"
"#,
    );
    let host = host("MARU_IT_MISSING_INPUT");
    let err = runner(&host, &path).run("default", &no_presets()).unwrap_err();
    assert_eq!(err.to_string(), "task greet is missing required inputs: name");
}

#[test]
fn test_task_with_required_inputs_cannot_run_directly() {
    let (_dir, path) = create_tasks_file(
        r#"
tasks:
  - name: greet
    inputs:
      name:
        description: Who to greet
        required: true
    actions:
      - cmd: echo hi
"#,
    );
    let host = host("MARU_IT_DIRECT");
    let err = runner(&host, &path).run("greet", &no_presets()).unwrap_err();
    assert!(matches!(
        err,
        MaruError::Config(ConfigError::InputsOnDirectCall(_))
    ));
}

#[test]
fn test_local_include_is_namespaced() {
    let (dir, path) = create_tasks_file(
        r#"
includes:
  - lib: ./lib/tasks.yaml
tasks:
  - name: default
    actions:
      - task: lib:build
"#,
    );
    write_file(
        dir.path(),
        "lib/tasks.yaml",
        r#"
variables:
  - name: TARGET
    default: release
tasks:
  - name: build
    actions:
      - task: compile
  - name: compile
    actions:
      - cmd: echo "compiled $TARGET" > compiled.txt
"#,
    );
    let host = host("MARU_IT_INCLUDE");
    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "compiled.txt"), "compiled release\n");
}

#[test]
fn test_run_included_task_directly() {
    let (dir, path) = create_tasks_file(
        r#"
includes:
  - lib: ./lib/tasks.yaml
variables:
  - name: TARGET
    default: from-root
tasks:
  - name: default
    actions:
      - cmd: "true"
"#,
    );
    write_file(
        dir.path(),
        "lib/tasks.yaml",
        r#"
variables:
  - name: TARGET
    default: from-lib
tasks:
  - name: build
    actions:
      - cmd: echo "$TARGET" > target.txt
"#,
    );
    let host = host("MARU_IT_INCLUDE_DIRECT");
    let mut runner = runner(&host, &path);
    runner.run("lib:build", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "target.txt"), "from-root\n");
    assert!(runner.location().ends_with("tasks.yaml"));
    assert!(runner.location().contains("lib"));
}

#[test]
fn test_include_redefinition_fails() {
    let (dir, path) = create_tasks_file(
        r#"
includes:
  - lib: ./a.yaml
tasks:
  - name: default
    actions:
      - task: lib:a
"#,
    );
    write_file(
        dir.path(),
        "a.yaml",
        r#"
includes:
  - lib: ./b.yaml
tasks:
  - name: a
    actions:
      - cmd: "true"
"#,
    );
    write_file(dir.path(), "b.yaml", "tasks: []\n");

    let host = host("MARU_IT_REDEFINE");
    let err = runner(&host, &path).run("default", &no_presets()).unwrap_err();
    assert!(matches!(err, MaruError::Include(IncludeError::Redefined(_))));
}

#[test]
fn test_reference_loop_hits_stack_bound() {
    let (_dir, path) = create_tasks_file(
        r#"
tasks:
  - name: a
    actions:
      - task: b
  - name: b
    actions:
      - task: a
"#,
    );
    let host = host("MARU_IT_LOOP").with_max_stack(5);
    let err = runner(&host, &path).run("a", &no_presets()).unwrap_err();
    assert!(matches!(
        err,
        MaruError::Execution(ExecutionError::TaskStackExceeded(5))
    ));
    assert_eq!(
        err.to_string(),
        "task looping exceeded max configured task stack of 5"
    );
}

#[test]
fn test_retries_run_every_attempt() {
    let (dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - cmd: echo attempt >> attempts.txt && exit 1
        maxRetries: 2
"#,
    );
    let host = host("MARU_IT_RETRY");
    let err = runner(&host, &path).run("default", &no_presets()).unwrap_err();
    assert!(err.to_string().contains("failed after 2 retries"));
    assert_eq!(read_output(dir.path(), "attempts.txt").lines().count(), 3);
}

#[test]
fn test_total_deadline_stops_command() {
    let (_dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - cmd: sleep 10
        maxTotalSeconds: 1
        maxRetries: 5
"#,
    );
    let host = host("MARU_IT_DEADLINE");
    let started = Instant::now();
    let err = runner(&host, &path).run("default", &no_presets()).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(
        err,
        MaruError::Execution(ExecutionError::TimedOut { seconds: 1, .. })
    ));
}

#[test]
fn test_env_path_is_loaded() {
    let (dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    envPath: ./config/.env
    actions:
      - cmd: echo "$FROM_FILE" > out.txt
"#,
    );
    write_file(dir.path(), "config/.env", "FROM_FILE=loaded\n");
    let host = host("MARU_IT_ENV_PATH");
    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "out.txt"), "loaded\n");
}

#[test]
fn test_dry_run_executes_nothing() {
    let (dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - cmd: touch marker
"#,
    );
    let host = host("MARU_IT_DRY_RUN");
    runner(&host, &path)
        .with_dry_run(true)
        .run("default", &no_presets())
        .unwrap();
    assert!(!dir.path().join("marker").exists());
}

#[test]
fn test_dry_run_templates_captured_variables() {
    let (dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - cmd: echo hello
        setVariables:
          - name: OUT
      - cmd: echo "${{ variables.OUT }}" > out.txt
"#,
    );
    let host = host("MARU_IT_DRY_RUN_CAPTURE");
    runner(&host, &path)
        .with_dry_run(true)
        .run("default", &no_presets())
        .unwrap();
    assert!(!dir.path().join("out.txt").exists());

    runner(&host, &path).run("default", &no_presets()).unwrap();
    assert_eq!(read_output(dir.path(), "out.txt"), "hello\n");
}

#[test]
fn test_wait_failure_names_lowered_command() {
    let (_dir, path) = create_tasks_file(
        r#"
tasks:
  - name: default
    actions:
      - wait:
          network:
            protocol: TCP
            address: 127.0.0.1:1
        maxTotalSeconds: 30
"#,
    );
    let host = host("MARU_IT_WAIT_LABEL").with_wait_command("false");
    let err = runner(&host, &path).run("default", &no_presets()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "command \"false tcp 127.0.0.1:1 --timeout 30s\" failed after 0 retries"
    );
}

#[test]
fn test_list_tasks_with_and_without_includes() {
    let (dir, path) = create_tasks_file(
        r#"
includes:
  - lib: ./lib.yaml
tasks:
  - name: default
    description: Root task
    actions:
      - cmd: "true"
"#,
    );
    write_file(
        dir.path(),
        "lib.yaml",
        "tasks:\n  - name: build\n    actions:\n      - cmd: \"true\"\n",
    );
    let host = host("MARU_IT_LIST");

    let local: Vec<String> = runner(&host, &path)
        .list_tasks(false)
        .unwrap()
        .into_iter()
        .map(|task| task.name)
        .collect();
    assert_eq!(local, vec!["default"]);

    let all: Vec<String> = runner(&host, &path)
        .list_tasks(true)
        .unwrap()
        .into_iter()
        .map(|task| task.name)
        .collect();
    assert_eq!(all, vec!["default", "lib:build"]);
}
