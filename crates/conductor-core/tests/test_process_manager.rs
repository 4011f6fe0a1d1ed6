use std::time::Duration;

use conductor_core::{CommandSpec, ProcessExit, ProcessManager, UnixProcessManager};
use futures::StreamExt;

fn fixture(name: &str, script: &str) -> CommandSpec {
    CommandSpec {
        name: name.to_owned(),
        cmd: vec!["bash".to_owned(), format!("./{script}")],
        cwd: Some("./tests/fixtures/".parse().unwrap()),
        env: vec![],
    }
}

#[tokio::test]
#[cfg(unix)]
async fn test_process_manager_stdout() {
    let mut pm = UnixProcessManager::new();

    let out = pm.spawn(fixture("stdout", "stdout.sh")).await.unwrap();

    let stdout: Vec<String> = out.stdout.collect().await;
    assert_eq!(
        stdout,
        vec!["INFO: line 1", "INFO: line 2", "INFO: stdout.sh finished"]
    );

    let stderr: Vec<String> = out.stderr.collect().await;
    assert!(stderr.is_empty());
}

#[tokio::test]
#[cfg(unix)]
async fn test_process_manager_stderr() {
    let mut pm = UnixProcessManager::new();

    let out = pm.spawn(fixture("stderr", "stderr.sh")).await.unwrap();

    let stdout: Vec<String> = out.stdout.collect().await;
    assert!(stdout.is_empty());

    let stderr: Vec<String> = out.stderr.collect().await;
    assert_eq!(
        stderr,
        vec!["ERROR: line 1", "ERROR: line 2", "ERROR: stderr.sh finished"]
    );
}

#[tokio::test]
#[cfg(unix)]
async fn test_process_manager_env() {
    let mut pm = UnixProcessManager::new();
    let mut spec = fixture("env", "env.sh");
    spec.env = vec![("CONDUCTOR_TEST_VALUE".to_owned(), "selected".to_owned())];

    let out = pm.spawn(spec).await.unwrap();

    let stdout: Vec<String> = out.stdout.collect().await;
    assert_eq!(stdout, vec!["INFO: selected"]);
}

#[tokio::test]
#[cfg(unix)]
async fn test_process_manager_exit_code() {
    let mut pm = UnixProcessManager::new();

    let out = pm.spawn(fixture("exit", "exit_code.sh")).await.unwrap();
    let mut exited = out.exited;

    assert_eq!(exited.exited().await, ProcessExit { code: Some(7) });
    assert_eq!(
        pm.wait(out.id, Duration::from_secs(1)).await.unwrap(),
        Some(ProcessExit { code: Some(7) })
    );
}

#[tokio::test]
#[cfg(unix)]
async fn test_process_manager_kill() {
    let mut pm = UnixProcessManager::new();

    let out = pm.spawn(fixture("loop", "loop.sh")).await.unwrap();
    let mut stdout = out.stdout;
    assert_eq!(stdout.next().await.as_deref(), Some("INFO: waiting"));

    assert_eq!(
        pm.wait(out.id, Duration::from_millis(300)).await.unwrap(),
        None
    );

    pm.kill(out.id).await.unwrap();
    let mut exited = out.exited;
    let exit = tokio::time::timeout(Duration::from_secs(5), exited.exited())
        .await
        .unwrap();
    assert_eq!(exit.code, None);
}

#[tokio::test]
#[cfg(unix)]
async fn test_process_manager_spawn_missing_program() {
    let mut pm = UnixProcessManager::new();

    let result = pm
        .spawn(CommandSpec {
            name: "missing".to_owned(),
            cmd: vec!["./definitely-not-here".to_owned()],
            cwd: None,
            env: vec![],
        })
        .await;
    assert!(matches!(
        result,
        Err(conductor_core::Error::ProcessSpawn { .. })
    ));

    let empty = pm
        .spawn(CommandSpec {
            name: "empty".to_owned(),
            cmd: vec![],
            cwd: None,
            env: vec![],
        })
        .await;
    assert!(empty.is_err());
}
