use spoolq::worker::JobExecutor;
use tempfile::TempDir;

fn test_executor() -> (TempDir, JobExecutor) {
    let dir = TempDir::new().unwrap();
    let executor = JobExecutor::with_out_dir(dir.path().to_path_buf());
    (dir, executor)
}

#[tokio::test]
async fn test_output_is_captured_to_a_file() {
    let (_dir, executor) = test_executor();

    let mut running = executor.spawn(1, "echo hello", true).await.unwrap();
    assert!(running.pid > 0);
    let path = running.output_path.clone().unwrap();
    assert_eq!(running.wait().await, 0);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "hello\n");
}

#[tokio::test]
async fn test_stderr_lands_in_the_same_file() {
    let (_dir, executor) = test_executor();

    let mut running = executor
        .spawn(2, "echo out; echo err >&2", true)
        .await
        .unwrap();
    let path = running.output_path.clone().unwrap();
    assert_eq!(running.wait().await, 0);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("out"));
    assert!(contents.contains("err"));
}

#[tokio::test]
async fn test_exit_code_is_reported() {
    let (_dir, executor) = test_executor();

    let mut running = executor.spawn(3, "exit 3", true).await.unwrap();
    assert_eq!(running.wait().await, 3);
}

#[tokio::test]
async fn test_unknown_command_reports_127() {
    let (_dir, executor) = test_executor();

    // The shell itself spawns fine and reports command-not-found.
    let mut running = executor
        .spawn(4, "definitely_not_a_command_xyz", true)
        .await
        .unwrap();
    assert_eq!(running.wait().await, 127);
}

#[tokio::test]
async fn test_signal_termination_maps_to_minus_one() {
    let (_dir, executor) = test_executor();

    let mut running = executor.spawn(5, "kill -9 $$", true).await.unwrap();
    assert_eq!(running.wait().await, -1);
}

#[tokio::test]
async fn test_no_output_means_no_file() {
    let (dir, executor) = test_executor();

    let mut running = executor.spawn(6, "echo hidden", false).await.unwrap();
    assert!(running.output_path.is_none());
    assert_eq!(running.wait().await, 0);

    // Nothing was written into the output directory.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_kill_terminates_the_child() {
    let (_dir, executor) = test_executor();

    let mut running = executor.spawn(7, "sleep 30", true).await.unwrap();
    running.kill().await;
    assert_eq!(running.wait().await, -1);
}

#[tokio::test]
async fn test_output_files_are_named_per_daemon_and_job() {
    let (_dir, executor) = test_executor();

    let mut running = executor.spawn(8, "true", true).await.unwrap();
    let path = running.output_path.clone().unwrap();
    running.wait().await;

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(name, format!("spoolq-out-{}-8", std::process::id()));
}
