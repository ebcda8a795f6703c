use std::time::Duration;

use tempfile::TempDir;

use spoolq::config::Config;
use spoolq::daemon;
use spoolq::ipc::{DaemonConnection, Request, Response};
use spoolq::spool::{JobState, JobTarget};

/// A daemon running inside the test process, bound to a socket in its
/// own temp runtime directory.
struct TestDaemon {
    _dir: TempDir,
    config: Config,
    handle: tokio::task::JoinHandle<spoolq::Result<()>>,
}

impl TestDaemon {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::in_dir(dir.path().to_path_buf());
        let handle = tokio::spawn(daemon::run(config.clone()));

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if DaemonConnection::connect(&config).await.is_ok() {
                return Self {
                    _dir: dir,
                    config,
                    handle,
                };
            }
        }
        panic!("daemon did not come up");
    }

    async fn connect(&self) -> DaemonConnection {
        DaemonConnection::connect(&self.config).await.unwrap()
    }

    /// Shuts the daemon down over the wire and waits for it to exit.
    async fn shutdown(self) {
        let mut conn = self.connect().await;
        let resp = conn.request(&Request::Shutdown).await.unwrap();
        assert!(matches!(resp, Response::ShuttingDown));
        self.handle.await.unwrap().unwrap();
    }
}

async fn submit(conn: &mut DaemonConnection, command: &str, store_output: bool) -> u32 {
    match conn
        .request(&Request::Submit {
            command: command.to_string(),
            store_output,
        })
        .await
        .unwrap()
    {
        Response::Submitted { job_id } => job_id,
        other => panic!("unexpected response: {:?}", other),
    }
}

#[tokio::test]
async fn test_submit_run_and_wait() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let job_id = submit(&mut conn, "echo hi", true).await;
    assert_eq!(job_id, 1);

    let resp = conn
        .request(&Request::Wait {
            target: JobTarget::Id(job_id),
        })
        .await
        .unwrap();
    assert!(matches!(resp, Response::WaitDone { exit_code: 0 }));

    let resp = conn
        .request(&Request::JobState {
            target: JobTarget::Id(job_id),
        })
        .await
        .unwrap();
    match resp {
        Response::State { state } => assert_eq!(state, JobState::Finished),
        other => panic!("unexpected response: {:?}", other),
    }

    // The output file holds the command's stdout.
    let resp = conn
        .request(&Request::Output {
            target: JobTarget::Id(job_id),
        })
        .await
        .unwrap();
    match resp {
        Response::OutputInfo {
            job_id: id,
            pid,
            output_path,
        } => {
            assert_eq!(id, job_id);
            assert!(pid > 0);
            assert_eq!(std::fs::read_to_string(output_path).unwrap(), "hi\n");
        }
        other => panic!("unexpected response: {:?}", other),
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_wait_reports_failure_exit_codes() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let job_id = submit(&mut conn, "exit 4", true).await;
    let resp = conn
        .request(&Request::Wait {
            target: JobTarget::Id(job_id),
        })
        .await
        .unwrap();
    assert!(matches!(resp, Response::WaitDone { exit_code: 4 }));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_jobs_run_one_at_a_time_in_order() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let marker = daemon.config.runtime_dir.join("order");
    let path = marker.display().to_string();
    for n in 1..=3 {
        submit(&mut conn, &format!("echo {} >> {}", n, path), true).await;
    }

    let resp = conn
        .request(&Request::Wait {
            target: JobTarget::Id(3),
        })
        .await
        .unwrap();
    assert!(matches!(resp, Response::WaitDone { exit_code: 0 }));

    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "1\n2\n3\n");
    daemon.shutdown().await;
}

#[tokio::test]
async fn test_remove_a_queued_job() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    submit(&mut conn, "sleep 2", true).await;
    let queued = submit(&mut conn, "echo never", true).await;

    let resp = conn
        .request(&Request::Remove {
            target: JobTarget::Id(queued),
        })
        .await
        .unwrap();
    match resp {
        Response::Removed { job_id } => assert_eq!(job_id, queued),
        other => panic!("unexpected response: {:?}", other),
    }

    // Shutdown kills the still-running sleep.
    daemon.shutdown().await;
}

#[tokio::test]
async fn test_urgent_reorders_the_queue() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let marker = daemon.config.runtime_dir.join("order");
    let path = marker.display().to_string();
    submit(&mut conn, &format!("sleep 0.2; echo head >> {}", path), true).await;
    submit(&mut conn, &format!("echo second >> {}", path), true).await;
    let urgent = submit(&mut conn, &format!("echo urgent >> {}", path), true).await;

    let resp = conn
        .request(&Request::Urgent {
            target: JobTarget::Id(urgent),
        })
        .await
        .unwrap();
    match resp {
        Response::Moved { job_id } => assert_eq!(job_id, urgent),
        other => panic!("unexpected response: {:?}", other),
    }

    conn.request(&Request::Wait {
        target: JobTarget::Id(2),
    })
    .await
    .unwrap();

    assert_eq!(
        std::fs::read_to_string(&marker).unwrap(),
        "head\nurgent\nsecond\n"
    );
    daemon.shutdown().await;
}

#[tokio::test]
async fn test_errors_travel_as_error_responses() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let resp = conn
        .request(&Request::Remove {
            target: JobTarget::Id(99),
        })
        .await
        .unwrap();
    match resp {
        Response::Error { message } => assert!(message.contains("cannot be removed")),
        other => panic!("unexpected response: {:?}", other),
    }

    // The connection survives a daemon-reported error.
    let job_id = submit(&mut conn, "true", true).await;
    assert_eq!(job_id, 1);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_output_query_on_a_silent_job() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let job_id = submit(&mut conn, "echo quiet", false).await;
    let resp = conn
        .request(&Request::Wait {
            target: JobTarget::Id(job_id),
        })
        .await
        .unwrap();
    assert!(matches!(resp, Response::WaitDone { exit_code: 0 }));

    let resp = conn
        .request(&Request::Output {
            target: JobTarget::Id(job_id),
        })
        .await
        .unwrap();
    match resp {
        Response::Error { message } => assert!(message.contains("no output stored")),
        other => panic!("unexpected response: {:?}", other),
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_listing_over_the_wire() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    submit(&mut conn, "sleep 2", true).await;
    submit(&mut conn, "echo later", true).await;

    let resp = conn.request(&Request::List).await.unwrap();
    match resp {
        Response::Listing { text } => {
            assert!(text.contains("ID"));
            assert!(text.contains("sleep 2"));
            assert!(text.contains("echo later"));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_clear_discards_finished_jobs() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let job_id = submit(&mut conn, "true", true).await;
    conn.request(&Request::Wait {
        target: JobTarget::Id(job_id),
    })
    .await
    .unwrap();

    let resp = conn.request(&Request::ClearFinished).await.unwrap();
    assert!(matches!(resp, Response::Cleared));

    let resp = conn
        .request(&Request::JobState {
            target: JobTarget::Id(job_id),
        })
        .await
        .unwrap();
    match resp {
        Response::Error { message } => assert!(message.contains("cannot be found")),
        other => panic!("unexpected response: {:?}", other),
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_two_clients_wait_on_the_same_job() {
    let daemon = TestDaemon::start().await;
    let mut submitter = daemon.connect().await;
    let mut watcher = daemon.connect().await;

    let job_id = submit(&mut submitter, "sleep 0.2; exit 5", true).await;

    let target = JobTarget::Id(job_id);
    let req_a = Request::Wait { target };
    let req_b = Request::Wait { target };
    let (a, b) = tokio::join!(
        submitter.request(&req_a),
        watcher.request(&req_b),
    );
    assert!(matches!(a.unwrap(), Response::WaitDone { exit_code: 5 }));
    assert!(matches!(b.unwrap(), Response::WaitDone { exit_code: 5 }));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_second_daemon_refuses_to_start() {
    let daemon = TestDaemon::start().await;

    let err = daemon::run(daemon.config.clone()).await.unwrap_err();
    assert!(matches!(err, spoolq::SpoolError::AlreadyRunning(_)));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_pid_and_socket_files_are_cleaned_up() {
    let daemon = TestDaemon::start().await;
    let config = daemon.config.clone();
    assert!(config.pid_path.exists());
    assert!(config.socket_path.exists());

    daemon.shutdown().await;
    assert!(!config.pid_path.exists());
    assert!(!config.socket_path.exists());
}
