use clap::Parser;
use tracing_subscriber::EnvFilter;

use spoolq::config::Config;
use spoolq::ipc::{DaemonConnection, Request, Response};
use spoolq::spool::JobTarget;
use spoolq::{daemon, tail, Result, SpoolError};

#[derive(Parser, Debug)]
#[command(name = "spoolq")]
#[command(version)]
#[command(about = "A single-host task-queue daemon: queue shell commands, run them one at a time")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the queue daemon in the foreground
    Server,

    /// Enqueue a shell command
    Submit {
        /// Do not capture the command's output to a file
        #[arg(long)]
        no_output: bool,

        /// Block until the job finishes and exit with its exit code
        #[arg(long)]
        wait: bool,

        /// The command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// List all jobs (the default when no subcommand is given)
    List,

    /// Remove a queued job
    Remove {
        /// Job id (defaults to the most recently queued job)
        id: Option<u32>,
    },

    /// Block until a job finishes; exit with its exit code
    Wait {
        /// Job id (defaults to the last job)
        id: Option<u32>,
    },

    /// Move a queued job to the front of the queue
    Urgent {
        /// Job id (defaults to the most recently queued job)
        id: Option<u32>,
    },

    /// Print the last 10 lines of a job's output and follow it
    Tail {
        /// Job id (defaults to the running job)
        id: Option<u32>,
    },

    /// Print a job's output from the beginning and follow it
    Cat {
        /// Job id (defaults to the running job)
        id: Option<u32>,
    },

    /// Print the path of a job's output file
    Output {
        /// Job id (defaults to the running job)
        id: Option<u32>,
    },

    /// Print the pid of a job's process
    Pid {
        /// Job id (defaults to the running job)
        id: Option<u32>,
    },

    /// Print a job's state (queued, running or finished)
    State {
        /// Job id (defaults to the last job)
        id: Option<u32>,
    },

    /// Discard the finished-jobs list
    Clear,

    /// Ask the daemon to shut down
    Kill,
}

fn target(id: Option<u32>) -> JobTarget {
    JobTarget::from(id)
}

fn init_logging(default: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

/// One request/response exchange with daemon-reported errors surfaced
/// as `SpoolError::Daemon`.
async fn exchange(config: &Config, request: Request) -> Result<Response> {
    let mut conn = DaemonConnection::connect_or_start(config).await?;
    match conn.request(&request).await? {
        Response::Error { message } => Err(SpoolError::Daemon(message)),
        other => Ok(other),
    }
}

fn unexpected(resp: Response) -> SpoolError {
    SpoolError::Protocol(format!("unexpected response: {:?}", resp))
}

async fn run(config: Config, command: Commands) -> Result<i32> {
    match command {
        Commands::Server => {
            daemon::run(config).await?;
            Ok(0)
        }

        Commands::Submit {
            no_output,
            wait,
            command,
        } => {
            let command = command.join(" ");
            let mut conn = DaemonConnection::connect_or_start(&config).await?;
            let job_id = match conn
                .request(&Request::Submit {
                    command,
                    store_output: !no_output,
                })
                .await?
            {
                Response::Submitted { job_id } => job_id,
                Response::Error { message } => return Err(SpoolError::Daemon(message)),
                other => return Err(unexpected(other)),
            };
            println!("{}", job_id);

            if wait {
                // The wait rides the same connection so it cannot race
                // with another client's submission.
                match conn
                    .request(&Request::Wait {
                        target: JobTarget::Id(job_id),
                    })
                    .await?
                {
                    Response::WaitDone { exit_code } => Ok(exit_code),
                    Response::Error { message } => Err(SpoolError::Daemon(message)),
                    other => Err(unexpected(other)),
                }
            } else {
                Ok(0)
            }
        }

        Commands::List => match exchange(&config, Request::List).await? {
            Response::Listing { text } => {
                print!("{}", text);
                Ok(0)
            }
            other => Err(unexpected(other)),
        },

        Commands::Remove { id } => {
            match exchange(&config, Request::Remove { target: target(id) }).await? {
                Response::Removed { job_id } => {
                    println!("removed job {}", job_id);
                    Ok(0)
                }
                other => Err(unexpected(other)),
            }
        }

        Commands::Wait { id } => {
            match exchange(&config, Request::Wait { target: target(id) }).await? {
                Response::WaitDone { exit_code } => Ok(exit_code),
                other => Err(unexpected(other)),
            }
        }

        Commands::Urgent { id } => {
            match exchange(&config, Request::Urgent { target: target(id) }).await? {
                Response::Moved { job_id } => {
                    println!("moved job {} to the front", job_id);
                    Ok(0)
                }
                other => Err(unexpected(other)),
            }
        }

        Commands::Tail { id } => tail::follow(&config, target(id), false).await,

        Commands::Cat { id } => tail::follow(&config, target(id), true).await,

        Commands::Output { id } => {
            match exchange(&config, Request::Output { target: target(id) }).await? {
                Response::OutputInfo { output_path, .. } => {
                    println!("{}", output_path);
                    Ok(0)
                }
                other => Err(unexpected(other)),
            }
        }

        Commands::Pid { id } => {
            match exchange(&config, Request::Output { target: target(id) }).await? {
                Response::OutputInfo { pid, .. } => {
                    println!("{}", pid);
                    Ok(0)
                }
                other => Err(unexpected(other)),
            }
        }

        Commands::State { id } => {
            match exchange(&config, Request::JobState { target: target(id) }).await? {
                Response::State { state } => {
                    println!("{}", state);
                    Ok(0)
                }
                other => Err(unexpected(other)),
            }
        }

        Commands::Clear => match exchange(&config, Request::ClearFinished).await? {
            Response::Cleared => Ok(0),
            other => Err(unexpected(other)),
        },

        Commands::Kill => {
            // No auto-start here: killing a daemon that is not running
            // would just boot one up to shoot it down.
            let mut conn = DaemonConnection::connect(&config).await?;
            match conn.request(&Request::Shutdown).await? {
                Response::ShuttingDown => Ok(0),
                Response::Error { message } => Err(SpoolError::Daemon(message)),
                other => Err(unexpected(other)),
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let command = args.command.unwrap_or(Commands::List);

    // The server logs chatty by default; client commands stay quiet so
    // tables and job output are not interleaved with log lines.
    match command {
        Commands::Server => init_logging("info"),
        _ => init_logging("warn"),
    }

    let config = Config::from_env();
    match run(config, command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("spoolq: {}", e);
            std::process::exit(1);
        }
    }
}
