//! Replete binary: wires one concrete set of external collaborators
//! (filesystem-backed capabilities, subprocess + browser-stub evaluators)
//! to the library core, runs the stdio command loop (spec.md §6) and the
//! module HTTP server (component C6) side by side on a single-threaded
//! cooperative scheduler (spec.md §5).

use std::net::SocketAddr;
use std::rc::Rc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use replete::args;
use replete::cache::Core;
use replete::capabilities::Specify;
use replete::driver::Driver;
use replete::evaluator;
use replete::fs_capabilities::FsCapabilities;
use replete::protocol::{parse_command, CommandResult};
use replete::server::{self, HttpProjector};
use replete::shutdown::Shutdown;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let local = tokio::task::LocalSet::new();
    local.run_until(run()).await;
}

async fn run() {
    let config = args::parse();
    let log_level = config.log_level.parse().ok();
    replete::logger::init(log_level);

    let fs = Rc::new(FsCapabilities);
    let core = Core::new(fs.clone(), fs.clone(), fs.clone(), fs);

    let evaluators = evaluator::build_registry(&config);
    let driver = Rc::new(Driver::new(core.clone(), evaluators.clone()));
    let shutdown = Shutdown::new();

    let projector: Rc<dyn Specify> = Rc::new(HttpProjector {
        host: config.host.clone(),
        port: config.port,
    });
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            log::error!("invalid --host/--port: {err}");
            return;
        }
    };
    let server_core = core.clone();
    let server_handle = tokio::task::spawn_local(async move {
        if let Err(err) = server::run(server_core, projector, addr).await {
            log::error!("module server exited: {err}");
        }
    });

    // One task owns stdout exclusively so concurrently handled commands
    // (spec.md §5: "a second command may enter 'resolving' before the
    // first exits 'dispatched'") never interleave a partial result line.
    let (result_tx, mut result_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let writer_handle = tokio::task::spawn_local(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = result_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        if shutdown.is_draining() {
            break;
        }
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // stdin closed: treat as a core shutdown request.
            Err(err) => {
                log::error!("stdin read error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let driver = driver.clone();
        let tx = result_tx.clone();
        shutdown.track(async move {
            let results = match parse_command(&line) {
                Ok(command) => driver.handle(command).await,
                Err(err) => vec![CommandResult::err(err.to_string(), None)],
            };
            for result in results {
                match result.to_line() {
                    Ok(rendered) => {
                        let _ = tx.send(rendered);
                    }
                    Err(err) => log::error!("failed to render result line: {err}"),
                }
            }
        });
    }

    // spec.md §5: wait for outstanding work to settle, then tear down the
    // module server and any external evaluator subprocesses.
    shutdown.begin().await;
    drop(result_tx);
    let _ = writer_handle.await;
    server_handle.abort();
    for (platform, evaluator) in &evaluators {
        if let Err(err) = evaluator.stop().await {
            log::error!("failed to stop {platform} evaluator: {err}");
        }
    }
}
