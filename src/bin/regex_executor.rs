//! Standalone Task Executor process.
//!
//! Reads one length-prefixed JSON [`ExecutorRequest`] from stdin, applies the
//! single substitution command it carries, and writes one length-prefixed
//! JSON [`ExecutorResponse`] to stdout. Then it loops, waiting for the next
//! request on the same process — a worker process is reused across tasks
//! while healthy and is only torn down by the pool on timeout, crash,
//! idle scale-down, or shutdown.
//!
//! This process is deliberately dumb: all chain-walking, escape-decoding,
//! and backreference translation happen upstream in the orchestrator. By the
//! time a request reaches here it already names exactly one command in the
//! host regex engine's own replacement syntax.

use std::io::{self, BufReader, BufWriter};
use std::time::Instant;

use regex_relay_pool::core::executor::{apply, read_frame, write_frame, ExecutorRequest, ExecutorResponse};

fn main() {
    regex_relay_pool::util::telemetry::init_tracing();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = BufWriter::new(stdout.lock());

    loop {
        let request: ExecutorRequest = match read_frame(&mut reader) {
            Ok(Some(req)) => req,
            Ok(None) => break, // stdin closed: the pool tore down our stdin pipe.
            Err(e) => {
                tracing::error!(error = %e, "executor: malformed request, exiting");
                break;
            }
        };

        let response = handle_request(&request);

        if let Err(e) = write_frame(&mut writer, &response) {
            tracing::error!(error = %e, "executor: failed to write response, exiting");
            break;
        }
    }
}

fn handle_request(request: &ExecutorRequest) -> ExecutorResponse {
    let started = Instant::now();
    let Some(command) = request.commands.first() else {
        return ExecutorResponse {
            result: String::new(),
            performance_ms: None,
            error: Some("no command supplied".into()),
        };
    };

    match apply(command, &request.initial_text) {
        Ok(result) => {
            let performance_ms = request.include_performance.then(|| started.elapsed().as_millis() as u64);
            ExecutorResponse { result, performance_ms, error: None }
        }
        Err(message) => ExecutorResponse { result: String::new(), performance_ms: None, error: Some(message) },
    }
}
