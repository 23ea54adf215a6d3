//! Command dispatch loop
//!
//! Reads one JSON request per line, routes it to the [`ModelManager`] and
//! writes exactly one JSON response per request. No single command, including
//! one that panics, can stop the loop.

use crate::error::{BridgeError, Result};
use crate::manager::ModelManager;
use crate::models::TrainOptions;
use crate::observability::StructuredLogger;
use crate::protocol::{rows_to_matrix, Command, Payload, Response, StatusReport};
use ndarray::Array1;
use serde::Serialize;
use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::error;

/// Counters reported by `status` and at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Requests received, including rejected ones
    pub commands_processed: u64,
    pub errors: u64,
    pub predictions_served: u64,
}

/// Totals for one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Input lines read, blank ones included
    pub lines_read: u64,
    pub stats: BridgeStats,
}

pub struct CommandBridge {
    manager: ModelManager,
    defaults: TrainOptions,
    stats: BridgeStats,
    logger: StructuredLogger,
}

impl CommandBridge {
    /// Wrap `manager`; `defaults` apply to `train` requests that omit options
    pub fn new(manager: ModelManager, defaults: TrainOptions) -> Self {
        Self {
            manager,
            defaults,
            stats: BridgeStats::default(),
            logger: StructuredLogger::new(env!("CARGO_PKG_NAME")),
        }
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Load saved artifacts before the loop starts
    pub fn preload(&mut self, model_path: &Path, scaler_path: &Path) -> Result<()> {
        let result = self.manager.load(model_path, scaler_path);
        self.logger
            .log_preload(model_path, scaler_path, result.as_ref().err());
        result
    }

    /// Handle one request line and build its response
    pub fn dispatch(&mut self, line: &str) -> Response {
        let start = Instant::now();
        self.stats.commands_processed += 1;

        let (action, result) = match Command::parse(line) {
            Ok(command) => (command.action(), self.execute(command)),
            Err(e) => ("invalid", Err(e)),
        };

        if result.is_err() {
            self.stats.errors += 1;
        }
        self.logger
            .log_command(action, result.as_ref().err(), start.elapsed());

        Response::from(result)
    }

    /// Run a parsed command against the manager
    pub fn execute(&mut self, command: Command) -> Result<Payload> {
        match command {
            Command::LoadModel(params) => {
                self.manager.load(&params.model_path, &params.scaler_path)?;
                Ok(Payload::Ack {})
            }
            Command::SaveModel(params) => {
                self.manager.save(&params.model_path, &params.scaler_path)?;
                Ok(Payload::Ack {})
            }
            Command::Predict(params) => {
                let features = params.features.into_row();
                let prediction = self.manager.predict_one(&features)?;
                self.stats.predictions_served += 1;
                Ok(Payload::Prediction { prediction })
            }
            Command::PredictBatch(params) => {
                let x = rows_to_matrix(params.features, self.manager.config().input_dim)?;
                let predictions = self.manager.predict(x.view())?;
                self.stats.predictions_served += predictions.len() as u64;
                Ok(Payload::Predictions {
                    predictions: predictions.to_vec(),
                })
            }
            Command::Train(params) => {
                let options = params.options(&self.defaults);
                let x = rows_to_matrix(params.features, self.manager.config().input_dim)?;
                let y = Array1::from(params.targets);
                let history = self.manager.train(x.view(), y.view(), &options)?;
                Ok(Payload::Trained(history.into()))
            }
            Command::BuildModel => {
                self.manager.build();
                Ok(Payload::Ack {})
            }
            Command::Status => Ok(Payload::Status(StatusReport {
                model: self.manager.status(),
                stats: self.stats,
            })),
        }
    }

    /// Read requests from `input` until end of input, answering on `output`.
    ///
    /// Blank lines are skipped. Returns an error only when reading or writing
    /// the streams fails.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> io::Result<RunSummary> {
        let mut buf = Vec::new();
        let mut lines_read = 0;

        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            lines_read += 1;

            let response = match std::str::from_utf8(&buf) {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    self.dispatch_guarded(text)
                }
                Err(e) => self.reject(BridgeError::MalformedCommand(format!(
                    "input is not valid UTF-8: {}",
                    e
                ))),
            };

            serde_json::to_writer(&mut output, &response)?;
            output.write_all(b"\n")?;
            output.flush()?;
        }

        Ok(RunSummary {
            lines_read,
            stats: self.stats,
        })
    }

    fn dispatch_guarded(&mut self, line: &str) -> Response {
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(line))) {
            Ok(response) => response,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Command handler panicked");
                self.stats.errors += 1;
                Response::Error {
                    message: format!("internal error: {}", message),
                }
            }
        }
    }

    fn reject(&mut self, err: BridgeError) -> Response {
        self.stats.commands_processed += 1;
        self.stats.errors += 1;
        self.logger
            .log_command("invalid", Some(&err), Duration::ZERO);
        Response::error(&err)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
