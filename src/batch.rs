use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::ingestion::InputUnit;
use crate::pipeline::{PlaceResolver, Resolution, ResolutionKind};

/// A settled unit, successful or not.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: InputUnit,
    pub result: AppResult<Resolution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub matched: usize,
    pub closed: usize,
    pub fallback: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &UnitOutcome) {
        self.total += 1;
        match &outcome.result {
            Ok(resolution) => match resolution.kind {
                ResolutionKind::Matched => self.matched += 1,
                ResolutionKind::Closed => self.closed += 1,
                ResolutionKind::Fallback => self.fallback += 1,
            },
            Err(_) => self.failed += 1,
        }
    }
}

/// Runs one resolver task per input unit. Tasks live in a `JoinSet`, so
/// dropping a running batch future aborts every unit still in flight.
pub struct BatchDriver {
    resolver: Arc<PlaceResolver>,
}

impl BatchDriver {
    pub fn new(resolver: Arc<PlaceResolver>) -> Self {
        Self { resolver }
    }

    /// Resolves every unit and returns once all of them have settled.
    /// `on_outcome` sees units in completion order.
    pub async fn run_all<F>(&self, units: Vec<InputUnit>, mut on_outcome: F) -> BatchReport
    where
        F: FnMut(UnitOutcome),
    {
        let mut tasks = UnitTasks::default();
        for unit in units {
            tasks.spawn(&self.resolver, unit);
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            settle(joined, &mut report, &mut on_outcome);
        }
        info!(target: "batch_driver", ?report, "batch complete");
        report
    }

    /// Resolves names line by line as they arrive, handing each outcome over
    /// as soon as it completes. Finishes after the input closes and every
    /// started unit has settled.
    ///
    /// Lines are decoded lossily. A read error stops intake; units already
    /// started still settle before the error is returned.
    pub async fn run_lines<R, F>(&self, mut reader: R, mut on_outcome: F) -> AppResult<BatchReport>
    where
        R: AsyncBufRead + Unpin,
        F: FnMut(UnitOutcome),
    {
        let mut tasks = UnitTasks::default();
        let mut report = BatchReport::default();
        // Partial reads stay in `buf` when the join branch wins the select.
        let mut buf = Vec::new();
        let mut line_number = 0;
        let mut input_open = true;
        let mut read_error = None;

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf), if input_open => match read {
                    Ok(0) => input_open = false,
                    Ok(_) => {
                        line_number += 1;
                        let text = String::from_utf8_lossy(&buf).into_owned();
                        let unit = InputUnit::from_line(line_number, &text);
                        buf.clear();
                        if let Some(unit) = unit {
                            tasks.spawn(&self.resolver, unit);
                        }
                    }
                    Err(err) => {
                        error!(
                            target: "batch_driver",
                            after_line = line_number,
                            %err,
                            "failed to read input; draining started units"
                        );
                        read_error = Some(err);
                        input_open = false;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    settle(joined, &mut report, &mut on_outcome);
                }
                else => break,
            }
        }

        info!(target: "batch_driver", ?report, lines = line_number, "input stream drained");
        match read_error {
            Some(err) => Err(err.into()),
            None => Ok(report),
        }
    }
}

/// Unit tasks in flight, keyed by task id so a task that panics can still be
/// reported against its unit.
#[derive(Default)]
struct UnitTasks {
    set: JoinSet<UnitOutcome>,
    units: HashMap<task::Id, InputUnit>,
}

impl UnitTasks {
    fn spawn(&mut self, resolver: &Arc<PlaceResolver>, unit: InputUnit) {
        let resolver = Arc::clone(resolver);
        let tracked = unit.clone();
        let handle = self.set.spawn(async move {
            let result = resolver.resolve(&unit).await;
            UnitOutcome { unit, result }
        });
        self.units.insert(handle.id(), tracked);
    }

    fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    async fn join_next(&mut self) -> Option<Result<UnitOutcome, (Option<InputUnit>, JoinError)>> {
        let joined = self.set.join_next_with_id().await?;
        Some(match joined {
            Ok((id, outcome)) => {
                self.units.remove(&id);
                Ok(outcome)
            }
            Err(err) => Err((self.units.remove(&err.id()), err)),
        })
    }
}

fn settle<F>(
    joined: Result<UnitOutcome, (Option<InputUnit>, JoinError)>,
    report: &mut BatchReport,
    on_outcome: &mut F,
) where
    F: FnMut(UnitOutcome),
{
    let outcome = match joined {
        Ok(outcome) => outcome,
        Err((Some(unit), err)) => {
            error!(
                target: "batch_driver",
                unit = %unit.origin,
                name = %unit.name,
                ?err,
                "unit task aborted"
            );
            UnitOutcome {
                unit,
                result: Err(AppError::Task(err.to_string())),
            }
        }
        Err((None, err)) => {
            error!(target: "batch_driver", ?err, "untracked unit task aborted");
            report.total += 1;
            report.failed += 1;
            return;
        }
    };

    if let Err(err) = &outcome.result {
        warn!(
            target: "batch_driver",
            unit = %outcome.unit.origin,
            name = %outcome.unit.name,
            error = %err,
            "failed to resolve unit"
        );
    }
    report.record(&outcome);
    on_outcome(outcome);
}
