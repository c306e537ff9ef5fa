//! Post-timeout diagnosis from simulation output.

use solana_signature::Signature;

use super::ConfirmationError;
use crate::ledger::SimulationOutcome;

/// Prefix the runtime puts in front of `msg!` output.
const PROGRAM_LOG_PREFIX: &str = "Program log: ";

/// Returns the most recently emitted program log message, without its prefix.
pub(crate) fn last_program_log(logs: &[String]) -> Option<&str> {
    logs.iter()
        .rev()
        .find_map(|line| line.strip_prefix(PROGRAM_LOG_PREFIX))
}

/// Simulation error kind raised when an instruction fails inside a program.
const INSTRUCTION_ERROR: &str = "InstructionError";

/// Classifies a timed-out transaction from its simulation result.
///
/// Only program-level failures are surfaced. Transaction-level errors such as
/// `BlockhashNotFound` or `AlreadyProcessed` mean the ledger never executed the payload and
/// stay a plain timeout.
pub(crate) fn diagnose(signature: Signature, simulation: &SimulationOutcome) -> ConfirmationError {
    let Some(error) = simulation.error.as_deref() else {
        return ConfirmationError::TimedOut { signature };
    };
    match last_program_log(&simulation.logs) {
        Some(log) => ConfirmationError::ProgramFailure {
            signature,
            message: log.to_owned(),
        },
        None if error.contains(INSTRUCTION_ERROR) => ConfirmationError::ProgramFailure {
            signature,
            message: error.to_owned(),
        },
        None => ConfirmationError::TimedOut { signature },
    }
}
