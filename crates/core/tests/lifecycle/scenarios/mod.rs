mod background_errors;
mod exit_functions;
mod finalization;
mod recovery;
