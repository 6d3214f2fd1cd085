//! Process exit codes for the `foldwise` binary.

use foldwise_core::{CodecError, RunError, ServiceError};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_DUPLICATES: i32 = 1; // Matching runs already exist
pub const EXIT_CONFIG_ERROR: i32 = 2; // Bad arguments, config or unsupported input
pub const EXIT_DOCUMENT_ERROR: i32 = 4; // Unreadable or incomplete run documents
pub const EXIT_SERVICE_ERROR: i32 = 5; // Remote service failure

/// Exit code for a failed command, taken from the first typed error in the chain.
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<RunError>() {
            return e.exit_code();
        }
        if cause.downcast_ref::<ServiceError>().is_some() {
            return EXIT_SERVICE_ERROR;
        }
        if cause.downcast_ref::<CodecError>().is_some() {
            return EXIT_DOCUMENT_ERROR;
        }
    }
    EXIT_CONFIG_ERROR
}
