//! Fatal-error exit for the binary.

use crate::error::HarnessError;
use tracing::error;

/// Print the error and exit. A [`HarnessError`] anywhere in the chain is
/// shown with its user message and decides the exit status.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    let harness_err = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<HarnessError>());

    let exit_code = match harness_err {
        Some(err) => {
            eprintln!("{}", err.user_message());
            err.exit_code()
        }
        None => {
            eprintln!("Error: {error}");
            1
        }
    };

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {i}: {cause}");
        }
    }

    std::process::exit(exit_code)
}
