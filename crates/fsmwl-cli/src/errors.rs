use std::error::Error;

/// Print an error and its chain of causes to stderr.
pub fn print_error(err: &dyn Error) {
    eprintln!("error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}
