use std::io::Write;

/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// tracing output on stderr and command results on stdout stay separate.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Waiting for swap 1b2c...")
    fn status(&self, message: &str);

    /// Success message (e.g., "Swap 1b2c... finished: XMR_REDEEMED")
    fn success(&self, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    /// Machine-readable output, printed as is.
    fn data(&self, text: &str);
}

/// Standard CLI output. Writes to stdout/stderr with ANSI colors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn data(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", text).ok();
        stdout.flush().ok();
    }
}
