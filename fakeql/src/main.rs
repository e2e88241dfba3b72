//! Main entry point for CLI command to start server.

fn main() {
    match fakeql::main() {
        Ok(()) => {}
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    }
}
