//! Loads images through the texture cache and reports on the resulting textures.

mod cli;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            texcache::logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
