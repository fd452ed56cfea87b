use unmacro::errors::print_error;

fn main() {
    if let Err(error) = unmacro::cli::run() {
        print_error(error);
        std::process::exit(1);
    }
}
