fn main() {
    ns_cli::init_tracing();
    std::process::exit(ns_cli::run_cli_from_args(std::env::args_os()));
}
