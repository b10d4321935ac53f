fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("FUZZLOG_LOG", "warn")).init();
    let code = fuzzlog_cli::run_from_env();
    std::process::exit(code);
}
