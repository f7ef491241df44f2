fn main() {
    if let Err(e) = buildbench_cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
