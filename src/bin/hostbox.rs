use hostbox::HostError;

fn main() {
    if let Err(err) = hostbox::cli::run() {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<HostError>()
            .map(HostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
