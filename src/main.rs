fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = wenkubind::cli::Args::parse();
    if let Err(e) = wenkubind::logging::init(args.log_directive()) {
        eprintln!("{:#}", e);
    }
    if let Err(e) = wenkubind::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
