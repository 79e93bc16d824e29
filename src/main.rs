use clap::Parser;
use gpiotest::cli::{self, Args, EffectiveUser};
use gpiotest::{driver, GpioTestError, NullGpioProxy, RppalGpioProxy};
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // Help and version go to stdout, real parse errors to stderr.
            let _ = error.print();
            return ExitCode::from(cli::parse_error_exit_code(&error));
        }
    };

    let config = match args.validate(&EffectiveUser) {
        Ok(config) => config,
        Err(error) => return fail(error),
    };

    let proxy = if config.dry_run {
        NullGpioProxy::new()
    } else {
        match RppalGpioProxy::open() {
            Ok(proxy) => proxy,
            Err(error) => return fail(error),
        }
    };

    match driver::run(&config, proxy, &mut io::stdout()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => fail(error),
    }
}

fn fail(error: GpioTestError) -> ExitCode {
    eprintln!("{}", error);

    if let GpioTestError::MissingPin = error {
        eprint!("{}", cli::usage());
    }

    ExitCode::from(error.exit_code())
}
